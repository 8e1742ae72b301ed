use serde::Serialize;

/// Absolute address of a byte to recover.
///
/// The process is usually not permitted to read it. The fault a direct read would
/// raise is the exploited condition, not an error, so this type never dereferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TargetAddress(usize);

impl TargetAddress {
    /// Address `offset` bytes past `self`, wrapping at the top of the address space.
    pub const fn offset(self, offset: usize) -> Self {
        TargetAddress(self.0.wrapping_add(offset))
    }

    /// Address of the byte behind `ptr`.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        TargetAddress(ptr as usize)
    }

    /// The address as a raw pointer, for handing to the primitives.
    pub const fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    /// The address as an integer.
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for TargetAddress {
    fn from(value: usize) -> Self {
        TargetAddress(value)
    }
}


impl std::fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::LowerHex for TargetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: u32 = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Number of oracle slots, one per byte value
pub const ORACLE_SLOTS: usize = 256;

/// Cache line size (64 bytes) for x86_64
pub const CL_SIZE: usize = 64;

/// Sample rounds per recovered byte
pub const DEFAULT_ROUNDS: usize = 3;
/// Zero reads tolerated inside one transaction before giving up on a round
pub const DEFAULT_ZERO_RETRIES: u32 = 4096;

/// Bytes per line of the hex dump
pub const BYTES_PER_LINE: usize = 16;

/// Fill byte written to the oracle so every slot is backed by its own page
pub const ORACLE_FILL: u8 = 0x5a;

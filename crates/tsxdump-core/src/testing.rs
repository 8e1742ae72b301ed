//! Call-recording [`CachePrimitives`] for checking instruction order.

use std::cell::{Cell, RefCell};

use crate::primitives::CachePrimitives;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Flush(usize),
    Fence,
    Timestamp,
    Touch(usize),
    Load(usize),
    Begin,
    End,
}

/// Never dereferences; every call is appended to `ops`.
pub(crate) struct RecordingPrimitives {
    ops: RefCell<Vec<Op>>,
    clock: Cell<u64>,
    grant: bool,
    value: u8,
}

impl RecordingPrimitives {
    /// `grant` decides whether transactions start, `value` is what every load returns.
    pub(crate) fn new(grant: bool, value: u8) -> Self {
        RecordingPrimitives {
            ops: RefCell::new(Vec::new()),
            clock: Cell::new(0),
            grant,
            value,
        }
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    fn push(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }
}

unsafe impl CachePrimitives for RecordingPrimitives {
    unsafe fn flush(&self, addr: *const u8) {
        self.push(Op::Flush(addr as usize));
    }

    fn fence(&self) {
        self.push(Op::Fence);
    }

    fn read_timestamp(&self) -> u64 {
        self.push(Op::Timestamp);
        self.clock.set(self.clock.get() + 7);
        self.clock.get()
    }

    unsafe fn touch(&self, addr: *const u8) {
        self.push(Op::Touch(addr as usize));
    }

    unsafe fn load_byte(&self, addr: *const u8) -> u8 {
        self.push(Op::Load(addr as usize));
        self.value
    }

    unsafe fn begin_transaction(&self) -> bool {
        self.push(Op::Begin);
        self.grant
    }

    unsafe fn end_transaction(&self) {
        self.push(Op::End);
    }
}

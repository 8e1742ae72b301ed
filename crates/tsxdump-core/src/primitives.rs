//! Hardware primitive interface.
//!
//! This module defines the [`CachePrimitives`] trait, the only seam between the attack
//! statistics and the instruction sequences of a concrete CPU. Everything above it
//! (flushing, probing, the gadget and the aggregator) is written against this trait and
//! can therefore be exercised against a simulated cache.

/// Low-level cache, timing and transaction operations of one logical core.
///
/// # Safety
///
/// Implementors guarantee that [`load_byte`](CachePrimitives::load_byte) is sound for
/// *any* address while a transaction started by
/// [`begin_transaction`](CachePrimitives::begin_transaction) is open. On hardware this
/// holds because the transaction rolls back the fault of an illegal read; a simulated
/// backend must never dereference the address it is given. The transient gadget relies
/// on this to read arbitrary target addresses from safe code.
pub unsafe trait CachePrimitives {
    /// Evicts the cache line containing `addr` from every cache level.
    ///
    /// # Safety
    ///
    /// `addr` must point into mapped memory.
    unsafe fn flush(&self, addr: *const u8);

    /// Full memory fence. Orders all earlier loads and stores before later ones.
    fn fence(&self);

    /// Reads the cycle counter, serialized against surrounding instructions so that
    /// neither earlier nor later memory accesses are reordered across it.
    fn read_timestamp(&self) -> u64;

    /// Performs a one-byte load from `addr` and discards the value.
    ///
    /// # Safety
    ///
    /// `addr` must be readable.
    unsafe fn touch(&self, addr: *const u8);

    /// Reads one byte from a possibly protected address.
    ///
    /// # Safety
    ///
    /// Must only be called while a transaction is open, i.e. after
    /// [`begin_transaction`](CachePrimitives::begin_transaction) returned `true` and
    /// before the matching [`end_transaction`](CachePrimitives::end_transaction).
    unsafe fn load_byte(&self, addr: *const u8) -> u8;

    /// Tries to open a hardware transaction.
    ///
    /// Returns `true` if execution now runs transactionally. Returns `false` if the
    /// transaction could not be started *or* if an already started transaction aborted:
    /// on abort, hardware resumes execution here with all architectural effects of the
    /// transactional region discarded.
    ///
    /// # Safety
    ///
    /// Every `true` result must be followed by exactly one call to
    /// [`end_transaction`](CachePrimitives::end_transaction) on the same thread.
    unsafe fn begin_transaction(&self) -> bool;

    /// Commits the open transaction.
    ///
    /// # Safety
    ///
    /// A transaction must be open.
    unsafe fn end_transaction(&self);
}

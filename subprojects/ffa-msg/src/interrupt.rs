//! Interrupt handler seam.
//!
//! While a partition waits for a response, the partition manager may hand it a pending
//! interrupt (`FFA_INTERRUPT`). The messenger passes the interrupt id to the handler and then
//! resumes waiting.

/// Services interrupts delivered during a blocking call.
///
/// The handler runs on the caller's stack while a call is in flight. It must not issue a call
/// through the same [`Messenger`](crate::Messenger).
pub trait InterruptHandler {
    fn handle(&self, interrupt_id: u32);
}

impl<F: Fn(u32)> InterruptHandler for F {
    #[inline]
    fn handle(&self, interrupt_id: u32) {
        self(interrupt_id)
    }
}

/// Ignores every interrupt. Used by partitions without interrupt sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl InterruptHandler for NullHandler {
    #[inline]
    fn handle(&self, interrupt_id: u32) {
        log::trace!("ignoring interrupt {interrupt_id}");
    }
}

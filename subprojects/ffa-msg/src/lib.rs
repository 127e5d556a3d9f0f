//! FF-A direct messaging
//!
//! This crate implements direct request/response messaging on top of the raw register ABI in
//! `ffa-svc`. It is layered as follows:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Service clients (tpm, ...) │  Command codes & status per service
//! ├─────────────────────────────┤
//! │  Call state machine         │  Send, absorb interrupts, resolve  (this crate)
//! ├─────────────────────────────┤
//! │  Message codec              │  Direct message <-> registers      (this crate)
//! ├─────────────────────────────┤
//! │  Conduit (smc / svc)        │  Transport                         (ffa-svc)
//! └─────────────────────────────┘
//! ```
//!
//! - [`direct`]: the [`DirectMessage`](direct::DirectMessage) type and its short and extended
//!   register layouts.
//! - [`call`]: the [`Messenger`](call::Messenger), which sends a message and blocks until the
//!   matching response arrives, handing interrupts to an [`InterruptHandler`] on the way.
//! - [`interrupt`]: the interrupt handler seam.

#![cfg_attr(not(test), no_std)]

pub mod call;
pub mod direct;
pub mod interrupt;

pub use self::{
    call::Messenger,
    direct::{DirectMessage, MessageKind, Width},
    interrupt::{InterruptHandler, NullHandler},
};

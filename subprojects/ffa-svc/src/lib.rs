//! # ffa-svc
//!
//! A Rust library for talking to the partition manager through the _Arm Firmware Framework
//! for A-profile_ (FF-A) register ABI.
//!
//! Every FF-A interface is a single trip across the privilege boundary: the caller fills a
//! fixed-width [register vector](raw::Regs), issues `smc`/`svc`, and reads the response back out
//! of the same registers. This crate provides:
//!
//! - The [`Conduit`](raw::Conduit) seam and the `smc`/`svc` conduits ([`raw`])
//! - Function identifiers ([`code`]) and the status translator ([`result`])
//! - The service identifier wire transform ([`guid`])
//! - Thin, single-shot wrappers over the non-messaging interfaces: version and id queries
//!   ([`misc`]), memory transactions ([`mem`]), partition discovery ([`partition`]),
//!   notifications ([`notification`]), RX/TX buffer registration ([`rxtx`]) and the debug
//!   console ([`console`]).
//!
//! Direct messaging, which can be interrupted and therefore needs a state machine, lives in
//! the `ffa-msg` crate.
//!
//! ## References:
//! - [Arm Firmware Framework for Arm A-profile (DEN0077)](https://developer.arm.com/documentation/den0077/latest)

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod code;
pub mod console;
pub mod guid;
pub mod mem;
pub mod misc;
pub mod notification;
pub mod partition;
pub mod raw;
pub mod result;
pub mod rxtx;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use self::{
    guid::ServiceId,
    result::{Error, Result},
};

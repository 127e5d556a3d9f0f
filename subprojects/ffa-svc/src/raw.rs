//! Raw FF-A register ABI.
//!
//! Every FF-A interface is a single exchange of the general purpose registers `x0`-`x17`
//! across the privilege boundary. The caller places the function identifier in `x0` and the
//! arguments in the following registers; the callee answers in the same registers, again with
//! a function identifier in `x0` (`FFA_SUCCESS`, `FFA_ERROR`, `FFA_INTERRUPT`, a message, ...).
//!
//! The transfer instruction is abstracted behind the [`Conduit`] trait so the layers above can
//! be driven by a scripted peer on the host.

use core::ops::{Index, IndexMut};

use crate::{
    code::{ERROR, SUCCESS_32, SUCCESS_64},
    result::{Error, Result},
};

//<editor-fold desc="Register vector">

/// Number of registers exchanged on every call (`x0`-`x17`).
pub const NUM_REGS: usize = 18;

/// The register vector exchanged with the partition manager.
///
/// Word `0` always carries the function identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Regs(pub [u64; NUM_REGS]);

impl Regs {
    /// Creates a zeroed register vector with `function_id` in `x0`.
    #[inline]
    pub const fn new(function_id: u32) -> Self {
        let mut regs = [0; NUM_REGS];
        regs[0] = function_id as u64;
        Self(regs)
    }

    /// Returns the function identifier in `x0`.
    ///
    /// Only the low 32 bits are significant.
    #[inline]
    pub const fn function_id(&self) -> u32 {
        self.0[0] as u32
    }

    /// Returns the raw register words.
    #[inline]
    pub const fn as_array(&self) -> &[u64; NUM_REGS] {
        &self.0
    }
}

impl From<[u64; NUM_REGS]> for Regs {
    fn from(value: [u64; NUM_REGS]) -> Self {
        Self(value)
    }
}

impl Index<usize> for Regs {
    type Output = u64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Regs {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

/// Packs a source and destination endpoint id into the `x1` word.
///
/// Source goes in bits `[31:16]`, destination in bits `[15:0]`.
#[inline]
pub const fn endpoint_pair(source: u16, destination: u16) -> u64 {
    ((source as u64) << 16) | destination as u64
}

/// Splits an `x1` word into `(source, destination)`.
#[inline]
pub const fn split_endpoint_pair(word: u64) -> (u16, u16) {
    ((word >> 16) as u16, word as u16)
}

//</editor-fold>

//<editor-fold desc="Conduits">

/// The privilege-boundary transfer.
///
/// An implementation performs exactly one blocking exchange: no retry and no interpretation
/// of the returned registers.
pub trait Conduit {
    /// Transfers `regs` to the partition manager and returns its response.
    fn invoke(&self, regs: Regs) -> Regs;
}

impl<C: Conduit + ?Sized> Conduit for &C {
    #[inline]
    fn invoke(&self, regs: Regs) -> Regs {
        (**self).invoke(regs)
    }
}

/// Issues `$insn` with `x0`-`x17` as both inputs and outputs.
#[cfg(target_arch = "aarch64")]
macro_rules! call_with_regs {
    ($insn:literal, $regs:ident) => {{
        let r = &mut $regs.0;
        // SAFETY: The instruction only reads and writes x0-x17, all of which are declared as
        //  operands. The partition manager does not touch the caller's stack.
        unsafe {
            core::arch::asm!(
                $insn,
                inout("x0") r[0],
                inout("x1") r[1],
                inout("x2") r[2],
                inout("x3") r[3],
                inout("x4") r[4],
                inout("x5") r[5],
                inout("x6") r[6],
                inout("x7") r[7],
                inout("x8") r[8],
                inout("x9") r[9],
                inout("x10") r[10],
                inout("x11") r[11],
                inout("x12") r[12],
                inout("x13") r[13],
                inout("x14") r[14],
                inout("x15") r[15],
                inout("x16") r[16],
                inout("x17") r[17],
                options(nostack),
            );
        }
    }};
}

/// Secure Monitor Call conduit, used by partitions running at EL1 or EL2.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Smc;

#[cfg(target_arch = "aarch64")]
impl Conduit for Smc {
    #[inline]
    fn invoke(&self, mut regs: Regs) -> Regs {
        call_with_regs!("smc #0", regs);
        regs
    }
}

/// Supervisor Call conduit, used by partitions running at S-EL0.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Svc;

#[cfg(target_arch = "aarch64")]
impl Conduit for Svc {
    #[inline]
    fn invoke(&self, mut regs: Regs) -> Regs {
        call_with_regs!("svc #0", regs);
        regs
    }
}

//</editor-fold>

//<editor-fold desc="Single-shot exchange">

/// Performs a single exchange, translating an `FFA_ERROR` response into an [`Error`].
///
/// Any other response is returned untouched for the caller to validate.
pub fn call<C: Conduit + ?Sized>(conduit: &C, regs: Regs) -> Result<Regs> {
    let response = conduit.invoke(regs);
    if response.function_id() == ERROR {
        let status = response[2] as u32 as i32;
        log::debug!(
            "FF-A call {:#010x} failed with status {}",
            regs.function_id(),
            status
        );
        return Err(Error::from_status(status));
    }

    Ok(response)
}

/// Checks that `regs` is an `FFA_SUCCESS` response (either width).
///
/// Anything else is a protocol violation and is reported as [`Error::DeviceError`].
pub fn expect_success(regs: &Regs) -> Result<()> {
    match regs.function_id() {
        SUCCESS_32 | SUCCESS_64 => Ok(()),
        other => {
            log::error!("unexpected FF-A response {other:#010x}, expected FFA_SUCCESS");
            Err(Error::DeviceError)
        }
    }
}

/// Performs a single exchange that must resolve to `FFA_SUCCESS`.
pub fn call_success<C: Conduit + ?Sized>(conduit: &C, regs: Regs) -> Result<Regs> {
    let response = call(conduit, regs)?;
    expect_success(&response)?;
    Ok(response)
}

//</editor-fold>

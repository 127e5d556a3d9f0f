//! Framework version, endpoint id and feature discovery.

use crate::{
    code::{self, FEATURES, ID_GET, VERSION},
    raw::{self, Conduit, Regs},
    result::{Error, Result},
};

/// An FF-A framework version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// The version this crate speaks.
    pub const CURRENT: Self = Self::new(code::VERSION_MAJOR, code::VERSION_MINOR);

    #[inline]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Decodes a version word: major in bits `[30:16]`, minor in bits `[15:0]`.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            major: ((raw >> 16) & 0x7fff) as u16,
            minor: raw as u16,
        }
    }

    /// Encodes the version word.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        ((self.major as u32 & 0x7fff) << 16) | self.minor as u32
    }

    /// Returns `true` if a callee reporting `self` can serve a caller built for `required`.
    ///
    /// Majors must match and the callee's minor must be at least the required one.
    #[inline]
    pub const fn is_compatible_with(self, required: Self) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Negotiates the framework version.
///
/// `FFA_VERSION` is the one interface that does not answer with a function id: `w0` holds
/// either the callee's version or, with bit 31 set, a status code.
pub fn version<C: Conduit + ?Sized>(conduit: &C, requested: Version) -> Result<Version> {
    let mut regs = Regs::new(VERSION);
    regs[1] = requested.to_raw() as u64;

    let raw = conduit.invoke(regs)[0] as u32;
    if raw & (1 << 31) != 0 {
        return Err(Error::from_status(raw as i32));
    }

    Ok(Version::from_raw(raw))
}

/// Returns the endpoint id of the caller.
pub fn id_get<C: Conduit + ?Sized>(conduit: &C) -> Result<u16> {
    let rsp = raw::call_success(conduit, Regs::new(ID_GET))?;
    Ok(rsp[2] as u16)
}

/// Interface properties reported by `FFA_FEATURES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    /// `w2`: interface properties.
    pub properties: u32,
    /// `w3`: additional interface properties.
    pub properties2: u32,
}

/// Queries whether `function_id` is implemented, and its properties.
///
/// An unimplemented interface yields [`Error::NotSupported`].
pub fn features<C: Conduit + ?Sized>(conduit: &C, function_id: u32) -> Result<Features> {
    let mut regs = Regs::new(FEATURES);
    regs[1] = function_id as u64;

    let rsp = raw::call_success(conduit, regs)?;
    Ok(Features {
        properties: rsp[2] as u32,
        properties2: rsp[3] as u32,
    })
}

//! Service identifiers and their wire transform.
//!
//! Service identifiers are 128-bit GUIDs held in the mixed-endian host layout used by firmware
//! (`Data1` LE `u32`, `Data2` LE `u16`, `Data3` LE `u16`, `Data4` as 8 bytes). On the wire the
//! partition manager expects a different arrangement of the same bytes:
//!
//! | Host bytes | Wire bytes |
//! | --- | --- |
//! | `[0..4]` `Data1` | unchanged |
//! | `[4..6]` `Data2` | moved to `[6..8]` |
//! | `[6..8]` `Data3` | moved to `[4..6]` |
//! | `[8..12]` | byte-reversed |
//! | `[12..16]` | byte-reversed |
//!
//! The transform is its own inverse. The wired bytes are then carried in two registers as
//! little-endian `u64` words.

use core::fmt;

use uuid::Uuid;

/// A 128-bit service identifier in host (EFI GUID) byte layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ServiceId([u8; 16]);

impl ServiceId {
    /// The all-zero identifier, used by messages that carry no service id.
    pub const NIL: Self = Self([0; 16]);

    /// Builds an identifier from its GUID fields.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        let d1 = data1.to_le_bytes();
        let d2 = data2.to_le_bytes();
        let d3 = data3.to_le_bytes();
        Self([
            d1[0], d1[1], d1[2], d1[3], d2[0], d2[1], d3[0], d3[1], data4[0], data4[1], data4[2],
            data4[3], data4[4], data4[5], data4[6], data4[7],
        ])
    }

    /// Wraps raw host-layout bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw host-layout bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts an RFC 4122 UUID into the host layout.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_bytes_le())
    }

    /// Converts back into an RFC 4122 UUID.
    pub fn to_uuid(self) -> Uuid {
        Uuid::from_bytes_le(self.0)
    }

    /// Returns `true` for [`ServiceId::NIL`].
    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Applies the host/wire byte arrangement.
    ///
    /// Applying it twice yields the original identifier.
    pub const fn mangle(self) -> Self {
        let b = self.0;
        Self([
            b[0], b[1], b[2], b[3], // Data1
            b[6], b[7], // Data3
            b[4], b[5], // Data2
            b[11], b[10], b[9], b[8], b[15], b[14], b[13], b[12],
        ])
    }

    /// Returns the two register words carrying this identifier.
    pub const fn to_wire(self) -> [u64; 2] {
        let w = self.mangle().0;
        [
            u64::from_le_bytes([w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]]),
            u64::from_le_bytes([w[8], w[9], w[10], w[11], w[12], w[13], w[14], w[15]]),
        ]
    }

    /// Recovers an identifier from its two register words.
    pub const fn from_wire(words: [u64; 2]) -> Self {
        let lo = words[0].to_le_bytes();
        let hi = words[1].to_le_bytes();
        Self([
            lo[0], lo[1], lo[2], lo[3], lo[4], lo[5], lo[6], lo[7], hi[0], hi[1], hi[2], hi[3],
            hi[4], hi[5], hi[6], hi[7],
        ])
        .mangle()
    }
}

impl From<Uuid> for ServiceId {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

impl From<ServiceId> for Uuid {
    fn from(value: ServiceId) -> Self {
        value.to_uuid()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_uuid(), f)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.to_uuid())
    }
}

//! TPM service protocol constants and types.
//!
//! Every TPM service call is one `FFA_MSG_SEND_DIRECT_REQ2` addressed to [`SERVICE_ID`]. The
//! command code travels in payload slot 0 (`x4`) and the arguments in slots 1..=3. The response
//! carries the service status in slot 0 and results from slot 1 on.

use ffa_svc::{Error, Result, ServiceId};

/// Service identifier of the TPM service, `17b862a4-1806-4faf-86b3-089a58353861`.
pub const SERVICE_ID: ServiceId = ServiceId::from_fields(
    0x17b8_62a4,
    0x1806,
    0x4faf,
    [0x86, 0xb3, 0x08, 0x9a, 0x58, 0x35, 0x38, 0x61],
);

/// Command: GetInterfaceVersion.
pub const CMD_GET_INTERFACE_VERSION: u64 = 0x0f00_0001;

/// Command: GetFeatureInfo.
pub const CMD_GET_FEATURE_INFO: u64 = 0x0f00_0101;

/// Command: Start. Signals that the CRB holds a command or a locality request.
pub const CMD_START: u64 = 0x0f00_0201;

/// Command: RegisterForNotification.
pub const CMD_REGISTER_FOR_NOTIFICATION: u64 = 0x0f00_0301;

/// Command: UnregisterFromNotification.
pub const CMD_UNREGISTER_FROM_NOTIFICATION: u64 = 0x0f00_0401;

/// Command: FinishNotified.
pub const CMD_FINISH_NOTIFIED: u64 = 0x0f00_0501;

/// Feature id of notification support, for [`CMD_GET_FEATURE_INFO`].
pub const FEATURE_NOTIFICATION: u64 = 1;

/// Status codes returned in payload slot 0.
pub mod status {
    pub const OK: u64 = 0x0500_0001;
    pub const OK_RESULTS_RETURNED: u64 = 0x0500_0002;
    pub const NO_FUNCTION: u64 = 0x8e00_0001;
    pub const NOT_SUPPORTED: u64 = 0x8e00_0002;
    pub const INVALID_ARGUMENT: u64 = 0x8e00_0005;
    pub const INVALID_CRB_CONTROL_DATA: u64 = 0x8e00_0006;
    pub const ALREADY: u64 = 0x8e00_0009;
    pub const DENIED: u64 = 0x8e00_000a;
    pub const NO_MEMORY: u64 = 0x8e00_000b;
}

/// Translates a TPM service status code into the local error category.
pub const fn translate_status(code: u64) -> Result<()> {
    match code {
        status::OK | status::OK_RESULTS_RETURNED => Ok(()),
        status::NO_FUNCTION => Err(Error::NotFound),
        status::NOT_SUPPORTED => Err(Error::NotSupported),
        status::INVALID_ARGUMENT => Err(Error::InvalidParameter),
        status::INVALID_CRB_CONTROL_DATA => Err(Error::CorruptedControlData),
        status::ALREADY => Err(Error::AlreadyStarted),
        status::DENIED => Err(Error::AccessDenied),
        status::NO_MEMORY => Err(Error::NoMemory),
        _ => Err(Error::DeviceError),
    }
}

/// What a [`CMD_START`] call asks the service to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StartQualifier {
    /// A command has been written to the CRB.
    Command = 0,
    /// A locality request has been written to the CRB.
    Locality = 1,
}

/// How notifications raised by the TPM service are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotificationType {
    /// Global notification.
    Global = 0,
    /// Per-vCPU notification, delivered to the registering vCPU.
    PerVcpu = 1,
}

/// Version of the TPM service interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InterfaceVersion {
    pub major: u16,
    pub minor: u16,
}

impl InterfaceVersion {
    /// Decodes the version word: major in bits `[31:16]`, minor in bits `[15:0]`.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            major: (raw >> 16) as u16,
            minor: raw as u16,
        }
    }
}

impl core::fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

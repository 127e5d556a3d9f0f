//! TPM service client over FF-A
//!
//! A TPM exposed by a secure partition is driven through two channels: the Command Response
//! Buffer (CRB) shared with the partition, and a handful of FF-A commands that tell the service
//! when the CRB holds something to process.
//!
//! ## Architecture
//!
//! - [`TpmService`]: typed wrappers for the service commands, one extended direct request each.
//! - [`Tpm2Device`]: CRB bring-up and command submission on top of [`TpmService`].
//!
//! Before any command is issued, [`verify_ffa_version`] checks that the framework speaks FF-A
//! v1.2 or a later minor, which is the first version with `FFA_MSG_SEND_DIRECT_REQ2`.

#![cfg_attr(not(test), no_std)]

use core::cell::OnceCell;

use ffa_msg::{InterruptHandler, Messenger, NullHandler};
use ffa_svc::{
    Error, Result,
    misc::{self, Version},
    partition::{self, MAX_DESCRIPTORS_PER_CALL, PartitionInfo},
    raw::Conduit,
};

pub mod crb;
mod device;
mod proto;
mod rpc;

pub use self::{
    device::{DeviceConfig, Tpm2Device},
    proto::{
        FEATURE_NOTIFICATION, InterfaceVersion, NotificationType, SERVICE_ID, StartQualifier,
        translate_status,
    },
};

/// Endpoint ids a [`TpmService`] talks between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBinding {
    /// Endpoint id of this partition.
    pub own_id: u16,
    /// Endpoint id of the TPM service partition.
    pub partition_id: u16,
}

/// TPM service client.
///
/// The endpoint ids are resolved on first use and kept for the lifetime of the client.
pub struct TpmService<'m, C, H = NullHandler> {
    messenger: &'m Messenger<C, H>,
    binding: OnceCell<PartitionBinding>,
}

impl<'m, C: Conduit, H: InterruptHandler> TpmService<'m, C, H> {
    /// Wraps `messenger` without running the version preflight.
    ///
    /// Use [`connect`](Self::connect) unless the preflight already ran on this conduit.
    pub fn new(messenger: &'m Messenger<C, H>) -> Self {
        Self {
            messenger,
            binding: OnceCell::new(),
        }
    }

    /// Checks the framework version and wraps `messenger`.
    pub fn connect(messenger: &'m Messenger<C, H>) -> Result<Self> {
        verify_ffa_version(messenger.conduit())?;
        Ok(Self::new(messenger))
    }

    /// Returns the endpoint ids, resolving them on first use.
    pub fn binding(&self) -> Result<PartitionBinding> {
        if let Some(&binding) = self.binding.get() {
            return Ok(binding);
        }

        let own_id = self.messenger.own_id()?;
        let partition_id = discover_service_partition(self.messenger.conduit())?;
        log::debug!("TPM service bound: own id {own_id:#06x}, partition id {partition_id:#06x}");

        Ok(*self.binding.get_or_init(|| PartitionBinding {
            own_id,
            partition_id,
        }))
    }

    #[inline]
    fn partition_id(&self) -> Result<u16> {
        self.binding().map(|b| b.partition_id)
    }

    /// Gets the version of the TPM service interface.
    pub fn get_interface_version(&self) -> Result<InterfaceVersion> {
        rpc::get_interface_version(self.messenger, self.partition_id()?)
    }

    /// Checks that the service supports `feature`, e.g. [`FEATURE_NOTIFICATION`].
    pub fn get_feature_info(&self, feature: u64) -> Result<()> {
        rpc::get_feature_info(self.messenger, self.partition_id()?, feature)
    }

    /// Asks the service to process the CRB for `locality`.
    ///
    /// [`StartQualifier::Command`] covers both a pending command and control area requests
    /// (command ready, go idle). [`StartQualifier::Locality`] covers locality requests.
    pub fn start(&self, qualifier: StartQualifier, locality: u8) -> Result<()> {
        rpc::start(self.messenger, self.partition_id()?, qualifier, locality)
    }

    /// Registers for completion notifications.
    pub fn register_notification(
        &self,
        notification_type: NotificationType,
        vcpu: u16,
        notification_id: u8,
    ) -> Result<()> {
        rpc::register_notification(
            self.messenger,
            self.partition_id()?,
            notification_type,
            vcpu,
            notification_id,
        )
    }

    /// Drops the completion notification registration.
    pub fn unregister_notification(&self) -> Result<()> {
        rpc::unregister_notification(self.messenger, self.partition_id()?)
    }

    /// Acknowledges a completion notification.
    pub fn finish_notified(&self) -> Result<()> {
        rpc::finish_notified(self.messenger, self.partition_id()?)
    }
}

/// Checks that the framework implements FF-A v1.2 or a compatible later minor.
pub fn verify_ffa_version<C: Conduit + ?Sized>(conduit: &C) -> Result<()> {
    let version = misc::version(conduit, Version::CURRENT)?;
    if !version.is_compatible_with(Version::CURRENT) {
        log::error!("FF-A version {version} is not compatible with {}", Version::CURRENT);
        return Err(Error::NotSupported);
    }

    Ok(())
}

/// Finds the endpoint id of the TPM service partition.
///
/// Exactly one partition may implement the service. Any other result is a
/// [`Error::DeviceError`].
pub fn discover_service_partition<C: Conduit + ?Sized>(conduit: &C) -> Result<u16> {
    let mut found = [PartitionInfo::default(); MAX_DESCRIPTORS_PER_CALL];
    let page = partition::info_get_regs(conduit, SERVICE_ID, 0, 0, &mut found)?;

    if page.current_index != 0 || page.last_index != 0 {
        log::error!(
            "expected a single TPM service partition, got current index {} last index {}",
            page.current_index,
            page.last_index
        );
        return Err(Error::DeviceError);
    }

    Ok(found[0].id)
}

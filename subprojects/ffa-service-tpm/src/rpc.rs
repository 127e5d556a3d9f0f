//! TPM service commands over extended direct messages.
//!
//! Each command is a single `FFA_MSG_SEND_DIRECT_REQ2` to the service partition. The reply
//! must be an `FFA_MSG_SEND_DIRECT_RESP2`; its status slot is translated before any result slot
//! is read.

use ffa_msg::{InterruptHandler, MessageKind, Messenger, direct::EXTENDED_PAYLOAD_WORDS};
use ffa_svc::{Error, Result, raw::Conduit};

use crate::proto::{
    self, CMD_FINISH_NOTIFIED, CMD_GET_FEATURE_INFO, CMD_GET_INTERFACE_VERSION,
    CMD_REGISTER_FOR_NOTIFICATION, CMD_START, CMD_UNREGISTER_FROM_NOTIFICATION, InterfaceVersion,
    NotificationType, SERVICE_ID, StartQualifier,
};

/// Payload slot of the command code in requests and of the status in responses.
const SLOT_COMMAND: usize = 0;

/// First payload slot of the command arguments and of the results.
const SLOT_ARGS: usize = 1;

/// Number of argument slots a command may use.
const MAX_ARGS: usize = 3;

fn call<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
    command: u64,
    args: [u64; MAX_ARGS],
) -> Result<[u64; EXTENDED_PAYLOAD_WORDS]> {
    let mut payload = [0; EXTENDED_PAYLOAD_WORDS];
    payload[SLOT_COMMAND] = command;
    payload[SLOT_ARGS..SLOT_ARGS + MAX_ARGS].copy_from_slice(&args);

    let rsp = messenger.send_direct_req2(partition_id, SERVICE_ID, payload)?;
    if rsp.kind != MessageKind::ExtendedResponse {
        log::error!("TPM service answered command {command:#010x} with {:?}", rsp.kind);
        return Err(Error::DeviceError);
    }

    if let Err(err) = proto::translate_status(rsp.args[SLOT_COMMAND]) {
        log::debug!(
            "TPM service command {command:#010x} failed with status {:#010x}",
            rsp.args[SLOT_COMMAND]
        );
        return Err(err);
    }

    Ok(rsp.args)
}

/// Queries the version of the service interface.
pub fn get_interface_version<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
) -> Result<InterfaceVersion> {
    let rsp = call(messenger, partition_id, CMD_GET_INTERFACE_VERSION, [0; MAX_ARGS])?;
    Ok(InterfaceVersion::from_raw(rsp[SLOT_ARGS] as u32))
}

/// Asks whether the service supports `feature`. Success means it does.
pub fn get_feature_info<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
    feature: u64,
) -> Result<()> {
    call(messenger, partition_id, CMD_GET_FEATURE_INFO, [feature, 0, 0]).map(drop)
}

/// Signals the service that the CRB holds work for it: a command, or a locality request.
pub fn start<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
    qualifier: StartQualifier,
    locality: u8,
) -> Result<()> {
    let args = [qualifier as u64, locality as u64, 0];
    call(messenger, partition_id, CMD_START, args).map(drop)
}

/// Registers `notification_id` to be signalled when a command completes.
pub fn register_notification<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
    notification_type: NotificationType,
    vcpu: u16,
    notification_id: u8,
) -> Result<()> {
    let args = [
        ((notification_type as u64) << 16) | vcpu as u64,
        notification_id as u64,
        0,
    ];
    call(messenger, partition_id, CMD_REGISTER_FOR_NOTIFICATION, args).map(drop)
}

/// Drops a completion notification registration.
pub fn unregister_notification<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
) -> Result<()> {
    call(messenger, partition_id, CMD_UNREGISTER_FROM_NOTIFICATION, [0; MAX_ARGS]).map(drop)
}

/// Acknowledges a completion notification.
pub fn finish_notified<C: Conduit, H: InterruptHandler>(
    messenger: &Messenger<C, H>,
    partition_id: u16,
) -> Result<()> {
    call(messenger, partition_id, CMD_FINISH_NOTIFIED, [0; MAX_ARGS]).map(drop)
}

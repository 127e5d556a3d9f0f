//! FF-A function identifiers.
//!
//! Function identifiers follow the SMC Calling Convention: bit 31 marks a fast call and bit 30
//! selects the 64-bit (`SMC64`) calling convention. Interfaces that exist in both widths have a
//! `_32` and a `_64` constant.
//!
//! References:
//! - <https://developer.arm.com/documentation/den0077/latest> (Table "FF-A function IDs")

/// Major version of the framework this crate implements.
pub const VERSION_MAJOR: u16 = 1;

/// Minor version of the framework this crate implements.
pub const VERSION_MINOR: u16 = 2;

/// Bit set in every 64-bit (`SMC64`) function identifier.
pub const SMC64_BIT: u32 = 1 << 30;

/// Error response. `w2` carries the status code.
pub const ERROR: u32 = 0x8400_0060;

/// Generic success response (32-bit convention).
pub const SUCCESS_32: u32 = 0x8400_0061;

/// Generic success response (64-bit convention).
pub const SUCCESS_64: u32 = 0xC400_0061;

/// Interrupt pending. `w2` carries the interrupt identifier.
pub const INTERRUPT: u32 = 0x8400_0062;

/// Negotiates the framework version.
pub const VERSION: u32 = 0x8400_0063;

/// Queries support and properties of an interface.
pub const FEATURES: u32 = 0x8400_0064;

/// Maps the caller's RX/TX buffer pair (64-bit addresses).
pub const RXTX_MAP_64: u32 = 0xC400_0066;

/// Unmaps the caller's RX/TX buffer pair.
pub const RXTX_UNMAP: u32 = 0x8400_0067;

/// Returns the endpoint id of the caller.
pub const ID_GET: u32 = 0x8400_0069;

/// Blocks until a message arrives. Also ends the boot phase and interrupt handling.
pub const MSG_WAIT: u32 = 0x8400_006B;

/// Direct request, 32-bit payload registers.
pub const MSG_SEND_DIRECT_REQ_32: u32 = 0x8400_006F;

/// Direct request, 64-bit payload registers.
pub const MSG_SEND_DIRECT_REQ_64: u32 = 0xC400_006F;

/// Direct response, 32-bit payload registers.
pub const MSG_SEND_DIRECT_RESP_32: u32 = 0x8400_0070;

/// Direct response, 64-bit payload registers.
pub const MSG_SEND_DIRECT_RESP_64: u32 = 0xC400_0070;

/// Transfers ownership of a memory region (descriptor in the TX buffer).
pub const MEM_DONATE_32: u32 = 0x8400_0071;

/// Transfers ownership of a memory region (descriptor in a caller buffer).
pub const MEM_DONATE_64: u32 = 0xC400_0071;

/// Lends a memory region (descriptor in the TX buffer).
pub const MEM_LEND_32: u32 = 0x8400_0072;

/// Lends a memory region (descriptor in a caller buffer).
pub const MEM_LEND_64: u32 = 0xC400_0072;

/// Shares a memory region (descriptor in the TX buffer).
pub const MEM_SHARE_32: u32 = 0x8400_0073;

/// Shares a memory region (descriptor in a caller buffer).
pub const MEM_SHARE_64: u32 = 0xC400_0073;

/// Requests completion of a donate, lend or share (descriptor in the TX buffer).
pub const MEM_RETRIEVE_REQ_32: u32 = 0x8400_0074;

/// Requests completion of a donate, lend or share (descriptor in a caller buffer).
pub const MEM_RETRIEVE_REQ_64: u32 = 0xC400_0074;

/// Response to a retrieve request.
pub const MEM_RETRIEVE_RESP: u32 = 0x8400_0075;

/// Gives a borrowed region back to its owner.
pub const MEM_RELINQUISH: u32 = 0x8400_0076;

/// Restores exclusive access to a region to its owner.
pub const MEM_RECLAIM: u32 = 0x8400_0077;

/// Creates the notification bitmaps of a partition.
pub const NOTIFICATION_BITMAP_CREATE: u32 = 0x8400_007D;

/// Destroys the notification bitmaps of a partition.
pub const NOTIFICATION_BITMAP_DESTROY: u32 = 0x8400_007E;

/// Binds notifications to a sender.
pub const NOTIFICATION_BIND: u32 = 0x8400_007F;

/// Unbinds notifications from a sender.
pub const NOTIFICATION_UNBIND: u32 = 0x8400_0080;

/// Signals notifications to a receiver.
pub const NOTIFICATION_SET: u32 = 0x8400_0081;

/// Retrieves and clears pending notifications.
pub const NOTIFICATION_GET: u32 = 0x8400_0082;

/// Gets the permissions of a page of the caller's own translation regime.
pub const MEM_PERM_GET_32: u32 = 0x8400_0088;

/// Sets the permissions of pages of the caller's own translation regime.
pub const MEM_PERM_SET_32: u32 = 0x8400_0089;

/// Writes characters packed into 32-bit registers to the debug console.
pub const CONSOLE_LOG_32: u32 = 0x8400_008A;

/// Writes characters packed into 64-bit registers to the debug console.
pub const CONSOLE_LOG_64: u32 = 0xC400_008A;

/// Discovers partitions, returning the descriptors in registers.
pub const PARTITION_INFO_GET_REGS: u32 = 0xC400_008B;

/// Direct request carrying a service identifier (FF-A v1.2).
pub const MSG_SEND_DIRECT_REQ2: u32 = 0xC400_008D;

/// Direct response carrying a service identifier (FF-A v1.2).
pub const MSG_SEND_DIRECT_RESP2: u32 = 0xC400_008E;

/// Returns `true` if `function_id` uses the 64-bit calling convention.
#[inline]
pub const fn is_64bit(function_id: u32) -> bool {
    function_id & SMC64_BIT != 0
}

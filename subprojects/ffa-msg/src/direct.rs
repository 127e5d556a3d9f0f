//! Direct messages and their register layouts.
//!
//! # Layouts
//!
//! | Word | Short (`*_REQ/RESP_32/64`) | Extended (`*_REQ2/RESP2`) |
//! | --- | --- | --- |
//! | `x0` | function id | function id |
//! | `x1` | `source << 16 \| destination` | `source << 16 \| destination` |
//! | `x2`-`x3` | payload `[0..2]` | service id (wire form) |
//! | `x4`-`x7` | payload `[2..6]` | payload `[0..4]` |
//! | `x8`-`x17` | zero | payload `[4..14]` |
//!
//! A bare `FFA_SUCCESS_32` carries only its function id.

use ffa_svc::{
    ServiceId,
    code::{
        MSG_SEND_DIRECT_REQ_32, MSG_SEND_DIRECT_REQ_64, MSG_SEND_DIRECT_REQ2,
        MSG_SEND_DIRECT_RESP_32, MSG_SEND_DIRECT_RESP_64, MSG_SEND_DIRECT_RESP2, SUCCESS_32,
    },
    raw::{NUM_REGS, Regs, endpoint_pair, split_endpoint_pair},
};
use static_assertions::const_assert_eq;

/// Number of payload words of a short message.
pub const SHORT_PAYLOAD_WORDS: usize = 6;

/// Number of payload words of an extended message.
pub const EXTENDED_PAYLOAD_WORDS: usize = 14;

const SHORT_PAYLOAD_START: usize = 2;
const SERVICE_ID_START: usize = 2;
const EXTENDED_PAYLOAD_START: usize = 4;

// The extended payload fills the vector exactly.
const_assert_eq!(EXTENDED_PAYLOAD_START + EXTENDED_PAYLOAD_WORDS, NUM_REGS);

/// Register width of a short message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// 32-bit calling convention. Only the low 32 bits of each payload word are carried.
    W32,
    /// 64-bit calling convention.
    W64,
}

/// The kind of a direct message, which selects its register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ShortRequest(Width),
    ShortResponse(Width),
    ExtendedRequest,
    ExtendedResponse,
    /// Generic success. Returned instead of a message at the end of the boot phase.
    Success,
}

impl MessageKind {
    /// Returns the function id that carries this kind of message.
    pub const fn function_id(self) -> u32 {
        match self {
            Self::ShortRequest(Width::W32) => MSG_SEND_DIRECT_REQ_32,
            Self::ShortRequest(Width::W64) => MSG_SEND_DIRECT_REQ_64,
            Self::ShortResponse(Width::W32) => MSG_SEND_DIRECT_RESP_32,
            Self::ShortResponse(Width::W64) => MSG_SEND_DIRECT_RESP_64,
            Self::ExtendedRequest => MSG_SEND_DIRECT_REQ2,
            Self::ExtendedResponse => MSG_SEND_DIRECT_RESP2,
            Self::Success => SUCCESS_32,
        }
    }

    /// Identifies the message kind carried by `function_id`.
    ///
    /// Only `FFA_SUCCESS_32` is recognised as [`Success`](Self::Success).
    pub const fn from_function_id(function_id: u32) -> Option<Self> {
        Some(match function_id {
            MSG_SEND_DIRECT_REQ_32 => Self::ShortRequest(Width::W32),
            MSG_SEND_DIRECT_REQ_64 => Self::ShortRequest(Width::W64),
            MSG_SEND_DIRECT_RESP_32 => Self::ShortResponse(Width::W32),
            MSG_SEND_DIRECT_RESP_64 => Self::ShortResponse(Width::W64),
            MSG_SEND_DIRECT_REQ2 => Self::ExtendedRequest,
            MSG_SEND_DIRECT_RESP2 => Self::ExtendedResponse,
            SUCCESS_32 => Self::Success,
            _ => return None,
        })
    }

    /// Whether the message expects a response.
    #[inline]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::ShortRequest(_) | Self::ExtendedRequest)
    }

    /// Whether the message uses the extended layout.
    #[inline]
    pub const fn is_extended(self) -> bool {
        matches!(self, Self::ExtendedRequest | Self::ExtendedResponse)
    }
}

/// Error decoding a register vector into a [`DirectMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// `x0` does not identify a direct message or a generic success.
    #[error("unrecognised function id {0:#010x}")]
    UnrecognisedFunctionId(u32),
}

/// A direct message.
///
/// Short messages use `args[..6]` and carry [`ServiceId::NIL`]. The remaining words are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMessage {
    pub kind: MessageKind,
    pub source: u16,
    pub destination: u16,
    pub service_id: ServiceId,
    pub args: [u64; EXTENDED_PAYLOAD_WORDS],
}

impl DirectMessage {
    /// Builds a short message of `kind` with `args` as payload.
    fn short(
        kind: MessageKind,
        source: u16,
        destination: u16,
        args: [u64; SHORT_PAYLOAD_WORDS],
    ) -> Self {
        let mut words = [0; EXTENDED_PAYLOAD_WORDS];
        words[..SHORT_PAYLOAD_WORDS].copy_from_slice(&args);
        Self {
            kind,
            source,
            destination,
            service_id: ServiceId::NIL,
            args: words,
        }
    }

    /// Builds a short request from `source` to `destination`.
    pub fn short_request(
        width: Width,
        source: u16,
        destination: u16,
        args: [u64; SHORT_PAYLOAD_WORDS],
    ) -> Self {
        Self::short(MessageKind::ShortRequest(width), source, destination, args)
    }

    /// Builds a short response from `source` to `destination`.
    pub fn short_response(
        width: Width,
        source: u16,
        destination: u16,
        args: [u64; SHORT_PAYLOAD_WORDS],
    ) -> Self {
        Self::short(MessageKind::ShortResponse(width), source, destination, args)
    }

    /// Builds an extended request addressed to the service `service_id` of `destination`.
    pub fn extended_request(
        source: u16,
        destination: u16,
        service_id: ServiceId,
        args: [u64; EXTENDED_PAYLOAD_WORDS],
    ) -> Self {
        Self {
            kind: MessageKind::ExtendedRequest,
            source,
            destination,
            service_id,
            args,
        }
    }

    /// Builds an extended response from the service `service_id` of `source`.
    pub fn extended_response(
        source: u16,
        destination: u16,
        service_id: ServiceId,
        args: [u64; EXTENDED_PAYLOAD_WORDS],
    ) -> Self {
        Self {
            kind: MessageKind::ExtendedResponse,
            source,
            destination,
            service_id,
            args,
        }
    }

    /// The generic success message.
    pub fn success() -> Self {
        Self {
            kind: MessageKind::Success,
            source: 0,
            destination: 0,
            service_id: ServiceId::NIL,
            args: [0; EXTENDED_PAYLOAD_WORDS],
        }
    }

    /// Returns the short payload words.
    #[inline]
    pub fn short_args(&self) -> [u64; SHORT_PAYLOAD_WORDS] {
        core::array::from_fn(|i| self.args[i])
    }

    /// Packs the message into a register vector.
    pub fn encode(&self) -> Regs {
        let mut regs = Regs::new(self.kind.function_id());

        match self.kind {
            MessageKind::Success => {}
            MessageKind::ShortRequest(width) | MessageKind::ShortResponse(width) => {
                regs[1] = endpoint_pair(self.source, self.destination);
                for (slot, arg) in regs.0[SHORT_PAYLOAD_START..][..SHORT_PAYLOAD_WORDS]
                    .iter_mut()
                    .zip(self.short_args())
                {
                    *slot = match width {
                        Width::W32 => arg as u32 as u64,
                        Width::W64 => arg,
                    };
                }
            }
            MessageKind::ExtendedRequest | MessageKind::ExtendedResponse => {
                regs[1] = endpoint_pair(self.source, self.destination);
                let [lo, hi] = self.service_id.to_wire();
                regs[SERVICE_ID_START] = lo;
                regs[SERVICE_ID_START + 1] = hi;
                regs.0[EXTENDED_PAYLOAD_START..].copy_from_slice(&self.args);
            }
        }

        regs
    }

    /// Unpacks a register vector.
    pub fn decode(regs: &Regs) -> Result<Self, DecodeError> {
        let function_id = regs.function_id();
        let kind = MessageKind::from_function_id(function_id)
            .ok_or(DecodeError::UnrecognisedFunctionId(function_id))?;

        let (source, destination) = split_endpoint_pair(regs[1]);

        let msg = match kind {
            MessageKind::Success => Self::success(),
            MessageKind::ShortRequest(width) | MessageKind::ShortResponse(width) => {
                let mut args = [0; SHORT_PAYLOAD_WORDS];
                for (arg, &word) in args
                    .iter_mut()
                    .zip(&regs.0[SHORT_PAYLOAD_START..][..SHORT_PAYLOAD_WORDS])
                {
                    *arg = match width {
                        Width::W32 => word as u32 as u64,
                        Width::W64 => word,
                    };
                }
                Self::short(kind, source, destination, args)
            }
            MessageKind::ExtendedRequest | MessageKind::ExtendedResponse => {
                let service_id =
                    ServiceId::from_wire([regs[SERVICE_ID_START], regs[SERVICE_ID_START + 1]]);
                let mut args = [0; EXTENDED_PAYLOAD_WORDS];
                args.copy_from_slice(&regs.0[EXTENDED_PAYLOAD_START..]);
                Self {
                    kind,
                    source,
                    destination,
                    service_id,
                    args,
                }
            }
        };

        Ok(msg)
    }
}

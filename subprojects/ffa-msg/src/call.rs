//! Blocking direct message exchanges.
//!
//! A call moves through the following states:
//!
//! ```text
//! Idle ──send──► Sent ──FFA_INTERRUPT──► Interrupted ──handler, FFA_MSG_WAIT──► Sent
//!                  │
//!                  ├──FFA_ERROR──────────────► Resolved(Err(status))
//!                  ├──expected kind/SUCCESS──► Resolved(Ok(message))
//!                  └──anything else──────────► Resolved(Err(DeviceError))
//! ```
//!
//! The partition manager is trusted to eventually answer with a terminal response, so the
//! interrupt loop is unbounded. [`Messenger::with_interrupt_limit`] caps it for tests.

use core::cell::OnceCell;

use ffa_svc::{
    Error, Result, ServiceId,
    code::{ERROR, INTERRUPT, MSG_WAIT},
    misc,
    raw::{Conduit, Regs},
};

use crate::{
    direct::{DirectMessage, EXTENDED_PAYLOAD_WORDS, MessageKind, SHORT_PAYLOAD_WORDS, Width},
    interrupt::{InterruptHandler, NullHandler},
};

/// The terminal message kinds a call accepts, besides a bare `FFA_SUCCESS`.
#[derive(Debug, Clone, Copy)]
enum Expect {
    /// A response of exactly this kind.
    Response(MessageKind),
    /// Any incoming request (message wait and the responder path).
    AnyRequest,
}

impl Expect {
    fn accepts(self, kind: MessageKind) -> bool {
        match (self, kind) {
            (_, MessageKind::Success) => true,
            (Self::Response(expected), kind) => expected == kind,
            (Self::AnyRequest, kind) => kind.is_request(),
        }
    }
}

/// Outcome of examining one response.
enum Transition {
    /// An interrupt is pending. The call resumes once it has been handled.
    Interrupted(u32),
    /// The callee reported an error status.
    Failed(Error),
    /// The call completed with the expected message.
    Resolved(DirectMessage),
    /// The response violates the protocol.
    Violation(u32),
}

fn classify(response: &Regs, expect: Expect) -> Transition {
    match response.function_id() {
        INTERRUPT => Transition::Interrupted(response[2] as u32),
        ERROR => Transition::Failed(Error::from_status(response[2] as u32 as i32)),
        fid => match DirectMessage::decode(response) {
            Ok(msg) if expect.accepts(msg.kind) => Transition::Resolved(msg),
            _ => Transition::Violation(fid),
        },
    }
}

/// Sends direct messages through a conduit on behalf of one partition.
///
/// The partition's own endpoint id is queried on first use and cached.
pub struct Messenger<C, H = NullHandler> {
    conduit: C,
    handler: H,
    own_id: OnceCell<u16>,
    interrupt_limit: Option<usize>,
}

impl<C: Conduit> Messenger<C> {
    /// Creates a messenger that ignores interrupts.
    pub fn new(conduit: C) -> Self {
        Self::with_handler(conduit, NullHandler)
    }
}

impl<C: Conduit, H: InterruptHandler> Messenger<C, H> {
    /// Creates a messenger that hands interrupts to `handler`.
    pub fn with_handler(conduit: C, handler: H) -> Self {
        Self {
            conduit,
            handler,
            own_id: OnceCell::new(),
            interrupt_limit: None,
        }
    }

    /// Caps the number of interrupts absorbed by a single call.
    ///
    /// A call that sees more than `limit` interrupts resolves to [`Error::Aborted`].
    pub fn with_interrupt_limit(mut self, limit: usize) -> Self {
        self.interrupt_limit = Some(limit);
        self
    }

    /// Returns the underlying conduit, for single-shot interfaces.
    #[inline]
    pub fn conduit(&self) -> &C {
        &self.conduit
    }

    /// Returns the endpoint id of this partition.
    pub fn own_id(&self) -> Result<u16> {
        if let Some(&id) = self.own_id.get() {
            return Ok(id);
        }

        let id = misc::id_get(&self.conduit)?;
        log::debug!("own endpoint id {id:#06x}");
        Ok(*self.own_id.get_or_init(|| id))
    }

    /// Waits for the next incoming request.
    ///
    /// Returns a [`MessageKind::Success`] message when the partition manager ends the boot
    /// phase instead of delivering a request.
    pub fn message_wait(&self) -> Result<DirectMessage> {
        self.exchange(Regs::new(MSG_WAIT), Expect::AnyRequest)
    }

    /// Sends a short direct request and waits for the response.
    pub fn send_direct_req(
        &self,
        width: Width,
        destination: u16,
        args: [u64; SHORT_PAYLOAD_WORDS],
    ) -> Result<DirectMessage> {
        let msg = DirectMessage::short_request(width, self.own_id()?, destination, args);
        self.exchange(msg.encode(), Expect::Response(MessageKind::ShortResponse(width)))
    }

    /// Sends an extended direct request to the service `service_id` of `destination` and waits
    /// for the response.
    pub fn send_direct_req2(
        &self,
        destination: u16,
        service_id: ServiceId,
        args: [u64; EXTENDED_PAYLOAD_WORDS],
    ) -> Result<DirectMessage> {
        let msg = DirectMessage::extended_request(self.own_id()?, destination, service_id, args);
        self.exchange(msg.encode(), Expect::Response(MessageKind::ExtendedResponse))
    }

    /// Answers `request` with a short response and waits for the next request.
    pub fn send_direct_resp(
        &self,
        width: Width,
        request: &DirectMessage,
        args: [u64; SHORT_PAYLOAD_WORDS],
    ) -> Result<DirectMessage> {
        let msg =
            DirectMessage::short_response(width, request.destination, request.source, args);
        self.exchange(msg.encode(), Expect::AnyRequest)
    }

    /// Answers `request` with an extended response and waits for the next request.
    pub fn send_direct_resp2(
        &self,
        request: &DirectMessage,
        args: [u64; EXTENDED_PAYLOAD_WORDS],
    ) -> Result<DirectMessage> {
        let msg = DirectMessage::extended_response(
            request.destination,
            request.source,
            request.service_id,
            args,
        );
        self.exchange(msg.encode(), Expect::AnyRequest)
    }

    /// Runs one call to completion.
    fn exchange(&self, request: Regs, expect: Expect) -> Result<DirectMessage> {
        let mut response = self.conduit.invoke(request);
        let mut interrupts = 0usize;

        loop {
            match classify(&response, expect) {
                Transition::Interrupted(id) => {
                    interrupts += 1;
                    if self.interrupt_limit.is_some_and(|limit| interrupts > limit) {
                        log::warn!(
                            "call {:#010x} aborted after {} interrupts",
                            request.function_id(),
                            interrupts - 1
                        );
                        return Err(Error::Aborted);
                    }

                    log::trace!("handling interrupt {id}");
                    self.handler.handle(id);
                    response = self.conduit.invoke(Regs::new(MSG_WAIT));
                }
                Transition::Failed(err) => return Err(err),
                Transition::Resolved(msg) => return Ok(msg),
                Transition::Violation(fid) => {
                    log::error!(
                        "unexpected response {fid:#010x} to call {:#010x} (expected {expect:?})",
                        request.function_id()
                    );
                    return Err(Error::DeviceError);
                }
            }
        }
    }
}

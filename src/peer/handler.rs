// ABOUTME: Caller-facing hooks for a bound session: outgoing message source and message callbacks
// ABOUTME: Uses native async trait methods, with Send futures so handler work can run on spawned tasks

use crate::datatypes::{BindMode, BindRequest, BindResponse, CommandId, MessageRequest, MessageResponse};
use crate::queue::AsyncQueue;
use std::future::Future;
use std::sync::Arc;

/// Which side of the link a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates the bind, submits messages and receives deliveries
    Esme,
    /// Answers the bind, delivers messages and receives submissions
    Smsc,
}

impl Role {
    /// Command id of message requests this role sends
    pub fn local_message_id(self) -> CommandId {
        match self {
            Role::Esme => CommandId::SubmitSm,
            Role::Smsc => CommandId::DeliverSm,
        }
    }

    /// Command id of message requests this role receives
    pub fn remote_message_id(self) -> CommandId {
        match self {
            Role::Esme => CommandId::DeliverSm,
            Role::Smsc => CommandId::SubmitSm,
        }
    }
}

/// A PDU body travelling with caller data that comes back untouched with
/// its response.
#[derive(Debug, Clone, PartialEq)]
pub struct PduWithContext<P, Ctx> {
    pub pdu: P,
    pub context: Ctx,
}

impl<P, Ctx> PduWithContext<P, Ctx> {
    pub fn new(pdu: P, context: Ctx) -> Self {
        Self { pdu, context }
    }
}

/// The completed bind exchange handed to [`SessionHandler::on_bound`].
#[derive(Debug, Clone, PartialEq)]
pub struct BindTx {
    pub mode: BindMode,
    pub request: BindRequest,
    pub response: BindResponse,
}

/// Queue of message requests a bound session sends on the caller's behalf
pub type OutboundMessages<Ctx> = Arc<AsyncQueue<PduWithContext<MessageRequest, Ctx>>>;

/// Role-specific behaviour of a bound session.
///
/// The session calls `on_bound` once the bind succeeds and then drains the
/// returned queue for as long as it may send. Every message request from
/// the peer goes to `on_message_request`, whose answer is sent back with the
/// request's sequence number. Answers to the caller's own requests arrive
/// at `on_message_response` together with the context they were queued with.
pub trait SessionHandler: Send + Sync + 'static {
    type Context: Send + 'static;

    fn on_bound(
        &self,
        bind: &BindTx,
    ) -> impl Future<Output = crate::Result<OutboundMessages<Self::Context>>> + Send;

    fn on_message_request(
        &self,
        request: MessageRequest,
    ) -> impl Future<Output = MessageResponse> + Send;

    fn on_message_response(
        &self,
        request: PduWithContext<MessageRequest, Self::Context>,
        response: MessageResponse,
    ) -> impl Future<Output = ()> + Send;
}

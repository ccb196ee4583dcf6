pub mod codec;
pub mod connection;
pub mod datatypes;
pub mod frame;
pub(crate) mod macros;
pub mod pdu;
pub mod peer;
pub mod queue;
pub mod window;


// Re-export codec types for direct access
pub use codec::{CodecError, Decodable, Encodable, PduHeader};
pub use pdu::Pdu;

// Re-export the session API for easy access
pub use peer::{
    BindTx, PduWithContext, PeerConfig, PeerError, SessionHandler, SessionReport, SmppPeer,
};

/// Error returned by caller-supplied handlers.
///
/// Handlers live outside this crate and fail for reasons the session cannot
/// enumerate, so a boxed `std::error::Error` is used at that seam. Everything
/// inside the crate has its own `thiserror` enum.
///
/// # Examples
///
/// ## ESME and SMSC over an in-memory stream
///
/// ```rust,no_run
/// use smpp_peer::datatypes::{BindMode, BindRequest, BindResponse, MessageRequest, MessageResponse};
/// use smpp_peer::peer::{BindTx, OutboundMessages, PduWithContext, PeerConfig, SessionHandler, SmppPeer};
/// use smpp_peer::queue::AsyncQueue;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// struct Echo;
///
/// impl SessionHandler for Echo {
///     type Context = ();
///
///     async fn on_bound(&self, _bind: &BindTx) -> Result<OutboundMessages<()>, smpp_peer::Error> {
///         Ok(Arc::new(AsyncQueue::new(8)))
///     }
///
///     async fn on_message_request(&self, request: MessageRequest) -> MessageResponse {
///         MessageResponse::new(request.sequence_number, "")
///     }
///
///     async fn on_message_response(&self, _request: PduWithContext<MessageRequest, ()>, _response: MessageResponse) {}
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (esme_side, smsc_side) = tokio::io::duplex(4096);
///     let shutdown = CancellationToken::new();
///
///     let smsc = SmppPeer::new(smsc_side, PeerConfig::default(), CancellationToken::new())?;
///     tokio::spawn(smsc.run_smsc(
///         |_mode, request: BindRequest| async move { BindResponse::new(request.sequence_number, "smsc") },
///         Arc::new(Echo),
///     ));
///
///     let esme = SmppPeer::new(esme_side, PeerConfig::default(), shutdown.clone())?;
///     let bind = BindRequest::builder().system_id("foo").password("bar").build()?;
///     let report = esme.run_esme(BindMode::Transceiver, bind, Arc::new(Echo)).await;
///
///     for (name, error) in report.failures() {
///         eprintln!("{name}: {error}");
///     }
///     Ok(())
/// }
/// ```
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for handler callbacks.
pub type Result<T> = std::result::Result<T, Error>;

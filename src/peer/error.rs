// ABOUTME: Session-level error taxonomy wrapping framing, codec, queue and window failures
// ABOUTME: Distinguishes cancellation from genuine failures so reports can filter it out

use crate::codec::CodecError;
use crate::connection::WriteError;
use crate::datatypes::{CommandId, CommandStatus};
use crate::frame::FrameError;
use crate::peer::config::ConfigError;
use crate::queue::QueueError;
use crate::window::WindowError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    /// Reading frames from the stream failed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// A received frame could not be decoded
    #[error("Decode error: {0}")]
    Codec(#[from] CodecError),

    /// Writing a PDU to the stream failed
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Window(#[from] WindowError<u32>),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A PDU of the wrong kind arrived at a given point of the exchange
    #[error("Expected {context}, instead got command_id={command_id:?}")]
    UnexpectedCommand {
        context: &'static str,
        command_id: CommandId,
    },

    #[error("Expected {context} with command_status=ESME_ROK, instead got {status}")]
    UnexpectedStatus {
        context: &'static str,
        status: CommandStatus,
    },

    #[error("ESME failed authentication with response command_status={0}")]
    AuthenticationFailed(CommandStatus),

    #[error("No handler for remote request with command_id={0:?}")]
    UnhandledRequest(CommandId),

    #[error("Got an unknown correlation match: request={request:?} response={response:?}")]
    UnknownCorrelation {
        request: CommandId,
        response: CommandId,
    },

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Expected {0}, instead got none")]
    Missing(&'static str),

    #[error("Unbind due to external abort signal timed out after {}ms", .0.as_millis())]
    UnbindTimeout(Duration),

    #[error("Loop did not finish within {}ms of shutdown", .0.as_millis())]
    ShutdownTimeout(Duration),

    #[error("Message handler task failed: {0}")]
    HandlerPanicked(String),

    #[error("Handler error: {0}")]
    Handler(#[source] crate::Error),
}

impl PeerError {
    /// True when the error only reports that the session was already being
    /// torn down.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PeerError::Queue(QueueError::Completed)
                | PeerError::Window(WindowError::Aborted)
                | PeerError::Window(WindowError::Queue(QueueError::Completed))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognised_through_wrappers() {
        assert!(PeerError::from(QueueError::Completed).is_cancellation());
        assert!(PeerError::from(WindowError::<u32>::Aborted).is_cancellation());
        assert!(PeerError::from(WindowError::<u32>::Queue(QueueError::Completed)).is_cancellation());
        assert!(!PeerError::Timeout("bind response").is_cancellation());
        assert!(!PeerError::from(WindowError::<u32>::UnrecognizedId(3)).is_cancellation());
    }

    #[test]
    fn messages_name_the_offending_values() {
        assert_eq!(
            PeerError::Missing("a bind response from SMSC").to_string(),
            "Expected a bind response from SMSC, instead got none"
        );
        assert_eq!(
            PeerError::UnbindTimeout(Duration::from_millis(1500)).to_string(),
            "Unbind due to external abort signal timed out after 1500ms"
        );
        assert_eq!(
            PeerError::UnhandledRequest(CommandId::SubmitSm).to_string(),
            "No handler for remote request with command_id=SubmitSm"
        );
        assert!(PeerError::AuthenticationFailed(CommandStatus::BindFailed)
            .to_string()
            .starts_with("ESME failed authentication with response command_status=ESME_RBINDFAIL"));
    }
}

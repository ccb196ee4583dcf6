// ABOUTME: SMPP peer session module: one type that plays either the ESME or the SMSC side of a link
// ABOUTME: Exports the session, its configuration, handler trait, error type and run report

//! SMPP Peer Module
//!
//! * **One session, two roles** - the ESME side binds and submits, the SMSC
//!   side authenticates and delivers; everything else is shared
//! * **Windowed** - at most `window_size` requests await a response, each
//!   with its own deadline
//! * **Keep-alive** - enquire_link on a fixed interval while bound
//! * **Graceful shutdown** - cancelling the shutdown token unbinds first
//! * **Per-loop report** - every concurrent loop's outcome is returned
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smpp_peer::datatypes::{BindMode, BindRequest};
//! use smpp_peer::peer::{PeerConfig, SessionHandler, SmppPeer};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::net::TcpStream;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example<H: SessionHandler>(handler: Arc<H>) -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("localhost:2775").await?;
//! let shutdown = CancellationToken::new();
//! let config = PeerConfig::new().with_enquire_link_interval(Duration::from_secs(60));
//!
//! let peer = SmppPeer::new(stream, config, shutdown.clone())?;
//! let bind = BindRequest::builder()
//!     .system_id("system_id")
//!     .password("password")
//!     .build()?;
//!
//! // Cancel `shutdown` from elsewhere to unbind
//! let report = peer.run_esme(BindMode::Transceiver, bind, handler).await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod report;
pub mod session;

pub use config::{ConfigError, PeerConfig};
pub use error::PeerError;
pub use handler::{BindTx, OutboundMessages, PduWithContext, Role, SessionHandler};
pub use report::SessionReport;
pub use session::{Direction, PduTap, SessionState, SmppPeer, MAX_SEQUENCE_NUMBER};

// ABOUTME: Runs an ESME and an SMSC against each other over a local TCP connection
// ABOUTME: Submits a handful of messages, unbinds cleanly and prints both session reports

//! # Loopback SMPP Session
//!
//! Both ends of the link are [`SmppPeer`]s in this process: the SMSC side
//! accepts one connection and authenticates the bind, the ESME side submits
//! `--count` messages and then cancels its shutdown token to unbind.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example loopback -- --count 5 --to 12015551234 --message "Hello"
//!
//! # Show every PDU on the wire
//! cargo run --example loopback -- -d
//! ```

use argh::FromArgs;
use smpp_peer::datatypes::{
    BindMode, BindRequest, BindResponse, CommandStatus, MessageRequest, MessageResponse,
    NumericPlanIndicator, TypeOfNumber,
};
use smpp_peer::peer::{
    BindTx, Direction, OutboundMessages, PduWithContext, PeerConfig, SessionHandler,
    SessionReport, SmppPeer,
};
use smpp_peer::queue::AsyncQueue;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Run an ESME and an SMSC against each other on localhost
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to log every PDU
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the system id the ESME binds with (default: esme)
    #[argh(option)]
    system_id: Option<String>,

    /// the password the ESME binds with (default: secret)
    #[argh(option)]
    password: Option<String>,

    /// how many messages to submit (default: 3)
    #[argh(option, short = 'n')]
    count: Option<u32>,

    /// the recipient telephone number (default: 12015551234)
    #[argh(option, short = 't')]
    to: Option<String>,

    /// the message text (default: Hello from smpp-peer)
    #[argh(option, short = 'm')]
    message: Option<String>,

    /// enquire_link interval in seconds (default: 30)
    #[argh(option)]
    enquire_link_interval: Option<u64>,
}

/// SMSC side: accepts every submission and numbers the message ids
struct Smsc {
    outbound: OutboundMessages<()>,
    next_id: AtomicU32,
}

impl SessionHandler for Smsc {
    type Context = ();

    async fn on_bound(&self, bind: &BindTx) -> smpp_peer::Result<OutboundMessages<()>> {
        info!(system_id = %bind.request.system_id, mode = ?bind.mode, "SMSC accepted bind");
        Ok(self.outbound.clone())
    }

    async fn on_message_request(&self, request: MessageRequest) -> MessageResponse {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            to = %request.destination_addr,
            text = %String::from_utf8_lossy(&request.short_message),
            "SMSC received submit_sm"
        );
        MessageResponse::new(0, format!("msg-{id:04}"))
    }

    async fn on_message_response(&self, _request: PduWithContext<MessageRequest, ()>, _response: MessageResponse) {}
}

/// ESME side: reports every submit_sm_resp back to `main`
struct Esme {
    outbound: OutboundMessages<u32>,
    answered: mpsc::UnboundedSender<(u32, MessageResponse)>,
}

impl SessionHandler for Esme {
    type Context = u32;

    async fn on_bound(&self, bind: &BindTx) -> smpp_peer::Result<OutboundMessages<u32>> {
        info!(smsc = %bind.response.system_id, "ESME bound");
        Ok(self.outbound.clone())
    }

    async fn on_message_request(&self, request: MessageRequest) -> MessageResponse {
        debug!(from = %request.source_addr, "ESME received deliver_sm");
        MessageResponse::new(0, "")
    }

    async fn on_message_response(&self, request: PduWithContext<MessageRequest, u32>, response: MessageResponse) {
        let _ = self.answered.send((request.context, response));
    }
}

async fn authenticate(system_id: String, password: String, request: BindRequest) -> BindResponse {
    if request.system_id == system_id && request.password == password {
        BindResponse::new(request.sequence_number, "loopback")
    } else {
        BindResponse::error(request.sequence_number, CommandStatus::InvalidPassword)
    }
}

fn print_report(side: &str, report: &SessionReport) {
    for (task, outcome) in report.iter() {
        match outcome {
            Ok(()) => debug!(side, task, "ok"),
            Err(e) if e.is_cancellation() => debug!(side, task, error = %e, "cancelled"),
            Err(e) => warn!(side, task, error = %e, "failed"),
        }
    }
    info!(side, clean = report.is_clean(), loops = report.len(), "session finished");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::TRACE } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let system_id = cli_args.system_id.unwrap_or_else(|| "esme".to_owned());
    let password = cli_args.password.unwrap_or_else(|| "secret".to_owned());
    let count = cli_args.count.unwrap_or(3);
    let to = cli_args.to.unwrap_or_else(|| "12015551234".to_owned());
    let message = cli_args.message.unwrap_or_else(|| "Hello from smpp-peer".to_owned());
    let config = PeerConfig::new()
        .with_enquire_link_interval(Duration::from_secs(cli_args.enquire_link_interval.unwrap_or(30)));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    info!("SMSC listening on {address}");

    let smsc_config = config.clone();
    let (expected_id, expected_password) = (system_id.clone(), password.clone());
    let smsc = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await?;
        info!("SMSC accepted connection from {peer}");
        let handler = Arc::new(Smsc {
            outbound: Arc::new(AsyncQueue::new(1)),
            next_id: AtomicU32::new(1),
        });
        let session = SmppPeer::new(stream, smsc_config, CancellationToken::new())?;
        let report = session
            .run_smsc(
                move |_mode, request| authenticate(expected_id, expected_password, request),
                handler,
            )
            .await;
        Ok::<_, Box<dyn Error + Send + Sync>>(report)
    });

    let shutdown = CancellationToken::new();
    let (answered, mut responses) = mpsc::unbounded_channel();
    let outbound = Arc::new(AsyncQueue::new(config.queue_capacity));
    let handler = Arc::new(Esme {
        outbound: outbound.clone(),
        answered,
    });

    let stream = TcpStream::connect(address).await?;
    let session = SmppPeer::new(stream, config, shutdown.clone())?.with_tap(|direction: Direction, pdu: &smpp_peer::Pdu| {
        if direction == Direction::Outgoing {
            debug!(command_id = ?pdu.command_id(), "ESME wrote");
        }
    });
    let bind = BindRequest::builder()
        .system_id(system_id)
        .password(password)
        .build()?;
    let esme = tokio::spawn(session.run_esme(BindMode::Transceiver, bind, handler));

    for n in 1..=count {
        let request = MessageRequest::builder()
            .source_addr("12345")
            .destination_addr(to.as_str())
            .dest_numbering(TypeOfNumber::International, NumericPlanIndicator::Isdn)
            .registered_delivery(1)
            .short_message(message.clone().into_bytes())
            .build()?;
        outbound.enqueue(PduWithContext::new(request, n)).await?;
    }

    for _ in 0..count {
        let Some((n, response)) = responses.recv().await else {
            warn!("ESME session ended before every message was answered");
            break;
        };
        info!(n, status = %response.command_status, message_id = %response.message_id, "submit_sm_resp");
    }

    shutdown.cancel();
    let esme_report = esme.await?;
    print_report("esme", &esme_report);
    match smsc.await? {
        Ok(report) => print_report("smsc", &report),
        Err(e) => warn!(error = %e, "SMSC failed to start"),
    }

    Ok(())
}

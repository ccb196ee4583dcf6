//! SMPP peer session
//!
//! A session is a fixed set of loops joined on one task. They talk to each
//! other only through [`AsyncQueue`]s and share a single internal abort token:
//!
//! * `conn_read` splits the stream into frames, `incoming` decodes them and
//!   separates requests from responses.
//! * `local_requests` runs the correlation window over everything this side
//!   sends, `local_correlation_matches` routes each matched response to the
//!   bind, unbind, enquire_link or message queue its request belongs to.
//! * `outgoing` is the only writer of the stream.
//! * Once bound: `external_abort`, `local_enquire_links`, `remote_requests`,
//!   `local_message_requests`, `remote_message_requests`,
//!   `local_message_responses` and `remote_message_responses`.
//!
//! Any loop failing, the stream closing, or the unbind exchange finishing
//! cancels the abort token, which completes every queue so all loops drain
//! and return. The result is a [`SessionReport`] holding each loop's outcome.

use crate::codec::CodecError;
use crate::connection::FrameWriter;
use crate::datatypes::{
    BindMode, BindRequest, BindResponse, CommandId, EnquireLink, EnquireLinkResponse,
    GenericNack, MessageRequest, MessageResponse, Unbind, UnbindResponse,
};
use crate::frame::FrameReader;
use crate::pdu::Pdu;
use crate::peer::config::PeerConfig;
use crate::peer::error::PeerError;
use crate::peer::handler::{BindTx, OutboundMessages, PduWithContext, Role, SessionHandler};
use crate::peer::report::SessionReport;
use crate::queue::{AsyncQueue, QueueError};
use crate::window::{CorrelationMatch, CorrelationWindow, WindowConfig};
use bytes::Bytes;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Highest sequence number handed out before wrapping back to 1
pub const MAX_SEQUENCE_NUMBER: u32 = 0x7FFF_FFFE;

/// Matched responses are handed over one at a time
const CORRELATION_MATCH_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Binding,
    Bound,
    Unbinding,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Observer called with every PDU the session decodes or is about to write
pub type PduTap = Arc<dyn Fn(Direction, &Pdu) + Send + Sync>;

type Outcome = (&'static str, Result<(), PeerError>);

/// One SMPP session over a duplex byte stream.
///
/// The same type plays either role: [`SmppPeer::run_esme`] binds and then
/// submits, [`SmppPeer::run_smsc`] authenticates the peer's bind and then
/// delivers. Cancelling `shutdown` while bound sends an unbind and waits for
/// its response before tearing the session down.
pub struct SmppPeer<S> {
    stream: S,
    config: PeerConfig,
    shutdown: CancellationToken,
    tap: Option<PduTap>,
    state: watch::Sender<SessionState>,
}

impl<S> SmppPeer<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(
        stream: S,
        config: PeerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, PeerError> {
        config.validate()?;
        let (state, _) = watch::channel(SessionState::Unbound);
        Ok(SmppPeer {
            stream,
            config,
            shutdown,
            tap: None,
            state,
        })
    }

    /// Observe every PDU read from or written to the stream
    pub fn with_tap<F>(mut self, tap: F) -> Self
    where
        F: Fn(Direction, &Pdu) + Send + Sync + 'static,
    {
        let tap: PduTap = Arc::new(tap);
        self.tap = Some(tap);
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Bind with `request` and run the session until it closes.
    pub async fn run_esme<H>(
        self,
        mode: BindMode,
        request: BindRequest,
        handler: Arc<H>,
    ) -> SessionReport
    where
        H: SessionHandler,
    {
        let SmppPeer {
            stream,
            config,
            shutdown,
            tap,
            state,
        } = self;
        let (reader, writer) = tokio::io::split(stream);
        let session = Session::<H::Context>::new(Role::Esme, config, shutdown, tap, state);

        let bind = session.initiate_bind(mode, request);
        session.drive(reader, writer, bind, handler).await
    }

    /// Wait for the peer's bind, answer it with `authenticate` and run the
    /// session until it closes. A non-OK response is sent to the peer and
    /// ends the session.
    pub async fn run_smsc<H, A, AF>(self, authenticate: A, handler: Arc<H>) -> SessionReport
    where
        H: SessionHandler,
        A: FnOnce(BindMode, BindRequest) -> AF,
        AF: Future<Output = BindResponse>,
    {
        let SmppPeer {
            stream,
            config,
            shutdown,
            tap,
            state,
        } = self;
        let (reader, writer) = tokio::io::split(stream);
        let session = Session::<H::Context>::new(Role::Smsc, config, shutdown, tap, state);

        let bind = session.accept_bind(authenticate);
        session.drive(reader, writer, bind, handler).await
    }
}

#[derive(Debug, Default)]
struct Sequence {
    last: u32,
    // Set once an unbind has been queued or received
    unbound: bool,
}

impl Sequence {
    fn next(&mut self) -> u32 {
        self.last = if self.last >= MAX_SEQUENCE_NUMBER {
            1
        } else {
            self.last + 1
        };
        self.last
    }
}

#[derive(Debug)]
struct LocalRequest<Ctx> {
    pdu: Pdu,
    context: Option<Ctx>,
}

type Correlated<Ctx> = CorrelationMatch<LocalRequest<Ctx>, Pdu, u32>;
type MessageOutcome<Ctx> = (PduWithContext<MessageRequest, Ctx>, MessageResponse);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session<Ctx> {
    role: Role,
    config: PeerConfig,
    shutdown: CancellationToken,
    abort: CancellationToken,
    tap: Option<PduTap>,
    state: watch::Sender<SessionState>,

    sequence: Mutex<Sequence>,
    pending_remote_unbind: Mutex<Option<Unbind>>,

    incoming_raw: AsyncQueue<Bytes>,
    outgoing: AsyncQueue<Pdu>,
    remote_requests: AsyncQueue<Pdu>,
    remote_responses: AsyncQueue<Pdu>,
    local_requests: AsyncQueue<LocalRequest<Ctx>>,
    correlation_matches: AsyncQueue<Correlated<Ctx>>,

    // Matched responses, by what their request was
    bind_responses: AsyncQueue<Pdu>,
    unbind_responses: AsyncQueue<Pdu>,
    enquire_link_responses: AsyncQueue<Pdu>,
    message_responses: AsyncQueue<MessageOutcome<Ctx>>,

    remote_message_requests: AsyncQueue<MessageRequest>,
    local_message_responses: Arc<AsyncQueue<Pdu>>,
    outbound: OnceLock<OutboundMessages<Ctx>>,
}

impl<Ctx: Send + 'static> Session<Ctx> {
    fn new(
        role: Role,
        config: PeerConfig,
        shutdown: CancellationToken,
        tap: Option<PduTap>,
        state: watch::Sender<SessionState>,
    ) -> Self {
        let capacity = config.queue_capacity;
        Session {
            role,
            config,
            shutdown,
            abort: CancellationToken::new(),
            tap,
            state,
            sequence: Mutex::new(Sequence::default()),
            pending_remote_unbind: Mutex::new(None),
            incoming_raw: AsyncQueue::new(capacity),
            outgoing: AsyncQueue::new(capacity),
            remote_requests: AsyncQueue::new(capacity),
            remote_responses: AsyncQueue::new(capacity),
            local_requests: AsyncQueue::new(capacity),
            correlation_matches: AsyncQueue::new(CORRELATION_MATCH_CAPACITY),
            bind_responses: AsyncQueue::new(capacity),
            unbind_responses: AsyncQueue::new(capacity),
            enquire_link_responses: AsyncQueue::new(capacity),
            message_responses: AsyncQueue::new(capacity),
            remote_message_requests: AsyncQueue::new(capacity),
            local_message_responses: Arc::new(AsyncQueue::new(capacity)),
            outbound: OnceLock::new(),
        }
    }

    async fn drive<R, W, H, B>(
        &self,
        reader: R,
        writer: W,
        bind: B,
        handler: Arc<H>,
    ) -> SessionReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        H: SessionHandler<Context = Ctx>,
        B: Future<Output = Result<BindTx, PeerError>>,
    {
        let base = async {
            tokio::join!(
                self.settle("conn_read", self.read_frames(reader)),
                self.settle("outgoing", self.write_frames(writer)),
                self.settle("incoming", self.dispatch_incoming()),
                self.settle("local_requests", self.correlate_local_requests()),
                self.settle(
                    "local_correlation_matches",
                    self.route_correlation_matches()
                ),
            )
        };

        let ((read, write, incoming, requests, matches), bound, ()) = tokio::join!(
            base,
            self.run_bound(bind, handler),
            self.teardown_on_abort()
        );

        let mut report = SessionReport::default();
        for (name, outcome) in [read, write, incoming, requests, matches]
            .into_iter()
            .chain(bound)
        {
            report.record(name, outcome);
        }
        report
    }

    /// Await the bind, then run the loops that only make sense while bound.
    async fn run_bound<H, B>(&self, bind: B, handler: Arc<H>) -> Vec<Outcome>
    where
        H: SessionHandler<Context = Ctx>,
        B: Future<Output = Result<BindTx, PeerError>>,
    {
        let bound = async {
            let bind = bind.await?;
            info!(
                role = ?self.role,
                mode = ?bind.mode,
                system_id = %bind.request.system_id,
                "session bound"
            );
            self.set_state(SessionState::Bound);
            handler.on_bound(&bind).await.map_err(PeerError::Handler)
        };

        let outbound = match bound.await {
            Ok(outbound) => self.outbound.get_or_init(|| outbound),
            Err(e) => {
                error!(role = ?self.role, error = %e, "bind failed");
                self.abort.cancel();
                return vec![("bind", Err(e))];
            }
        };
        // Teardown may already have run before the queue was known
        if self.abort.is_cancelled() {
            outbound.complete();
        }

        let (external, enquire, remote, local, handled, answered, delivered) = tokio::join!(
            self.settle("external_abort", self.watch_external_abort()),
            self.settle("local_enquire_links", self.send_enquire_links()),
            self.settle("remote_requests", self.dispatch_remote_requests()),
            self.settle("local_message_requests", self.send_local_messages(outbound)),
            self.settle("remote_message_requests", self.handle_remote_messages(&handler)),
            self.settle("local_message_responses", self.send_message_responses()),
            self.settle("remote_message_responses", self.deliver_message_responses(&*handler)),
        );

        vec![
            ("bind", Ok(())),
            external,
            enquire,
            remote,
            local,
            handled,
            answered,
            delivered,
        ]
    }

    /// Run one loop to completion, giving it `shutdown_grace` to finish once
    /// the session is aborted. A failing loop aborts the session.
    async fn settle<F>(&self, name: &'static str, work: F) -> Outcome
    where
        F: Future<Output = Result<(), PeerError>>,
    {
        let grace = self.config.shutdown_grace();
        let outcome = tokio::select! {
            outcome = work => outcome,
            _ = async {
                self.abort.cancelled().await;
                sleep(grace).await;
            } => Err(PeerError::ShutdownTimeout(grace)),
        };

        match &outcome {
            Ok(()) => debug!(task = name, "session loop finished"),
            Err(e) if e.is_cancellation() => debug!(task = name, error = %e, "session loop cancelled"),
            Err(e) => {
                error!(task = name, error = %e, "session loop failed");
                self.abort.cancel();
            }
        }
        (name, outcome)
    }

    async fn teardown_on_abort(&self) {
        self.abort.cancelled().await;
        debug!(role = ?self.role, "tearing down session");
        self.set_state(SessionState::Closed);

        self.incoming_raw.complete();
        self.outgoing.complete();
        self.remote_requests.complete();
        self.remote_responses.complete();
        self.local_requests.complete();
        self.correlation_matches.complete();
        self.bind_responses.complete();
        self.unbind_responses.complete();
        self.enquire_link_responses.complete();
        self.message_responses.complete();
        self.remote_message_requests.complete();
        self.local_message_responses.complete();
        if let Some(outbound) = self.outbound.get() {
            outbound.complete();
        }
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next || *current == SessionState::Closed {
                return false;
            }
            debug!(role = ?self.role, from = ?current, to = ?next, "session state changed");
            *current = next;
            true
        });
    }

    fn observe(&self, direction: Direction, pdu: &Pdu) {
        trace!(
            ?direction,
            command_id = ?pdu.command_id(),
            sequence_number = pdu.sequence_number(),
            command_status = %pdu.command_status(),
            "pdu"
        );
        if let Some(tap) = &self.tap {
            tap(direction, pdu);
        }
    }

    /// Stamp `pdu` with the next sequence number and queue it for the
    /// correlation window. Returns `None` once an unbind has been queued or
    /// received; nothing more may be sent after that.
    async fn enqueue_local_request(
        &self,
        pdu: Pdu,
        context: Option<Ctx>,
    ) -> Result<Option<u32>, QueueError> {
        let is_unbind = matches!(pdu, Pdu::Unbind(_));
        let request = {
            let mut sequence = lock(&self.sequence);
            if sequence.unbound {
                return Ok(None);
            }
            sequence.unbound = is_unbind;
            LocalRequest {
                pdu: pdu.with_sequence_number(sequence.next()),
                context,
            }
        };

        let sequence_number = request.pdu.sequence_number();
        let queued = self.local_requests.enqueue(request).await;
        if is_unbind {
            self.local_requests.complete();
        }
        queued.map(|()| Some(sequence_number))
    }

    fn local_message(&self, body: MessageRequest) -> Pdu {
        match self.role {
            Role::Esme => Pdu::SubmitSm(Box::new(body)),
            Role::Smsc => Pdu::DeliverSm(Box::new(body)),
        }
    }

    async fn initiate_bind(
        &self,
        mode: BindMode,
        mut request: BindRequest,
    ) -> Result<BindTx, PeerError> {
        const CONTEXT: &str = "a bind response from SMSC";
        self.set_state(SessionState::Binding);

        let exchange = async {
            let pdu = Pdu::bind_request(mode, request.clone());
            match self.enqueue_local_request(pdu, None).await? {
                Some(sequence_number) => request.sequence_number = sequence_number,
                None => return Err(PeerError::Missing(CONTEXT)),
            }

            let response = self
                .bind_responses
                .dequeue()
                .await
                .ok_or(PeerError::Missing(CONTEXT))?;
            let command_id = response.command_id();
            let body = match response {
                Pdu::BindTransmitterResp(body)
                | Pdu::BindReceiverResp(body)
                | Pdu::BindTransceiverResp(body)
                    if command_id == mode.response_id() =>
                {
                    body
                }
                _ => {
                    return Err(PeerError::UnexpectedCommand {
                        context: CONTEXT,
                        command_id,
                    })
                }
            };
            if !body.command_status.is_ok() {
                return Err(PeerError::UnexpectedStatus {
                    context: CONTEXT,
                    status: body.command_status,
                });
            }
            Ok(body)
        };

        let response = timeout(self.config.response_timeout, exchange)
            .await
            .map_err(|_| PeerError::Timeout("bind response"))??;

        Ok(BindTx {
            mode,
            request,
            response,
        })
    }

    async fn accept_bind<A, AF>(&self, authenticate: A) -> Result<BindTx, PeerError>
    where
        A: FnOnce(BindMode, BindRequest) -> AF,
        AF: Future<Output = BindResponse>,
    {
        const CONTEXT: &str = "a bind request from ESME";
        self.set_state(SessionState::Binding);

        let exchange = async {
            let pdu = self
                .remote_requests
                .dequeue()
                .await
                .ok_or(PeerError::Missing(CONTEXT))?;
            let command_id = pdu.command_id();
            let (mode, request) = match pdu {
                Pdu::BindTransmitter(body) => (BindMode::Transmitter, body),
                Pdu::BindReceiver(body) => (BindMode::Receiver, body),
                Pdu::BindTransceiver(body) => (BindMode::Transceiver, body),
                _ => {
                    return Err(PeerError::UnexpectedCommand {
                        context: CONTEXT,
                        command_id,
                    })
                }
            };

            let mut response = authenticate(mode, request.clone()).await;
            response.sequence_number = request.sequence_number;
            self.outgoing
                .enqueue(Pdu::bind_response(mode, response.clone()))
                .await?;

            if !response.command_status.is_ok() {
                warn!(
                    system_id = %request.system_id,
                    status = %response.command_status,
                    "rejected bind"
                );
                return Err(PeerError::AuthenticationFailed(response.command_status));
            }

            Ok(BindTx {
                mode,
                request,
                response,
            })
        };

        timeout(self.config.response_timeout, exchange)
            .await
            .map_err(|_| PeerError::Timeout("bind request"))?
    }

    async fn read_frames<R>(&self, stream: R) -> Result<(), PeerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = FrameReader::new(stream);
        let result: Result<(), PeerError> = loop {
            let next = tokio::select! {
                biased;
                _ = self.abort.cancelled() => break Ok(()),
                next = reader.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    if self.incoming_raw.enqueue(frame).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(None) => {
                    debug!(role = ?self.role, "peer closed the stream");
                    break Ok(());
                }
                Err(e) if self.incoming_raw.is_completed() => {
                    debug!(error = %e, "read failed after teardown");
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            }
        };

        self.incoming_raw.complete();
        result
    }

    async fn write_frames<W>(&self, stream: W) -> Result<(), PeerError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = FrameWriter::new(stream);
        let result = async {
            while let Some(pdu) = self.outgoing.dequeue().await {
                self.observe(Direction::Outgoing, &pdu);
                writer.write_pdu(&pdu).await?;
            }
            Ok::<(), PeerError>(())
        }
        .await;

        self.local_requests.complete();
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "failed to shut down the write half");
        }
        result
    }

    async fn dispatch_incoming(&self) -> Result<(), PeerError> {
        let result = async {
            while let Some(frame) = self.incoming_raw.dequeue().await {
                let pdu = match Pdu::decode(&frame) {
                    Ok(pdu) => pdu,
                    Err(e) => {
                        self.reject_frame(&frame, &e).await;
                        return Err(e.into());
                    }
                };
                self.observe(Direction::Incoming, &pdu);

                let routed = if pdu.is_response() {
                    self.remote_responses.enqueue(pdu).await
                } else {
                    self.remote_requests.enqueue(pdu).await
                };
                if routed.is_err() {
                    break;
                }
            }
            Ok::<(), PeerError>(())
        }
        .await;

        // Abort first so the window sees cancellation, not exhausted responses
        self.abort.cancel();
        self.remote_requests.complete();
        self.remote_responses.complete();
        result
    }

    /// Answer an undecodable request frame with a generic_nack carrying the
    /// matching error status. Undecodable responses are not answered.
    async fn reject_frame(&self, frame: &[u8], error: &CodecError) {
        let word = |at: usize| {
            frame
                .get(at..at + 4)
                .and_then(|b| <[u8; 4]>::try_from(b).ok())
                .map(u32::from_be_bytes)
        };
        let (Some(command_id), Some(sequence_number)) = (word(4), word(12)) else {
            return;
        };
        if command_id & 0x8000_0000 != 0 {
            return;
        }

        let status = error.to_command_status();
        warn!(command_id, sequence_number, %status, "rejecting undecodable request");
        let nack = Pdu::GenericNack(GenericNack::error(sequence_number, status));
        if self.outgoing.enqueue(nack).await.is_err() {
            debug!(sequence_number, "generic_nack dropped after teardown");
        }
    }

    async fn correlate_local_requests(&self) -> Result<(), PeerError> {
        let window = CorrelationWindow::new(WindowConfig {
            size: self.config.window_size,
            response_timeout: self.config.response_timeout,
        });

        let outgoing = &self.outgoing;
        let matches = &self.correlation_matches;
        let result = window
            .run(
                &self.local_requests,
                &self.remote_responses,
                |request: &LocalRequest<Ctx>| request.pdu.sequence_number(),
                |response: &Pdu| response.sequence_number(),
                move |request: &LocalRequest<Ctx>| outgoing.enqueue(request.pdu.clone()),
                move |matched: Correlated<Ctx>| matches.enqueue(matched),
                &self.abort,
            )
            .await;
        self.correlation_matches.complete();

        // A remote unbind is answered only once local traffic has quiesced
        let pending = lock(&self.pending_remote_unbind).take();
        let acknowledged = match pending {
            Some(unbind) if !self.outgoing.is_completed() => {
                info!(sequence_number = unbind.sequence_number, "acknowledging remote unbind");
                let sent = self
                    .outgoing
                    .enqueue(Pdu::UnbindResp(UnbindResponse::new(unbind.sequence_number)))
                    .await
                    .map_err(PeerError::from);
                // The unbind exchange is over; the writer still drains the response
                self.abort.cancel();
                sent
            }
            _ => Ok(()),
        };

        result?;
        acknowledged
    }

    async fn route_correlation_matches(&self) -> Result<(), PeerError> {
        let result = async {
            while let Some(matched) = self.correlation_matches.dequeue().await {
                self.route_match(matched).await?;
            }
            Ok::<(), PeerError>(())
        }
        .await;

        self.bind_responses.complete();
        self.unbind_responses.complete();
        self.enquire_link_responses.complete();
        self.message_responses.complete();
        result
    }

    // Routed by what the request was, never by the response
    async fn route_match(&self, matched: Correlated<Ctx>) -> Result<(), PeerError> {
        let CorrelationMatch {
            request, response, ..
        } = matched;
        let LocalRequest { pdu, context } = request;
        let request_id = pdu.command_id();
        let response_id = response.command_id();

        match pdu {
            Pdu::BindTransmitter(_) | Pdu::BindReceiver(_) | Pdu::BindTransceiver(_)
                if self.role == Role::Esme =>
            {
                self.bind_responses.enqueue(response).await?;
            }
            Pdu::Unbind(_) => self.unbind_responses.enqueue(response).await?,
            Pdu::EnquireLink(_) => self.enquire_link_responses.enqueue(response).await?,
            Pdu::SubmitSm(message) | Pdu::DeliverSm(message)
                if request_id == self.role.local_message_id() =>
            {
                let Some(context) = context else {
                    return Err(PeerError::UnknownCorrelation {
                        request: request_id,
                        response: response_id,
                    });
                };
                let response = message_response(request_id, response)?;
                self.message_responses
                    .enqueue((PduWithContext::new(*message, context), response))
                    .await?;
            }
            _ => {
                return Err(PeerError::UnknownCorrelation {
                    request: request_id,
                    response: response_id,
                })
            }
        }
        Ok(())
    }

    async fn watch_external_abort(&self) -> Result<(), PeerError> {
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Ok(()),
            _ = self.shutdown.cancelled() => {}
        }

        info!(role = ?self.role, "shutdown requested, unbinding");
        self.set_state(SessionState::Unbinding);
        let limit = self.config.response_timeout;
        let result = match timeout(limit, self.send_unbind()).await {
            Ok(result) => result,
            Err(_) => Err(PeerError::UnbindTimeout(limit)),
        };

        self.abort.cancel();
        result
    }

    async fn send_unbind(&self) -> Result<(), PeerError> {
        const CONTEXT: &str = "an unbind response";
        match self.enqueue_local_request(Pdu::Unbind(Unbind::new(0)), None).await {
            Ok(Some(sequence_number)) => debug!(sequence_number, "unbind sent"),
            Ok(None) | Err(QueueError::Completed) => {
                debug!("session is already unbinding");
                return Ok(());
            }
        }

        let Some(response) = self.unbind_responses.dequeue().await else {
            return Ok(());
        };
        match response {
            Pdu::UnbindResp(body) if body.command_status.is_ok() => {
                info!(role = ?self.role, "session unbound");
                Ok(())
            }
            Pdu::UnbindResp(body) => Err(PeerError::UnexpectedStatus {
                context: CONTEXT,
                status: body.command_status,
            }),
            other => Err(PeerError::UnexpectedCommand {
                context: CONTEXT,
                command_id: other.command_id(),
            }),
        }
    }

    async fn send_enquire_links(&self) -> Result<(), PeerError> {
        const CONTEXT: &str = "an enquire_link response";
        loop {
            tokio::select! {
                biased;
                _ = self.abort.cancelled() => return Ok(()),
                _ = sleep(self.config.enquire_link_interval) => {}
            }
            if self.local_requests.is_completed() {
                return Ok(());
            }

            match self
                .enqueue_local_request(Pdu::EnquireLink(EnquireLink::new(0)), None)
                .await
            {
                Ok(Some(sequence_number)) => trace!(sequence_number, "enquire_link sent"),
                Ok(None) | Err(QueueError::Completed) => return Ok(()),
            }

            let Some(response) = self.enquire_link_responses.dequeue().await else {
                return Ok(());
            };
            match response {
                Pdu::EnquireLinkResp(body) if body.command_status.is_ok() => {}
                Pdu::EnquireLinkResp(body) => {
                    return Err(PeerError::UnexpectedStatus {
                        context: CONTEXT,
                        status: body.command_status,
                    })
                }
                other => {
                    return Err(PeerError::UnexpectedCommand {
                        context: CONTEXT,
                        command_id: other.command_id(),
                    })
                }
            }
        }
    }

    async fn dispatch_remote_requests(&self) -> Result<(), PeerError> {
        let remote_message_id = self.role.remote_message_id();
        while let Some(pdu) = self.remote_requests.dequeue().await {
            let command_id = pdu.command_id();
            match pdu {
                Pdu::EnquireLink(body) => {
                    let response = EnquireLinkResponse::new(body.sequence_number);
                    self.outgoing.enqueue(Pdu::EnquireLinkResp(response)).await?;
                }
                Pdu::Unbind(body) => {
                    info!(
                        role = ?self.role,
                        sequence_number = body.sequence_number,
                        "peer requested unbind"
                    );
                    self.set_state(SessionState::Unbinding);
                    lock(&self.sequence).unbound = true;
                    *lock(&self.pending_remote_unbind) = Some(body);
                    self.local_requests.complete();
                    self.remote_message_requests.complete();
                }
                Pdu::SubmitSm(message) | Pdu::DeliverSm(message)
                    if command_id == remote_message_id =>
                {
                    let sequence_number = message.sequence_number;
                    if self.remote_message_requests.enqueue(*message).await.is_err() {
                        warn!(
                            ?command_id,
                            sequence_number, "dropping message request received after unbind"
                        );
                    }
                }
                _ => return Err(PeerError::UnhandledRequest(command_id)),
            }
        }
        Ok(())
    }

    async fn send_local_messages(
        &self,
        outbound: &AsyncQueue<PduWithContext<MessageRequest, Ctx>>,
    ) -> Result<(), PeerError> {
        while let Some(PduWithContext { pdu, context }) = outbound.dequeue().await {
            if self.local_requests.is_completed() {
                debug!("local sending closed, dropping queued message");
                break;
            }
            match self
                .enqueue_local_request(self.local_message(pdu), Some(context))
                .await
            {
                Ok(Some(sequence_number)) => trace!(sequence_number, "message request queued"),
                Ok(None) | Err(QueueError::Completed) => break,
            }
        }
        Ok(())
    }

    async fn handle_remote_messages<H>(&self, handler: &Arc<H>) -> Result<(), PeerError>
    where
        H: SessionHandler<Context = Ctx>,
    {
        let mut handlers = JoinSet::new();
        let result = match self.spawn_message_handlers(handler, &mut handlers).await {
            Ok(()) => tokio::select! {
                biased;
                _ = self.abort.cancelled() => Ok(()),
                drained = drain_handlers(&mut handlers) => drained,
            },
            Err(e) => Err(e),
        };

        handlers.abort_all();
        self.local_message_responses.complete();
        result
    }

    async fn spawn_message_handlers<H>(
        &self,
        handler: &Arc<H>,
        handlers: &mut JoinSet<()>,
    ) -> Result<(), PeerError>
    where
        H: SessionHandler<Context = Ctx>,
    {
        let limit = Arc::new(Semaphore::new(self.config.window_size));
        loop {
            let permit = tokio::select! {
                biased;
                _ = self.abort.cancelled() => return Ok(()),
                permit = limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Ok(()),
                },
            };
            let next = tokio::select! {
                biased;
                _ = self.abort.cancelled() => return Ok(()),
                next = self.remote_message_requests.dequeue() => next,
            };
            let Some(request) = next else {
                return Ok(());
            };

            while let Some(joined) = handlers.try_join_next() {
                handler_outcome(joined)?;
            }
            handlers.spawn(answer_message(
                handler.clone(),
                self.role,
                request,
                self.local_message_responses.clone(),
                permit,
            ));
        }
    }

    async fn send_message_responses(&self) -> Result<(), PeerError> {
        while let Some(response) = self.local_message_responses.dequeue().await {
            self.outgoing.enqueue(response).await?;
        }
        Ok(())
    }

    async fn deliver_message_responses<H>(&self, handler: &H) -> Result<(), PeerError>
    where
        H: SessionHandler<Context = Ctx>,
    {
        while let Some((request, response)) = self.message_responses.dequeue().await {
            handler.on_message_response(request, response).await;
        }
        Ok(())
    }
}

/// The answer to a local message request. A generic_nack becomes a response
/// carrying the nack's status.
fn message_response(request_id: CommandId, response: Pdu) -> Result<MessageResponse, PeerError> {
    let command_id = response.command_id();
    match response {
        Pdu::SubmitSmResp(body) | Pdu::DeliverSmResp(body)
            if request_id.response_id() == Some(command_id) =>
        {
            Ok(body)
        }
        Pdu::GenericNack(nack) => Ok(MessageResponse::error(
            nack.sequence_number,
            nack.command_status,
        )),
        _ => Err(PeerError::UnexpectedCommand {
            context: "a message response",
            command_id,
        }),
    }
}

async fn answer_message<H>(
    handler: Arc<H>,
    role: Role,
    request: MessageRequest,
    responses: Arc<AsyncQueue<Pdu>>,
    _permit: OwnedSemaphorePermit,
) where
    H: SessionHandler,
{
    let sequence_number = request.sequence_number;
    let mut response = handler.on_message_request(request).await;
    response.sequence_number = sequence_number;

    let pdu = match role {
        Role::Esme => Pdu::DeliverSmResp(response),
        Role::Smsc => Pdu::SubmitSmResp(response),
    };
    if responses.enqueue(pdu).await.is_err() {
        debug!(sequence_number, "session closed before the message response was sent");
    }
}

async fn drain_handlers(handlers: &mut JoinSet<()>) -> Result<(), PeerError> {
    while let Some(joined) = handlers.join_next().await {
        handler_outcome(joined)?;
    }
    Ok(())
}

fn handler_outcome(joined: Result<(), JoinError>) -> Result<(), PeerError> {
    match joined {
        Err(e) if e.is_panic() => Err(PeerError::HandlerPanicked(e.to_string())),
        _ => Ok(()),
    }
}

//! Request/response correlation window
//!
//! Drives a stream of outgoing requests and a stream of incoming responses,
//! admitting at most `size` requests without a response and failing the whole
//! window when any request waits longer than `response_timeout`.
//!
//! Admission goes through a FIFO semaphore. A permit is taken before a request
//! is registered and handed back when its response is matched or its deadline
//! passes. The in-flight table is only touched from inside [`CorrelationWindow::run`].

use crate::queue::{AsyncQueue, QueueError};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum number of requests awaiting a response
    pub size: usize,
    /// How long a single request may wait for its response
    pub response_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum WindowError<Id: Debug> {
    #[error("Timed out after {}ms waiting for a response for the prior request with id: {id:?}", .timeout.as_millis())]
    Timeout { id: Id, timeout: Duration },

    #[error("Received a response with an unrecognized id={0:?}")]
    UnrecognizedId(Id),

    #[error("A request with id={0:?} is already in flight")]
    DuplicateId(Id),

    #[error("Responses completed but there are still {remaining} requests in flight")]
    ResponsesExhausted { remaining: usize },

    #[error("operation was aborted")]
    Aborted,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A request paired with the response that answered it.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatch<Req, Res, Id> {
    pub id: Id,
    pub request: Req,
    pub response: Res,
}

#[derive(Debug)]
struct Inflight<Req> {
    request: Req,
    deadline: Instant,
}

#[derive(Debug)]
pub struct CorrelationWindow<Req, Id> {
    config: WindowConfig,
    permits: Semaphore,
    inflight: Mutex<HashMap<Id, Inflight<Req>>>,
    // Signalled whenever the in-flight table changes or requests are done
    changed: Notify,
    requests_done: AtomicBool,
}

impl<Req, Id> CorrelationWindow<Req, Id>
where
    Id: Eq + Hash + Clone + Debug,
{
    /// Create a window. A window is single-use: `run` closes it on exit.
    pub fn new(config: WindowConfig) -> Self {
        CorrelationWindow {
            config,
            permits: Semaphore::new(config.size.max(1)),
            inflight: Mutex::new(HashMap::new()),
            changed: Notify::new(),
            requests_done: AtomicBool::new(false),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Id, Inflight<Req>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests currently awaiting a response
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }

    /// Run the window to completion.
    ///
    /// Resolves `Ok` once the request source has completed and every admitted
    /// request has been matched, or once the response source ends with nothing
    /// in flight. Any timeout, unknown response id or cancellation ends the run
    /// with an error and clears the in-flight table.
    #[allow(clippy::too_many_arguments)]
    pub async fn run<Res, RI, SI, S, SF, M, MF>(
        &self,
        requests: &AsyncQueue<Req>,
        responses: &AsyncQueue<Res>,
        request_id: RI,
        response_id: SI,
        send_request: S,
        on_match: M,
        cancel: &CancellationToken,
    ) -> Result<(), WindowError<Id>>
    where
        RI: Fn(&Req) -> Id,
        SI: Fn(&Res) -> Id,
        S: FnMut(&Req) -> SF,
        SF: Future<Output = Result<(), QueueError>>,
        M: FnMut(CorrelationMatch<Req, Res, Id>) -> MF,
        MF: Future<Output = Result<(), QueueError>>,
    {
        let work = async {
            tokio::try_join!(
                self.process_requests(requests, request_id, send_request),
                self.process_responses(responses, response_id, on_match),
            )
            .map(|_| ())
        };

        // Cancellation wins over a result that became ready at the same time
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WindowError::Aborted),
            timed_out = self.expire() => Err(timed_out),
            result = work => result,
        };

        let abandoned = {
            let mut table = self.table();
            let abandoned = table.len();
            table.clear();
            abandoned
        };
        self.permits.close();
        if abandoned > 0 {
            trace!(abandoned, "correlation window closed with requests in flight");
        }

        result
    }

    async fn process_requests<RI, S, SF>(
        &self,
        requests: &AsyncQueue<Req>,
        request_id: RI,
        mut send_request: S,
    ) -> Result<(), WindowError<Id>>
    where
        RI: Fn(&Req) -> Id,
        S: FnMut(&Req) -> SF,
        SF: Future<Output = Result<(), QueueError>>,
    {
        while let Some(request) = requests.dequeue().await {
            // FIFO admission: tokio's semaphore queues waiters in order
            let permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| WindowError::Aborted)?;
            permit.forget();

            let id = request_id(&request);
            // Futures are lazy: nothing is sent until the request is registered
            let send = send_request(&request);
            {
                let mut table = self.table();
                if table.contains_key(&id) {
                    return Err(WindowError::DuplicateId(id));
                }
                table.insert(
                    id.clone(),
                    Inflight {
                        request,
                        deadline: Instant::now() + self.config.response_timeout,
                    },
                );
            }
            self.changed.notify_waiters();
            trace!(?id, "request admitted to window");

            send.await?;
        }

        self.requests_done.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn process_responses<Res, SI, M, MF>(
        &self,
        responses: &AsyncQueue<Res>,
        response_id: SI,
        mut on_match: M,
    ) -> Result<(), WindowError<Id>>
    where
        SI: Fn(&Res) -> Id,
        M: FnMut(CorrelationMatch<Req, Res, Id>) -> MF,
        MF: Future<Output = Result<(), QueueError>>,
    {
        loop {
            let next = tokio::select! {
                biased;
                response = responses.dequeue() => response,
                _ = self.quiesced() => return Ok(()),
            };

            let Some(response) = next else {
                let remaining = self.in_flight();
                if remaining > 0 {
                    return Err(WindowError::ResponsesExhausted { remaining });
                }
                return Ok(());
            };

            let id = response_id(&response);
            let Some(inflight) = self.table().remove(&id) else {
                return Err(WindowError::UnrecognizedId(id));
            };
            self.permits.add_permits(1);
            self.changed.notify_waiters();
            trace!(?id, "response matched");

            on_match(CorrelationMatch {
                id,
                request: inflight.request,
                response,
            })
            .await?;
        }
    }

    /// Resolves once the request source is exhausted and nothing is in flight.
    async fn quiesced(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.requests_done.load(Ordering::SeqCst) && self.table().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves with a timeout error for the first request whose deadline passes.
    async fn expire(&self) -> WindowError<Id> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let earliest = self
                .table()
                .iter()
                .min_by_key(|(_, inflight)| inflight.deadline)
                .map(|(id, inflight)| (id.clone(), inflight.deadline));

            let Some((id, deadline)) = earliest else {
                notified.await;
                continue;
            };

            tokio::select! {
                _ = sleep_until(deadline) => {
                    let expired = {
                        let mut table = self.table();
                        match table.get(&id) {
                            Some(inflight) if inflight.deadline <= Instant::now() => {
                                table.remove(&id).is_some()
                            }
                            _ => false,
                        }
                    };
                    if expired {
                        self.permits.add_permits(1);
                        warn!(?id, timeout = ?self.config.response_timeout, "request timed out");
                        return WindowError::Timeout {
                            id,
                            timeout: self.config.response_timeout,
                        };
                    }
                }
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Req(u32);
    #[derive(Debug, Clone, PartialEq)]
    struct Res(u32);

    async fn accept<T>(_item: T) -> Result<(), QueueError> {
        Ok(())
    }

    fn sent(_req: &Req) -> std::future::Ready<Result<(), QueueError>> {
        std::future::ready(Ok(()))
    }

    fn config(size: usize, timeout_ms: u64) -> WindowConfig {
        WindowConfig {
            size,
            response_timeout: Duration::from_millis(timeout_ms),
        }
    }

    // Echo peer: every sent request is answered through `responses`
    #[tokio::test]
    async fn matches_every_request_in_response_order() {
        let window = CorrelationWindow::new(config(2, 1000));
        let requests = AsyncQueue::new(8);
        let responses = AsyncQueue::new(8);
        let matches = Mutex::new(Vec::new());
        let token = CancellationToken::new();

        for i in 1..=5 {
            requests.enqueue(Req(i)).await.unwrap();
        }
        requests.complete();

        let responses_ref = &responses;
        let matches_ref = &matches;
        window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                move |req: &Req| responses_ref.enqueue(Res(req.0)),
                move |m: CorrelationMatch<Req, Res, u32>| {
                    matches_ref.lock().unwrap().push(m.id);
                    accept(())
                },
                &token,
            )
            .await
            .unwrap();

        assert_eq!(*matches.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(window.in_flight(), 0);
    }

    #[tokio::test]
    async fn never_more_than_window_size_outstanding() {
        let window = CorrelationWindow::new(config(3, 5000));
        let requests = AsyncQueue::new(16);
        let sent = Arc::new(AsyncQueue::new(16));
        let responses = Arc::new(AsyncQueue::new(16));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let max_outstanding = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        for i in 1..=10 {
            requests.enqueue(Req(i)).await.unwrap();
        }
        requests.complete();

        // Slow responder: answers one sent request at a time
        let responder = {
            let sent = sent.clone();
            let responses = responses.clone();
            let outstanding = outstanding.clone();
            tokio::spawn(async move {
                while let Some(Req(id)) = sent.dequeue().await {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    responses.enqueue(Res(id)).await.unwrap();
                }
            })
        };

        let sent_ref = &sent;
        let outstanding_ref = &outstanding;
        let max_ref = &max_outstanding;
        window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                move |req: &Req| {
                    let now = outstanding_ref.fetch_add(1, Ordering::SeqCst) + 1;
                    max_ref.fetch_max(now, Ordering::SeqCst);
                    sent_ref.enqueue(req.clone())
                },
                accept,
                &token,
            )
            .await
            .unwrap();
        sent.complete();
        responder.await.unwrap();

        assert!(max_outstanding.load(Ordering::SeqCst) <= 3);
        assert!(max_outstanding.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn unanswered_request_times_out_naming_its_id() {
        let window = CorrelationWindow::new(config(4, 30));
        let requests = AsyncQueue::new(4);
        let responses: AsyncQueue<Res> = AsyncQueue::new(4);
        let token = CancellationToken::new();

        requests.enqueue(Req(7)).await.unwrap();

        let result = window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                sent,
                accept,
                &token,
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WindowError::Timeout { id: 7, .. }));
        assert_eq!(
            err.to_string(),
            "Timed out after 30ms waiting for a response for the prior request with id: 7"
        );
        assert_eq!(window.in_flight(), 0);
    }

    #[tokio::test]
    async fn unknown_response_id_is_fatal() {
        let window = CorrelationWindow::new(config(4, 1000));
        let requests: AsyncQueue<Req> = AsyncQueue::new(4);
        let responses = AsyncQueue::new(4);
        let token = CancellationToken::new();

        responses.enqueue(Res(99)).await.unwrap();

        let result = window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                sent,
                accept,
                &token,
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WindowError::UnrecognizedId(99)));
        assert!(err.to_string().contains("unrecognized id=99"));
    }

    #[tokio::test]
    async fn responses_ending_with_requests_in_flight() {
        let window = CorrelationWindow::new(config(4, 1000));
        let requests = AsyncQueue::new(4);
        let responses: AsyncQueue<Res> = AsyncQueue::new(4);
        let token = CancellationToken::new();

        requests.enqueue(Req(1)).await.unwrap();
        requests.enqueue(Req(2)).await.unwrap();

        let responses_ref = &responses;
        let result = window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                move |req: &Req| {
                    if req.0 == 2 {
                        responses_ref.complete();
                    }
                    accept(())
                },
                accept,
                &token,
            )
            .await;

        assert!(matches!(
            result,
            Err(WindowError::ResponsesExhausted { remaining: 2 })
        ));
    }

    #[tokio::test]
    async fn duplicate_in_flight_id_is_rejected() {
        let window = CorrelationWindow::new(config(4, 1000));
        let requests = AsyncQueue::new(4);
        let responses: AsyncQueue<Res> = AsyncQueue::new(4);
        let token = CancellationToken::new();

        requests.enqueue(Req(5)).await.unwrap();
        requests.enqueue(Req(5)).await.unwrap();

        let result = window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                sent,
                accept,
                &token,
            )
            .await;

        assert!(matches!(result, Err(WindowError::DuplicateId(5))));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_window() {
        let window = CorrelationWindow::new(config(4, 5000));
        let requests: AsyncQueue<Req> = AsyncQueue::new(4);
        let responses: AsyncQueue<Res> = AsyncQueue::new(4);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                token.cancel();
            })
        };

        let result = window
            .run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                sent,
                accept,
                &token,
            )
            .await;
        canceller.await.unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, WindowError::Aborted));
        assert_eq!(err.to_string(), "operation was aborted");
    }

    #[tokio::test]
    async fn completes_once_requests_are_done_and_answered() {
        let window = CorrelationWindow::new(config(1, 1000));
        let requests = AsyncQueue::new(1);
        let responses = AsyncQueue::new(1);
        let token = CancellationToken::new();

        requests.enqueue(Req(1)).await.unwrap();
        requests.complete();

        // The response source is never completed; the window still finishes
        let responses_ref = &responses;
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            window.run(
                &requests,
                &responses,
                |r: &Req| r.0,
                |r: &Res| r.0,
                move |req: &Req| responses_ref.enqueue(Res(req.0)),
                accept,
                &token,
            ),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}

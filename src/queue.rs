// ABOUTME: Capacity-limited async FIFO with an explicit completion signal
// ABOUTME: Every hand-off between session loops goes through one of these

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is completed")]
    Completed,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    completed: bool,
}

/// Bounded FIFO queue.
///
/// `enqueue` suspends while the queue is full, `dequeue` suspends while it is
/// empty. After `complete()` producers fail immediately and consumers drain
/// whatever is still buffered before observing the end of the queue.
#[derive(Debug)]
pub struct AsyncQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> AsyncQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        AsyncQueue {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                completed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // The lock is never held across an await or user code
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`, waiting for room if the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        loop {
            // Register interest before checking so a wake-up between the
            // check and the await is not lost
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.completed {
                    return Err(QueueError::Completed);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Take the oldest item, waiting while the queue is empty. Returns `None`
    /// once the queue is completed and drained.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    let more = !state.items.is_empty();
                    drop(state);
                    self.not_full.notify_one();
                    if more {
                        // Pass the baton in case several consumers are parked
                        self.not_empty.notify_one();
                    }
                    return Some(item);
                }
                if state.completed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Iterate over items as they arrive, ending after completion.
    pub fn items(&self) -> Items<'_, T> {
        Items { queue: self }
    }

    /// Mark the queue completed. Idempotent. Parked producers fail, parked
    /// consumers drain then end.
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            if state.completed {
                return;
            }
            state.completed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Async iterator returned by [`AsyncQueue::items`].
#[derive(Debug)]
pub struct Items<'a, T> {
    queue: &'a AsyncQueue<T>,
}

impl<T> Items<'_, T> {
    pub async fn next(&mut self) -> Option<T> {
        self.queue.dequeue().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn items_come_out_in_fifo_order() {
        let queue = AsyncQueue::new(4);
        for i in 0..4 {
            queue.enqueue(i).await.unwrap();
        }
        queue.complete();

        let mut items = queue.items();
        let mut seen = Vec::new();
        while let Some(i) = items.next().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn enqueue_blocks_when_full_until_a_slot_frees() {
        let queue = Arc::new(AsyncQueue::new(1));
        queue.enqueue(1).await.unwrap();

        let blocked = timeout(Duration::from_millis(50), queue.enqueue(2)).await;
        assert!(blocked.is_err(), "enqueue should wait while full");

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(3).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(queue.dequeue().await, Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn enqueue_after_complete_fails() {
        let queue = AsyncQueue::new(2);
        queue.complete();
        assert_eq!(queue.enqueue(1).await, Err(QueueError::Completed));
        assert_eq!(
            QueueError::Completed.to_string(),
            "queue is completed"
        );
    }

    #[tokio::test]
    async fn complete_drains_buffer_then_ends() {
        let queue = AsyncQueue::new(3);
        queue.enqueue("a").await.unwrap();
        queue.enqueue("b").await.unwrap();
        queue.complete();
        queue.complete();

        assert_eq!(queue.dequeue().await, Some("a"));
        assert_eq!(queue.dequeue().await, Some("b"));
        assert_eq!(queue.dequeue().await, None);
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn complete_wakes_parked_consumers() {
        let queue: Arc<AsyncQueue<u32>> = Arc::new(AsyncQueue::new(1));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.complete();
        for consumer in consumers {
            let result = timeout(Duration::from_secs(1), consumer).await;
            assert_eq!(result.unwrap().unwrap(), None);
        }
    }

    #[tokio::test]
    async fn complete_fails_parked_producers() {
        let queue = Arc::new(AsyncQueue::new(1));
        queue.enqueue(0).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.complete();
        let result = timeout(Duration::from_secs(1), producer).await;
        assert_eq!(result.unwrap().unwrap(), Err(QueueError::Completed));
        assert_eq!(queue.dequeue().await, Some(0));
    }

    #[tokio::test]
    async fn consumer_parked_before_producer_receives_item() {
        let queue = Arc::new(AsyncQueue::new(1));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.enqueue(42).await.unwrap();
        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue: AsyncQueue<()> = AsyncQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.is_empty());
    }
}

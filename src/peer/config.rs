// ABOUTME: Tunables for a peer session: window size, timeouts, keep-alive interval and queue sizing
// ABOUTME: Builder-style configuration with defaults suited to a typical SMSC link

use std::time::Duration;
use thiserror::Error;

/// Extra time loops get to settle after an abort, on top of `response_timeout`
const DEFAULT_GRACE_MARGIN: Duration = Duration::from_secs(2);

/// Configuration for an SMPP peer session
///
/// # Example
///
/// ```rust
/// use smpp_peer::peer::PeerConfig;
/// use std::time::Duration;
///
/// // 10 in flight, 5s response timeout, enquire_link every 30s
/// let config = PeerConfig::default();
///
/// let config = PeerConfig::new()
///     .with_window_size(32)
///     .with_response_timeout(Duration::from_secs(2))
///     .with_enquire_link_interval(Duration::from_secs(60));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Maximum number of local requests awaiting a response (default: 10)
    ///
    /// Also bounds how many remote message requests are handed to the
    /// handler at the same time.
    pub window_size: usize,

    /// How long any request may wait for its response (default: 5 seconds)
    ///
    /// Bounds the bind and unbind exchanges as well.
    pub response_timeout: Duration,

    /// Idle time between enquire_link PDUs (default: 30 seconds)
    pub enquire_link_interval: Duration,

    /// Capacity of the queues between session loops (default: 64)
    pub queue_capacity: usize,

    /// How long loops may take to finish once the session is torn down.
    /// Defaults to `response_timeout` plus two seconds.
    pub shutdown_grace: Option<Duration>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window_size must be at least 1")]
    ZeroWindow,

    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            response_timeout: Duration::from_secs(5),
            enquire_link_interval: Duration::from_secs(30),
            queue_capacity: 64,
            shutdown_grace: None,
        }
    }
}

impl PeerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_enquire_link_interval(mut self, interval: Duration) -> Self {
        self.enquire_link_interval = interval;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Effective grace period after an internal abort
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
            .unwrap_or(self.response_timeout + DEFAULT_GRACE_MARGIN)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("response_timeout"));
        }
        if self.enquire_link_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("enquire_link_interval"));
        }
        Ok(())
    }
}

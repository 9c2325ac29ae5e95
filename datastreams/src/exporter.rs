// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Delivery of payloads to the collector.

use std::{fmt, io, thread, time::Duration};

use crate::{counters::ProcessorCounters, payload::StatsPayload, rate_limit::rate_limited};

/// Sends encoded payloads to the collector.
///
/// Implementations own the protocol (HTTP, a local socket, ...). A returned error makes the
/// [`Exporter`] retry according to its [`RetryPolicy`].
pub trait Transport: Send + 'static {
    /// Deliver one payload.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

impl Transport for Box<dyn Transport> {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        (**self).send(payload)
    }
}

/// A [`Transport`] backed by a closure. See [`from_fn`].
pub struct FnTransport<F>(F);

impl<F> Transport for FnTransport<F>
where
    F: FnMut(&[u8]) -> Result<(), TransportError> + Send + 'static,
{
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        (self.0)(payload)
    }
}

/// Create a [`Transport`] from a closure.
///
/// ```
/// use datastreams::exporter::{Transport, TransportError, from_fn};
///
/// let mut transport = from_fn(|payload: &[u8]| {
///     if payload.is_empty() {
///         return Err(TransportError::Other("empty payload".into()));
///     }
///     Ok(())
/// });
/// assert!(transport.send(b"{}").is_ok());
/// ```
pub fn from_fn<F>(f: F) -> FnTransport<F>
where
    F: FnMut(&[u8]) -> Result<(), TransportError> + Send + 'static,
{
    FnTransport(f)
}

/// Failure reported by a [`Transport`].
#[derive(Debug)]
pub enum TransportError {
    /// The connection failed.
    Io(io::Error),
    /// The collector answered with a non-success status code.
    Status(u16),
    /// Any other failure.
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => fmt::Display::fmt(err, f),
            Self::Status(status) => write!(f, "collector returned status {status}"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Why a payload was discarded.
#[derive(Debug)]
pub enum ExportError {
    /// The payload couldn't be serialized.
    Encode(serde_json::Error),
    /// Every attempt failed.
    Transport {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: TransportError,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "couldn't encode payload: {err}"),
            Self::Transport { attempts, last } => {
                write!(f, "payload not sent after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Transport { last, .. } => Some(last),
        }
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// How often and how patiently a payload is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Try at most `max_attempts` times, waiting `backoff * n` after the `n`-th failure.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        assert!(max_attempts > 0, "max_attempts must be at least 1");
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Never retry.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Maximum number of attempts per payload, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Encodes payloads and hands them to a [`Transport`] with bounded retries.
///
/// A payload that still fails after [`RetryPolicy::max_attempts`] is dropped; nothing is ever
/// requeued, so a long collector outage costs data but not memory.
pub struct Exporter<T = Box<dyn Transport>> {
    transport: T,
    retry: RetryPolicy,
}

impl Exporter {
    /// Create an exporter with the default [`RetryPolicy`].
    ///
    /// The transport is boxed. A transport that is already a `Box<dyn Transport>` should go
    /// through `Exporter::from` instead to avoid boxing it twice.
    pub fn new(transport: impl Transport) -> Self {
        Self::from(Box::new(transport) as Box<dyn Transport>)
    }
}

impl From<Box<dyn Transport>> for Exporter {
    fn from(transport: Box<dyn Transport>) -> Self {
        Self::with_retry(transport, RetryPolicy::default())
    }
}

impl<T: Transport> Exporter<T> {
    /// Create an exporter with a custom retry policy.
    pub fn with_retry(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Replace the retry policy.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Encode `payload` and send it, retrying on failure.
    ///
    /// Returns the number of attempts it took.
    pub fn export(&mut self, payload: &StatsPayload) -> Result<u32, ExportError> {
        let bytes = payload.to_json()?;
        self.send_with_retry(&bytes, None)
    }

    pub(crate) fn export_counted(
        &mut self,
        payload: &StatsPayload,
        counters: &ProcessorCounters,
    ) -> Result<u32, ExportError> {
        let result = payload
            .to_json()
            .map_err(ExportError::from)
            .and_then(|bytes| self.send_with_retry(&bytes, Some(counters)));
        match &result {
            Ok(_) => counters.payloads_sent.incr(),
            Err(_) => counters.payloads_dropped.incr(),
        }
        result
    }

    fn send_with_retry(
        &mut self,
        bytes: &[u8],
        counters: Option<&ProcessorCounters>,
    ) -> Result<u32, ExportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(bytes) {
                Ok(()) => return Ok(attempt),
                Err(err) => {
                    if let Some(counters) = counters {
                        counters.send_failures.incr();
                    }
                    if attempt >= self.retry.max_attempts {
                        return Err(ExportError::Transport {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    rate_limited!(
                        Duration::from_secs(60),
                        tracing::warn!(%err, attempt, "couldn't send data streams payload, retrying")
                    );
                    thread::sleep(self.retry.delay_after(attempt));
                }
            }
        }
    }
}

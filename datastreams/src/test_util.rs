// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for testing code that records data streams statistics.
//!
//! This requires that the `test-util` feature be enabled.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    exporter::{Transport, TransportError},
    payload::StatsPayload,
};

/// A [`Transport`] that records every payload it accepts.
///
/// Clones share their state, so keep one clone to inspect what the export thread sent.
///
/// ```
/// use datastreams::{Exporter, Processor, StatsPoint, test_util::TestTransport};
///
/// let transport = TestTransport::new();
/// let processor = Processor::builder().build();
/// processor.add(StatsPoint { timestamp_nanos: 1, ..Default::default() });
///
/// let mut exporter = Exporter::new(transport.clone());
/// exporter.export(&processor.flush(i64::MAX)).unwrap();
/// assert_eq!(transport.payloads()[0].stats.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestTransport {
    state: Arc<Mutex<TestTransportState>>,
}

#[derive(Debug, Default)]
struct TestTransportState {
    sent: Vec<Vec<u8>>,
    attempts: usize,
    fail_next: usize,
    fail_always: bool,
}

impl TestTransport {
    /// A transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects everything.
    pub fn failing() -> Self {
        let transport = Self::new();
        transport.set_fail_always(true);
        transport
    }

    /// Reject the next `n` send attempts.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Reject every send attempt until turned off.
    pub fn set_fail_always(&self, fail: bool) {
        self.lock().fail_always = fail;
    }

    /// Number of calls to [`Transport::send`], successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Raw bytes of every accepted payload, in order.
    pub fn raw_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Every accepted payload, decoded.
    ///
    /// # Panics
    ///
    /// If a payload isn't valid JSON.
    pub fn payloads(&self) -> Vec<StatsPayload> {
        self.lock()
            .sent
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).expect("payload is valid JSON"))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TestTransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for TestTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.fail_always {
            return Err(TransportError::Status(503));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransportError::Status(503));
        }
        state.sent.push(payload.to_vec());
        Ok(())
    }
}

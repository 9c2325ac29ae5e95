// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Background thread that periodically flushes a [`Processor`] and exports the result.

use std::{
    io,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    thread,
    time::Duration,
};

use datastreams_sketch::QuantileSketch;
use tokio::sync::oneshot;

use crate::{
    exporter::{Exporter, Transport},
    processor::Processor,
    rate_limit::rate_limited,
};

enum Message {
    Flush(oneshot::Sender<()>),
    Stop,
}

/// Handle to a running export thread, returned by [`Processor::start`].
///
/// Dropping the handle stops the thread: it flushes every open window, makes one best-effort
/// export, and exits. The drop blocks until that is done.
pub struct ExportHandle {
    sender: Sender<Message>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ExportHandle {
    pub(crate) fn spawn<S: QuantileSketch, T: Transport>(
        processor: Processor<S>,
        exporter: Exporter<T>,
    ) -> io::Result<Self> {
        let (sender, receiver) = channel();
        let worker = Worker {
            flush_interval: processor.flush_interval(),
            processor,
            exporter,
        };
        let handle = thread::Builder::new()
            .name(worker.processor.thread_name().to_owned())
            .spawn(move || worker.run(receiver))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Run one export tick now and wait for it to complete.
    ///
    /// The tick flushes at the processor clock's current time, exactly like a periodic one.
    /// Returns immediately if the thread has already stopped.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Message::Flush(tx)).is_ok() {
            // the thread might exit without answering; that's not an error here
            let _ = rx.await;
        }
    }

    /// Stop the thread after a final flush. Alias for `drop(handle)`.
    pub fn stop(self) {}
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.sender.send(Message::Stop).ok();
            tracing::info!("awaiting data streams export shutdown");
            if handle.join().is_err() {
                tracing::error!("data streams export thread panicked");
            } else {
                tracing::info!("data streams export shut down");
            }
        }
    }
}

struct Worker<S: QuantileSketch, T> {
    processor: Processor<S>,
    exporter: Exporter<T>,
    flush_interval: Duration,
}

impl<S: QuantileSketch, T: Transport> Worker<S, T> {
    fn run(mut self, receiver: Receiver<Message>) {
        let span = tracing::span!(
            tracing::Level::TRACE,
            "data streams export",
            thread = self.processor.thread_name()
        );
        let _enter = span.enter();

        loop {
            match receiver.recv_timeout(self.flush_interval) {
                Ok(Message::Flush(done)) => {
                    self.tick(self.processor.now_nanos());
                    done.send(()).ok();
                }
                Err(RecvTimeoutError::Timeout) => self.tick(self.processor.now_nanos()),
                Ok(Message::Stop) => {
                    tracing::info!("caught shutdown signal, flushing open data streams windows");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // closes every window, however recent
        self.tick(i64::MAX);
    }

    fn tick(&mut self, now_nanos: i64) {
        if !self.processor.refresh_export_enabled() {
            let discarded = self.processor.discard(now_nanos);
            if discarded > 0 {
                tracing::debug!(discarded, "data streams export disabled, discarding windows");
            }
            return;
        }

        let payload = self.processor.flush(now_nanos);
        if payload.is_empty() {
            return;
        }
        tracing::debug!(buckets = payload.stats.len(), "exporting data streams payload");
        if let Err(err) = self
            .exporter
            .export_counted(&payload, self.processor.counters_ref())
        {
            rate_limited!(
                Duration::from_secs(60),
                tracing::error!(%err, "dropping data streams payload")
            );
        }
    }
}

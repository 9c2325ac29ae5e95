// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Health counters of a [`Processor`](crate::Processor).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct ProcessorCounters {
    pub(crate) points_ingested: Counter,
    pub(crate) offsets_ingested: Counter,
    pub(crate) late_drops: Counter,
    pub(crate) disabled_drops: Counter,
    pub(crate) buckets_flushed: Counter,
    pub(crate) payloads_sent: Counter,
    pub(crate) payloads_dropped: Counter,
    pub(crate) send_failures: Counter,
}

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn incr(&self) {
        self.add(1);
    }

    pub(crate) fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl ProcessorCounters {
    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            points_ingested: self.points_ingested.get(),
            offsets_ingested: self.offsets_ingested.get(),
            late_drops: self.late_drops.get(),
            disabled_drops: self.disabled_drops.get(),
            buckets_flushed: self.buckets_flushed.get(),
            payloads_sent: self.payloads_sent.get(),
            payloads_dropped: self.payloads_dropped.get(),
            send_failures: self.send_failures.get(),
        }
    }
}

/// Point-in-time copy of the processor's counters.
///
/// Counters only grow; compare two snapshots to get a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Points passed to [`Processor::add`](crate::Processor::add) while export was enabled,
    /// including ones whose views were all dropped as late.
    pub points_ingested: u64,
    /// Offsets accepted by [`Processor::add_offset`](crate::Processor::add_offset).
    pub offsets_ingested: u64,
    /// Views of a point (origin or current) or offsets that arrived after their window was
    /// evicted, or carried a negative timestamp.
    pub late_drops: u64,
    /// Points and offsets ignored because export was disabled.
    pub disabled_drops: u64,
    /// Time buckets evicted by a flush, whether they were sent or not.
    pub buckets_flushed: u64,
    /// Payloads the transport accepted.
    pub payloads_sent: u64,
    /// Payloads discarded after exhausting retries or failing to encode.
    pub payloads_dropped: u64,
    /// Failed send attempts, including ones that were later retried successfully.
    pub send_failures: u64,
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bin storage for sketches.

/// Bins are allocated in multiples of this many slots.
const CHUNK_SIZE: i64 = 128;

/// Contiguous, unbounded bin store.
///
/// Counts for indices `min_index..=max_index` live in a single `Vec`, grown in chunks as new
/// indices are seen. With the default 1% mapping, values from one nanosecond to a few days
/// (expressed in seconds) span roughly 3000 bins.
#[derive(Debug, Clone)]
pub struct DenseStore {
    bins: Vec<f64>,
    offset: i32,
    min_index: i32,
    max_index: i32,
    count: f64,
}

impl Default for DenseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            bins: Vec::new(),
            offset: 0,
            min_index: i32::MAX,
            max_index: i32::MIN,
            count: 0.0,
        }
    }

    /// Rebuild a store from contiguous counts starting at `index_offset`.
    pub fn from_contiguous(index_offset: i32, counts: &[f64]) -> Self {
        let mut store = Self::new();
        for (i, count) in counts.iter().enumerate() {
            store.add(index_offset.saturating_add(i as i32), *count);
        }
        store
    }

    /// Add `count` observations to the bin at `index`. Non-positive counts are ignored.
    pub fn add(&mut self, index: i32, count: f64) {
        if count.is_nan() || count <= 0.0 {
            return;
        }
        let position = self.normalize(index);
        self.bins[position] += count;
        self.count += count;
    }

    /// Total number of observations.
    pub fn total_count(&self) -> f64 {
        self.count
    }

    /// Returns true if no observation was added.
    pub fn is_empty(&self) -> bool {
        self.count == 0.0
    }

    /// Smallest non-empty index, if any.
    pub fn min_index(&self) -> Option<i32> {
        (!self.is_empty()).then_some(self.min_index)
    }

    /// Largest non-empty index, if any.
    pub fn max_index(&self) -> Option<i32> {
        (!self.is_empty()).then_some(self.max_index)
    }

    /// Index of the bin holding the observation of the given (zero-based) rank.
    pub fn key_at_rank(&self, rank: f64) -> i32 {
        let rank = rank.max(0.0);
        let mut seen = 0.0;
        for (index, count) in self.iter() {
            seen += count;
            if seen > rank {
                return index;
            }
        }
        self.max_index
    }

    /// Add every observation of `other` into this store.
    pub fn merge(&mut self, other: &DenseStore) {
        if other.is_empty() {
            return;
        }
        self.extend_range(other.min_index, other.max_index);
        for (index, count) in other.iter() {
            let position = (index - self.offset) as usize;
            self.bins[position] += count;
        }
        self.count += other.count;
    }

    /// Iterate over `(index, count)` for every bin between the minimum and maximum index,
    /// including empty bins in between.
    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.contiguous_counts()
            .iter()
            .enumerate()
            .map(|(i, count)| (self.min_index + i as i32, *count))
    }

    /// Counts from the minimum to the maximum index, as written to the wire.
    pub fn contiguous_counts(&self) -> &[f64] {
        if self.is_empty() {
            return &[];
        }
        let start = (self.min_index - self.offset) as usize;
        let end = (self.max_index - self.offset) as usize;
        &self.bins[start..=end]
    }

    /// Remove every observation, keeping the allocation.
    pub fn clear(&mut self) {
        self.bins.iter_mut().for_each(|bin| *bin = 0.0);
        self.min_index = i32::MAX;
        self.max_index = i32::MIN;
        self.count = 0.0;
    }

    fn normalize(&mut self, index: i32) -> usize {
        if index < self.min_index || index > self.max_index {
            self.extend_range(index, index);
        }
        (index - self.offset) as usize
    }

    fn extend_range(&mut self, new_min: i32, new_max: i32) {
        let new_min = new_min.min(self.min_index);
        let new_max = new_max.max(self.max_index);

        let covered = !self.bins.is_empty()
            && new_min >= self.offset
            && (new_max as i64) < self.offset as i64 + self.bins.len() as i64;
        if !covered {
            // at least 1, since new_min <= new_max
            let span = (new_max as i64 - new_min as i64 + 1) as u64;
            let len = span.div_ceil(CHUNK_SIZE as u64) * CHUNK_SIZE as u64;
            let mut bins = vec![0.0; len as usize];
            if !self.is_empty() {
                // only bins within min_index..=max_index are non-zero, and those all fit
                for (index, count) in self.iter() {
                    if count != 0.0 {
                        bins[(index as i64 - new_min as i64) as usize] = count;
                    }
                }
            }
            self.bins = bins;
            self.offset = new_min;
        }
        self.min_index = new_min;
        self.max_index = new_max;
    }
}

impl PartialEq for DenseStore {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.min_index() == other.min_index()
            && self.max_index() == other.max_index()
            && self.contiguous_counts() == other.contiguous_counts()
    }
}

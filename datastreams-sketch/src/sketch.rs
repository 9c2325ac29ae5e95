// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The [`DDSketch`] quantile sketch.

use crate::{
    LogarithmicMapping, QuantileSketch, SketchError,
    proto::{decode_sketch, encode_sketch},
    store::DenseStore,
};

/// Relative-error quantile sketch.
///
/// Positive and negative values are kept in separate [`DenseStore`]s indexed by a
/// [`LogarithmicMapping`]; values too small to index are counted as zero. Merging two sketches
/// with the same mapping is exact: the result is identical to a sketch that saw both streams.
#[derive(Debug, Clone, PartialEq)]
pub struct DDSketch {
    mapping: LogarithmicMapping,
    positive: DenseStore,
    negative: DenseStore,
    zero_count: f64,
}

impl Default for DDSketch {
    fn default() -> Self {
        Self::with_mapping(LogarithmicMapping::default())
    }
}

impl DDSketch {
    /// Create a sketch with the given relative accuracy.
    pub fn with_relative_accuracy(relative_accuracy: f64) -> Result<Self, SketchError> {
        Ok(Self::with_mapping(LogarithmicMapping::new(relative_accuracy)?))
    }

    /// Create an empty sketch using `mapping`.
    pub fn with_mapping(mapping: LogarithmicMapping) -> Self {
        Self {
            mapping,
            positive: DenseStore::new(),
            negative: DenseStore::new(),
            zero_count: 0.0,
        }
    }

    pub(crate) fn from_parts(
        mapping: LogarithmicMapping,
        positive: DenseStore,
        negative: DenseStore,
        zero_count: f64,
    ) -> Self {
        Self {
            mapping,
            positive,
            negative,
            zero_count,
        }
    }

    /// Add a single value.
    ///
    /// Fails if the value is NaN or its magnitude exceeds
    /// [`LogarithmicMapping::max_indexable_value`].
    pub fn try_add(&mut self, value: f64) -> Result<(), SketchError> {
        self.try_add_with_count(value, 1.0)
    }

    /// Add `count` occurrences of `value`.
    pub fn try_add_with_count(&mut self, value: f64, count: f64) -> Result<(), SketchError> {
        let max = self.mapping.max_indexable_value();
        if value.is_nan() || value > max || value < -max {
            return Err(SketchError::ValueOutOfRange(value));
        }
        if count.is_nan() || count <= 0.0 {
            return Ok(());
        }
        let min = self.mapping.min_indexable_value();
        if value > min {
            self.positive.add(self.mapping.index(value), count);
        } else if value < -min {
            self.negative.add(self.mapping.index(-value), count);
        } else {
            self.zero_count += count;
        }
        Ok(())
    }

    /// Merge `other` into this sketch. Both sketches must share the same mapping.
    pub fn merge(&mut self, other: &DDSketch) -> Result<(), SketchError> {
        if self.mapping != other.mapping {
            return Err(SketchError::MappingMismatch);
        }
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
        self.zero_count += other.zero_count;
        Ok(())
    }

    /// Approximate value at quantile `q`, or `None` if the sketch is empty or `q` is outside
    /// `[0, 1]`.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&q) || self.is_empty() {
            return None;
        }
        let rank = q * (self.count() - 1.0);
        let negative_count = self.negative.total_count();
        if rank < negative_count {
            let index = self.negative.key_at_rank(negative_count - 1.0 - rank);
            Some(-self.mapping.value(index))
        } else if rank < self.zero_count + negative_count {
            Some(0.0)
        } else {
            let index = self
                .positive
                .key_at_rank(rank - self.zero_count - negative_count);
            Some(self.mapping.value(index))
        }
    }

    /// Approximate smallest value seen.
    pub fn min(&self) -> Option<f64> {
        self.quantile(0.0)
    }

    /// Approximate largest value seen.
    pub fn max(&self) -> Option<f64> {
        self.quantile(1.0)
    }

    /// Total number of values added.
    pub fn count(&self) -> f64 {
        self.positive.total_count() + self.negative.total_count() + self.zero_count
    }

    /// Returns true if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.count() == 0.0
    }

    /// Number of values counted as zero.
    pub fn zero_count(&self) -> f64 {
        self.zero_count
    }

    /// The index mapping of this sketch.
    pub fn mapping(&self) -> &LogarithmicMapping {
        &self.mapping
    }

    /// Store of positive values.
    pub fn positive_store(&self) -> &DenseStore {
        &self.positive
    }

    /// Store of negative values, indexed by magnitude.
    pub fn negative_store(&self) -> &DenseStore {
        &self.negative
    }

    /// Remove every value, keeping the mapping.
    pub fn clear(&mut self) {
        self.positive.clear();
        self.negative.clear();
        self.zero_count = 0.0;
    }

    /// Serialize to the collector's protobuf representation.
    ///
    /// The output is a pure function of the sketch contents: two sketches that compare equal
    /// encode to the same bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_sketch(self)
    }

    /// Parse the protobuf representation produced by [`DDSketch::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, SketchError> {
        decode_sketch(bytes)
    }
}

impl QuantileSketch for DDSketch {
    type Config = LogarithmicMapping;

    fn new(config: &LogarithmicMapping) -> Self {
        Self::with_mapping(*config)
    }

    fn add(&mut self, value: f64) {
        // out-of-range values can't be represented; dropping them keeps ingestion infallible
        self.try_add(value).ok();
    }

    fn merge(&mut self, other: &Self) -> Result<(), SketchError> {
        DDSketch::merge(self, other)
    }

    fn count(&self) -> f64 {
        DDSketch::count(self)
    }

    fn encode(&self) -> Vec<u8> {
        DDSketch::encode(self)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use crate::{DDSketch, SketchError};

    #[test]
    fn rejects_unrepresentable_values() {
        let mut sketch = DDSketch::default();
        check!(let Err(SketchError::ValueOutOfRange(_)) = sketch.try_add(f64::NAN));
        check!(sketch.try_add(f64::INFINITY).is_err());
        check!(sketch.try_add(f64::MAX).is_err());
        check!(sketch.is_empty());
    }

    #[test]
    fn tiny_values_count_as_zero() {
        let mut sketch = DDSketch::default();
        sketch.try_add(0.0).unwrap();
        sketch.try_add(f64::MIN_POSITIVE).unwrap();
        check!(sketch.zero_count() == 2.0);
        check!(sketch.quantile(0.5) == Some(0.0));
    }

    #[test]
    fn negative_values() {
        let mut sketch = DDSketch::default();
        for v in [-3.0, -2.0, -1.0, 1.0, 2.0] {
            sketch.try_add(v).unwrap();
        }
        let min = sketch.min().unwrap();
        check!((min + 3.0).abs() <= 3.0 * 0.01);
        let max = sketch.max().unwrap();
        check!((max - 2.0).abs() <= 2.0 * 0.01);
        let median = sketch.quantile(0.5).unwrap();
        check!((median + 1.0).abs() <= 0.01);
    }

    #[test]
    fn empty_sketch_has_no_quantiles() {
        let sketch = DDSketch::default();
        check!(sketch.quantile(0.5) == None);
        check!(sketch.count() == 0.0);
    }

    #[test]
    fn out_of_range_quantile() {
        let mut sketch = DDSketch::default();
        sketch.try_add(1.0).unwrap();
        check!(sketch.quantile(-0.1) == None);
        check!(sketch.quantile(1.1) == None);
    }

    #[test]
    fn weighted_add() {
        let mut sketch = DDSketch::default();
        sketch.try_add_with_count(4.0, 3.0).unwrap();
        sketch.try_add_with_count(4.0, 0.0).unwrap();
        check!(sketch.count() == 3.0);
    }

    #[test]
    fn clear_keeps_mapping() {
        let mut sketch = DDSketch::with_relative_accuracy(0.05).unwrap();
        sketch.try_add(10.0).unwrap();
        sketch.clear();
        check!(sketch.is_empty());
        check!(sketch == DDSketch::with_relative_accuracy(0.05).unwrap());
    }
}

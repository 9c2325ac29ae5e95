// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logarithmic index mapping.
//!
//! The mapping assigns every positive value to an integer bin index such that all values sharing
//! a bin are within the relative accuracy of the bin's representative value.

use crate::SketchError;

/// Relative accuracy used by [`LogarithmicMapping::default`].
pub const DEFAULT_RELATIVE_ACCURACY: f64 = 0.01;

/// Maps values to bin indices using `index = floor(ln(value) / ln(gamma))`.
///
/// `gamma = (1 + a) / (1 - a)` where `a` is the relative accuracy. Two mappings are equal, and
/// therefore their sketches mergeable, when their `gamma` and index offset are equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogarithmicMapping {
    gamma: f64,
    index_offset: f64,
    multiplier: f64,
    relative_accuracy: f64,
    min_indexable_value: f64,
    max_indexable_value: f64,
}

impl LogarithmicMapping {
    /// Create a mapping guaranteeing the given relative accuracy.
    ///
    /// ```
    /// use datastreams_sketch::LogarithmicMapping;
    ///
    /// let mapping = LogarithmicMapping::new(0.02).unwrap();
    /// assert!((mapping.relative_accuracy() - 0.02).abs() < 1e-12);
    /// assert!(LogarithmicMapping::new(1.5).is_err());
    /// ```
    pub fn new(relative_accuracy: f64) -> Result<Self, SketchError> {
        if !(relative_accuracy > 0.0 && relative_accuracy < 1.0) {
            return Err(SketchError::InvalidRelativeAccuracy(relative_accuracy));
        }
        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Self::with_gamma(gamma, 0.0)
    }

    /// Rebuild a mapping from its serialized parameters.
    pub fn with_gamma(gamma: f64, index_offset: f64) -> Result<Self, SketchError> {
        if !(gamma > 1.0 && gamma.is_finite()) || !index_offset.is_finite() {
            return Err(SketchError::InvalidRelativeAccuracy(1.0 - 2.0 / (1.0 + gamma)));
        }
        let multiplier = 1.0 / gamma.ln();
        let min_indexable_value = f64::max(
            ((i32::MIN as f64 - index_offset) / multiplier + 1.0).exp(),
            f64::MIN_POSITIVE * gamma,
        );
        let max_indexable_value = f64::min(
            ((i32::MAX as f64 - index_offset) / multiplier - 1.0).exp(),
            f64::MAX / gamma,
        );
        Ok(Self {
            gamma,
            index_offset,
            multiplier,
            relative_accuracy: 1.0 - 2.0 / (1.0 + gamma),
            min_indexable_value,
            max_indexable_value,
        })
    }

    /// Bin index of a positive value.
    pub fn index(&self, value: f64) -> i32 {
        let index = value.ln() * self.multiplier + self.index_offset;
        if index >= 0.0 {
            index as i32
        } else {
            index as i32 - 1
        }
    }

    /// Representative value of a bin. Every value mapped to `index` is within the relative
    /// accuracy of it.
    pub fn value(&self, index: i32) -> f64 {
        self.lower_bound(index) * (1.0 + self.relative_accuracy)
    }

    fn lower_bound(&self, index: i32) -> f64 {
        ((index as f64 - self.index_offset) / self.multiplier).exp()
    }

    /// The guaranteed relative accuracy.
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// Ratio between consecutive bin boundaries.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Constant added to every index.
    pub fn index_offset(&self) -> f64 {
        self.index_offset
    }

    /// Values at or below this are counted as zero.
    pub fn min_indexable_value(&self) -> f64 {
        self.min_indexable_value
    }

    /// Values above this can't be tracked.
    pub fn max_indexable_value(&self) -> f64 {
        self.max_indexable_value
    }
}

impl Default for LogarithmicMapping {
    fn default() -> Self {
        Self::new(DEFAULT_RELATIVE_ACCURACY).expect("known good")
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod error;
pub mod mapping;
mod proto;
mod sketch;
pub mod store;

pub use error::SketchError;
pub use mapping::{DEFAULT_RELATIVE_ACCURACY, LogarithmicMapping};
pub use sketch::DDSketch;
pub use store::DenseStore;

/// A mergeable summary of a distribution of values.
///
/// Aggregators are generic over this trait so the sketch can be swapped without touching
/// bucketing logic. Implementations must make [`merge`](QuantileSketch::merge) commutative and
/// associative, so the order in which observations reach a sketch never changes its encoding.
pub trait QuantileSketch: Send + 'static {
    /// Parameters shared by every sketch an aggregator creates.
    type Config: Clone + Default + Send + Sync + 'static;

    /// Create an empty sketch.
    fn new(config: &Self::Config) -> Self;

    /// Record a value. Values the sketch can't represent are ignored.
    fn add(&mut self, value: f64);

    /// Fold `other` into this sketch.
    fn merge(&mut self, other: &Self) -> Result<(), SketchError>;

    /// Number of values recorded.
    fn count(&self) -> f64;

    /// Returns true if no value was recorded.
    fn is_empty(&self) -> bool {
        self.count() == 0.0
    }

    /// Serialize the sketch for export.
    fn encode(&self) -> Vec<u8>;
}

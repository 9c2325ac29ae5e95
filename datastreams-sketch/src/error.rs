// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Errors returned by sketch construction, insertion, merging and decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SketchError {
    /// Relative accuracy must be strictly between 0 and 1.
    InvalidRelativeAccuracy(f64),
    /// The value is NaN or outside the range the index mapping can represent.
    ValueOutOfRange(f64),
    /// The two sketches were built with different index mappings and can't be merged.
    MappingMismatch,
    /// The bytes are not a valid protobuf-encoded sketch.
    Decode(&'static str),
}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRelativeAccuracy(accuracy) => {
                write!(f, "relative accuracy must be in (0, 1), not {accuracy}")
            }
            Self::ValueOutOfRange(value) => {
                write!(f, "value {value} can't be tracked by the sketch")
            }
            Self::MappingMismatch => f.write_str("can't merge sketches with different index mappings"),
            Self::Decode(reason) => write!(f, "invalid encoded sketch: {reason}"),
        }
    }
}

impl std::error::Error for SketchError {}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Protobuf wire format for sketches.
//!
//! Schema understood by the collector:
//!
//! ```text
//! message DDSketch {
//!   IndexMapping mapping = 1;
//!   Store positiveValues = 2;
//!   Store negativeValues = 3;
//!   double zeroCount = 4;
//! }
//! message IndexMapping {
//!   double gamma = 1;
//!   double indexOffset = 2;
//!   Interpolation interpolation = 3; // only NONE (0) is produced or accepted
//! }
//! message Store {
//!   map<sint32, double> binCounts = 1;
//!   repeated double contiguousBinCounts = 2 [packed = true];
//!   sint32 contiguousBinIndexOffset = 3;
//! }
//! ```
//!
//! Scalar fields holding their default value are omitted, as proto3 encoders do.

use crate::{DDSketch, LogarithmicMapping, SketchError, store::DenseStore};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;

// widest index range a decoded store may span; far beyond what any finite value needs
const MAX_DECODED_SPAN: i64 = 1 << 20;
const WIRE_FIXED32: u8 = 5;

pub(crate) fn encode_sketch(sketch: &DDSketch) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    let mut scratch = Vec::new();

    encode_mapping(sketch.mapping(), &mut scratch);
    put_message(&mut out, 1, &scratch);

    scratch.clear();
    encode_store(sketch.positive_store(), &mut scratch);
    put_message(&mut out, 2, &scratch);

    scratch.clear();
    encode_store(sketch.negative_store(), &mut scratch);
    put_message(&mut out, 3, &scratch);

    put_double(&mut out, 4, sketch.zero_count());
    out
}

fn encode_mapping(mapping: &LogarithmicMapping, out: &mut Vec<u8>) {
    put_double(out, 1, mapping.gamma());
    put_double(out, 2, mapping.index_offset());
}

fn encode_store(store: &DenseStore, out: &mut Vec<u8>) {
    let counts = store.contiguous_counts();
    if counts.is_empty() {
        return;
    }
    put_tag(out, 2, WIRE_LEN);
    put_varint(out, (counts.len() * 8) as u64);
    for count in counts {
        out.extend_from_slice(&count.to_le_bytes());
    }
    if let Some(offset) = store.min_index() {
        if offset != 0 {
            put_tag(out, 3, WIRE_VARINT);
            put_varint(out, zigzag(offset) as u64);
        }
    }
}

pub(crate) fn decode_sketch(bytes: &[u8]) -> Result<DDSketch, SketchError> {
    let mut reader = Reader::new(bytes);
    let mut mapping = None;
    let mut positive = DenseStore::new();
    let mut negative = DenseStore::new();
    let mut zero_count = 0.0;

    while let Some((field, wire_type)) = reader.tag()? {
        match (field, wire_type) {
            (1, WIRE_LEN) => mapping = Some(decode_mapping(reader.bytes()?)?),
            (2, WIRE_LEN) => positive = decode_store(reader.bytes()?)?,
            (3, WIRE_LEN) => negative = decode_store(reader.bytes()?)?,
            (4, WIRE_FIXED64) => {
                zero_count = reader.double()?;
                check_count(zero_count)?;
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    let mapping = mapping.ok_or(SketchError::Decode("missing index mapping"))?;
    Ok(DDSketch::from_parts(mapping, positive, negative, zero_count))
}

fn decode_mapping(bytes: &[u8]) -> Result<LogarithmicMapping, SketchError> {
    let mut reader = Reader::new(bytes);
    let mut gamma = 0.0;
    let mut index_offset = 0.0;
    while let Some((field, wire_type)) = reader.tag()? {
        match (field, wire_type) {
            (1, WIRE_FIXED64) => gamma = reader.double()?,
            (2, WIRE_FIXED64) => index_offset = reader.double()?,
            (3, WIRE_VARINT) => {
                if reader.varint()? != 0 {
                    return Err(SketchError::Decode("only logarithmic mappings are supported"));
                }
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }
    LogarithmicMapping::with_gamma(gamma, index_offset)
        .map_err(|_| SketchError::Decode("invalid mapping gamma"))
}

fn decode_store(bytes: &[u8]) -> Result<DenseStore, SketchError> {
    let mut reader = Reader::new(bytes);
    let mut entries = Vec::new();
    let mut contiguous = Vec::new();
    let mut contiguous_offset = 0;
    while let Some((field, wire_type)) = reader.tag()? {
        match (field, wire_type) {
            (1, WIRE_LEN) => entries.push(decode_bin_entry(reader.bytes()?)?),
            (2, WIRE_LEN) => {
                let mut packed = Reader::new(reader.bytes()?);
                while !packed.is_done() {
                    contiguous.push(packed.double()?);
                }
            }
            (2, WIRE_FIXED64) => contiguous.push(reader.double()?),
            (3, WIRE_VARINT) => contiguous_offset = unzigzag(reader.varint()? as u32),
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    let contiguous_end = i64::from(contiguous_offset) + contiguous.len() as i64;
    if contiguous_end > i64::from(i32::MAX) {
        return Err(SketchError::Decode("bin index out of range"));
    }
    let indices = entries
        .iter()
        .filter(|(_, count)| is_valid_count(*count))
        .map(|(index, _)| i64::from(*index))
        .chain(
            contiguous
                .iter()
                .enumerate()
                .filter(|(_, count)| is_valid_count(**count))
                .map(|(i, _)| i64::from(contiguous_offset) + i as i64),
        );
    let (min, max) = indices.fold((i64::MAX, i64::MIN), |(min, max), i| (min.min(i), max.max(i)));
    if min <= max && max - min >= MAX_DECODED_SPAN {
        return Err(SketchError::Decode("bin index range too wide"));
    }

    let mut store = DenseStore::new();
    for (index, count) in entries {
        check_count(count)?;
        store.add(index, count);
    }
    for count in &contiguous {
        check_count(*count)?;
    }
    store.merge(&DenseStore::from_contiguous(contiguous_offset, &contiguous));
    Ok(store)
}

fn is_valid_count(count: f64) -> bool {
    count.is_finite() && count > 0.0
}

fn check_count(count: f64) -> Result<(), SketchError> {
    if count.is_finite() && count >= 0.0 {
        Ok(())
    } else {
        Err(SketchError::Decode("invalid bin count"))
    }
}

fn decode_bin_entry(bytes: &[u8]) -> Result<(i32, f64), SketchError> {
    let mut reader = Reader::new(bytes);
    let mut index = 0;
    let mut count = 0.0;
    while let Some((field, wire_type)) = reader.tag()? {
        match (field, wire_type) {
            (1, WIRE_VARINT) => index = unzigzag(reader.varint()? as u32),
            (2, WIRE_FIXED64) => count = reader.double()?,
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }
    Ok((index, count))
}

fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn put_tag(out: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(out, ((field << 3) | wire_type as u32) as u64);
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn put_double(out: &mut Vec<u8>, field: u32, value: f64) {
    // proto3 skips +0.0 but keeps -0.0
    if value.to_bits() == 0 {
        return;
    }
    put_tag(out, field, WIRE_FIXED64);
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_message(out: &mut Vec<u8>, field: u32, body: &[u8]) {
    put_tag(out, field, WIRE_LEN);
    put_varint(out, body.len() as u64);
    out.extend_from_slice(body);
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_done(&self) -> bool {
        self.bytes.is_empty()
    }

    fn tag(&mut self) -> Result<Option<(u32, u8)>, SketchError> {
        if self.is_done() {
            return Ok(None);
        }
        let tag = self.varint()?;
        let field = u32::try_from(tag >> 3).map_err(|_| SketchError::Decode("field number too large"))?;
        Ok(Some((field, (tag & 0x7) as u8)))
    }

    fn varint(&mut self) -> Result<u64, SketchError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let (&byte, rest) = self
                .bytes
                .split_first()
                .ok_or(SketchError::Decode("truncated varint"))?;
            self.bytes = rest;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(SketchError::Decode("varint too long"))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SketchError> {
        if self.bytes.len() < len {
            return Err(SketchError::Decode("truncated field"));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn double(&mut self) -> Result<f64, SketchError> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(f64::from_le_bytes(buf))
    }

    fn bytes(&mut self) -> Result<&'a [u8], SketchError> {
        let len = usize::try_from(self.varint()?)
            .map_err(|_| SketchError::Decode("length overflows usize"))?;
        self.take(len)
    }

    fn skip(&mut self, wire_type: u8) -> Result<(), SketchError> {
        match wire_type {
            WIRE_VARINT => self.varint().map(drop),
            WIRE_FIXED64 => self.take(8).map(drop),
            WIRE_LEN => self.bytes().map(drop),
            WIRE_FIXED32 => self.take(4).map(drop),
            _ => Err(SketchError::Decode("unsupported wire type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use rstest::rstest;

    use super::{
        WIRE_VARINT, decode_store, put_double, put_message, put_tag, put_varint, unzigzag, zigzag,
    };
    use crate::SketchError;

    fn bin_entry(index: i32, count: f64) -> Vec<u8> {
        let mut entry = Vec::new();
        put_tag(&mut entry, 1, WIRE_VARINT);
        put_varint(&mut entry, u64::from(zigzag(index)));
        put_double(&mut entry, 2, count);
        entry
    }

    #[rstest]
    #[case(0, 0)]
    #[case(-1, 1)]
    #[case(1, 2)]
    #[case(-2, 3)]
    #[case(i32::MAX, u32::MAX - 1)]
    #[case(i32::MIN, u32::MAX)]
    fn zigzag_matches_protobuf(#[case] value: i32, #[case] encoded: u32) {
        check!(zigzag(value) == encoded);
        check!(unzigzag(encoded) == value);
    }

    #[test]
    fn varint_encoding() {
        let mut out = Vec::new();
        put_varint(&mut out, 300);
        check!(out == vec![0xac, 0x02]);
    }

    #[test]
    fn rejects_sparse_bins_too_far_apart() {
        let mut store = Vec::new();
        put_message(&mut store, 1, &bin_entry(-1_000_000, 1.0));
        put_message(&mut store, 1, &bin_entry(1_000_000, 1.0));
        check!(let Err(SketchError::Decode(_)) = decode_store(&store));
    }

    #[test]
    fn rejects_invalid_counts() {
        let mut store = Vec::new();
        put_message(&mut store, 1, &bin_entry(3, f64::NAN));
        check!(let Err(SketchError::Decode(_)) = decode_store(&store));
    }

    #[test]
    fn sparse_bins_are_accepted() {
        let mut store = Vec::new();
        put_message(&mut store, 1, &bin_entry(-2, 1.0));
        put_message(&mut store, 1, &bin_entry(5, 2.0));
        let store = decode_store(&store).unwrap();
        check!(store.total_count() == 3.0);
        check!(store.min_index() == Some(-2));
        check!(store.max_index() == Some(5));
    }
}

use std::{
    sync::Arc,
    thread,
    time::{Duration, UNIX_EPOCH},
};

use assert2::check;
use datastreams::{
    KafkaOffset, Processor, StatsBucket, StatsGroup, StatsPayload, StatsPoint, TimestampType,
    sketch::{DDSketch, QuantileSketch},
    timesource::{TimeSource, fakes::StaticTimeSource},
};
use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use rstest::rstest;

const SECOND: i64 = 1_000_000_000;
const BUCKET: i64 = 10 * SECOND;
// aligned to the bucket duration
const T1: i64 = 1_700_000_000 * SECOND;
const T2: i64 = T1 + 60 * SECOND;

fn sketch(values: &[f64]) -> Vec<u8> {
    let mut sketch = DDSketch::default();
    for v in values {
        QuantileSketch::add(&mut sketch, *v);
    }
    sketch.encode()
}

fn point(hash: u64, timestamp: i64, pathway_secs: i64, edge_secs: i64, size: i64) -> StatsPoint {
    StatsPoint {
        edge_tags: vec!["type:edge-1".into()],
        hash,
        parent_hash: 1,
        timestamp_nanos: timestamp,
        pathway_latency_nanos: pathway_secs * SECOND,
        edge_latency_nanos: edge_secs * SECOND,
        payload_size_bytes: size,
    }
}

fn group(hash: u64, values: [&[f64]; 3], timestamp_type: TimestampType) -> StatsGroup {
    StatsGroup {
        edge_tags: vec!["type:edge-1".into()],
        hash,
        parent_hash: 1,
        pathway_latency: sketch(values[0]),
        edge_latency: sketch(values[1]),
        payload_size: sketch(values[2]),
        timestamp_type,
    }
}

fn bucket(start: i64, stats: Vec<StatsGroup>) -> StatsBucket {
    StatsBucket {
        start: start as u64,
        duration: BUCKET as u64,
        stats,
        backlogs: vec![],
    }
}

fn processor() -> Processor {
    Processor::builder()
        .env("env")
        .service("service")
        .tracer_version("1.2.3")
        .build()
}

fn payload(stats: Vec<StatsBucket>) -> StatsPayload {
    StatsPayload {
        env: "env".into(),
        service: "service".into(),
        stats,
        tracer_version: "1.2.3".into(),
        lang: "rust".into(),
    }
}

#[test]
fn origin_and_current_windows() {
    let p = processor();
    p.add(point(2, T2, 1, 1, 1));
    p.add(point(2, T2, 5, 2, 2));
    p.add(point(3, T2, 5, 2, 2));
    p.add(point(2, T1, 5, 2, 2));

    let got = p.flush(T1 + BUCKET);
    check!(
        got == payload(vec![
            bucket(
                T1 - BUCKET,
                vec![group(2, [&[5.0], &[2.0], &[2.0]], TimestampType::Origin)]
            ),
            bucket(
                T1,
                vec![group(2, [&[5.0], &[2.0], &[2.0]], TimestampType::Current)]
            ),
        ])
    );

    let got = p.flush(T2 + BUCKET);
    check!(
        got == payload(vec![
            bucket(
                T2 - BUCKET,
                vec![
                    group(2, [&[1.0, 5.0], &[1.0, 2.0], &[1.0, 2.0]], TimestampType::Origin),
                    group(3, [&[5.0], &[2.0], &[2.0]], TimestampType::Origin),
                ]
            ),
            bucket(
                T2,
                vec![
                    group(2, [&[1.0, 5.0], &[1.0, 2.0], &[1.0, 2.0]], TimestampType::Current),
                    group(3, [&[5.0], &[2.0], &[2.0]], TimestampType::Current),
                ]
            ),
        ])
    );
}

#[test]
fn same_key_values_are_merged_not_replaced() {
    let p = processor();
    p.add(point(2, T1, 1, 1, 1));
    p.add(point(2, T1, 5, 5, 2));
    let got = p.flush(T1 + BUCKET);
    let current = got
        .stats
        .iter()
        .find(|b| b.start == T1 as u64)
        .expect("current window");
    check!(current.stats.len() == 1);
    check!(current.stats[0].pathway_latency == sketch(&[1.0, 5.0]));
    check!(current.stats[0].payload_size == sketch(&[1.0, 2.0]));

    let decoded = DDSketch::decode(&current.stats[0].pathway_latency).unwrap();
    check!(decoded.count() == 2.0);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn arrival_order_does_not_matter(#[case] seed: u64) {
    let mut points: Vec<_> = (0..200)
        .map(|i| {
            point(
                (i % 3) as u64,
                T1 + (i % 25) * SECOND,
                i % 7,
                i % 4,
                i * 13,
            )
        })
        .collect();
    let ordered = processor();
    for p in &points {
        ordered.add(p.clone());
    }
    points.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let shuffled = processor();
    for p in points {
        shuffled.add(p);
    }
    check!(ordered.flush(i64::MAX) == shuffled.flush(i64::MAX));
}

#[test]
fn open_windows_are_kept() {
    let p = processor();
    p.add(point(2, T1 + 5 * SECOND, 0, 0, 1));
    // the window [T1, T1 + 10s) hasn't ended yet
    check!(p.flush(T1 + 9 * SECOND).is_empty());
    p.add(point(2, T1 + 6 * SECOND, 0, 0, 1));
    let got = p.flush(T1 + BUCKET);
    check!(got.stats.len() == 2);
    check!(DDSketch::decode(&got.stats[1].stats[0].payload_size).unwrap().count() == 2.0);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
fn retained_windows(#[case] retained: u32) {
    let p = Processor::builder().retained_windows(retained).build();
    p.add(point(2, T1, 0, 0, 1));
    let closes_at = T1 + BUCKET * (1 + i64::from(retained));
    check!(p.flush(closes_at - 1).is_empty());
    // still open, so still accepting late points
    p.add(point(2, T1 + 1, 0, 0, 1));
    check!(p.counters().late_drops == 0);
    let got = p.flush(closes_at);
    check!(got.stats.iter().all(|b| b.start == T1 as u64));
    check!(got.stats.len() == 2);
}

#[test]
fn repeated_flush_is_idempotent() {
    let p = processor();
    p.add(point(2, T1, 0, 0, 1));
    p.add(point(2, T2, 0, 0, 1));
    let first = p.flush(T1 + BUCKET);
    check!(first.stats.len() == 2);
    check!(p.flush(T1 + BUCKET).is_empty());
    check!(p.flush(T1 + BUCKET).is_empty());
    // the open window wasn't touched by the repeated flushes
    let later = p.flush(T2 + BUCKET);
    check!(later.stats.len() == 2);
    check!(later.stats.iter().all(|b| b.start == T2 as u64));
}

#[test]
fn late_points_are_dropped_and_counted() {
    let p = processor();
    p.add(point(2, T2, 0, 0, 1));
    check!(p.flush(T2 + BUCKET).stats.len() == 2);

    // both views land in an evicted window
    p.add(point(2, T1, 0, 0, 1));
    // origin view is late, current view is new
    p.add(point(2, T2 + BUCKET, 20, 0, 1));

    let counters = p.counters();
    check!(counters.points_ingested == 3);
    check!(counters.late_drops == 3);
    let got = p.flush(i64::MAX);
    check!(got.stats.len() == 1);
    check!(got.stats[0].start == (T2 + BUCKET) as u64);
    check!(got.stats[0].stats[0].timestamp_type == TimestampType::Current);
}

#[test]
fn payload_identity() {
    let p = Processor::builder().env("prod").service("checkout").build();
    let got = p.flush(0);
    check!(got.env == "prod");
    check!(got.service == "checkout");
    check!(got.lang == "rust");
    check!(got.tracer_version == env!("CARGO_PKG_VERSION"));
}

#[test]
fn custom_bucket_duration() {
    let p = Processor::builder()
        .bucket_duration(Duration::from_secs(1))
        .build();
    p.add(point(2, 2 * SECOND + 500, 1, 0, 1));
    let got = p.flush(i64::MAX);
    let starts: Vec<_> = got.stats.iter().map(|b| (b.start, b.duration)).collect();
    check!(starts == [(SECOND as u64, SECOND as u64), (2 * SECOND as u64, SECOND as u64)]);
}

#[test]
fn disabled_processor_ignores_points() {
    let p = Processor::builder().export_enabled(|| false).build();
    check!(!p.is_export_enabled());
    p.add(point(2, T1, 0, 0, 1));
    check!(p.flush(i64::MAX).is_empty());
    check!(p.counters().disabled_drops == 1);
    check!(p.counters().points_ingested == 0);
}

#[test]
fn concurrent_producers() {
    let p = Arc::new(processor());
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for i in 0..500 {
                    p.add(point(t, T1 + (i % 10) * SECOND, 0, 0, 1));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    let got = p.flush(i64::MAX);
    check!(p.counters().points_ingested == 4000);
    for bucket in &got.stats {
        check!(bucket.stats.len() == 8);
        for group in &bucket.stats {
            check!(DDSketch::decode(&group.payload_size).unwrap().count() == 500.0);
        }
    }
}

#[rstest]
#[case(1_000, i64::MAX)]
#[case(i64::MIN, 0)]
#[case(i64::MIN, i64::MAX)]
#[case(i64::MIN, i64::MIN)]
#[case(i64::MAX, i64::MAX)]
#[case(i64::MAX, i64::MIN)]
fn extreme_timestamps_never_panic(#[case] timestamp: i64, #[case] latency: i64) {
    let p = processor();
    p.add(StatsPoint {
        timestamp_nanos: timestamp,
        pathway_latency_nanos: latency,
        edge_latency_nanos: latency,
        payload_size_bytes: latency,
        ..Default::default()
    });
    let counters = p.counters();
    check!(counters.points_ingested == 1);

    let payload = p.flush(i64::MAX);
    let accepted = payload.stats.iter().map(|b| b.stats.len() as u64).sum::<u64>();
    check!(accepted + counters.late_drops == 2);
    for bucket in &payload.stats {
        check!(bucket.start % bucket.duration == 0);
    }
}

#[test]
fn offsets_before_the_representable_range_are_dropped() {
    // earlier than i64::MIN nanoseconds, so the clock saturates
    let long_ago = UNIX_EPOCH - Duration::from_secs(400 * 365 * 24 * 3600);
    let p = Processor::builder()
        .time_source(TimeSource::custom(StaticTimeSource::at_time(long_ago)))
        .build();
    p.add_offset(KafkaOffset::produce("orders", 0, 1));
    let counters = p.counters();
    check!(counters.offsets_ingested == 0);
    check!(counters.late_drops == 1);
    check!(p.flush(i64::MAX).is_empty());
}

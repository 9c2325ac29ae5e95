#![no_main]

use arbitrary::Arbitrary;
use datastreams::{Processor, StatsPayload, StatsPoint};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Add {
        edge_tags: Vec<String>,
        hash: u64,
        parent_hash: u64,
        timestamp_nanos: i64,
        pathway_latency_nanos: i64,
        edge_latency_nanos: i64,
        payload_size_bytes: i64,
    },
    Flush(i64),
}

fuzz_target!(|ops: Vec<Op>| {
    let processor = Processor::builder().build();
    let mut flushed = Vec::new();
    for op in ops {
        match op {
            Op::Add {
                edge_tags,
                hash,
                parent_hash,
                timestamp_nanos,
                pathway_latency_nanos,
                edge_latency_nanos,
                payload_size_bytes,
            } => processor.add(StatsPoint {
                edge_tags,
                hash,
                parent_hash,
                timestamp_nanos,
                pathway_latency_nanos,
                edge_latency_nanos,
                payload_size_bytes,
            }),
            Op::Flush(now) => flushed.push(processor.flush(now)),
        }
    }
    flushed.push(processor.flush(i64::MAX));

    // a window is exported at most once
    let mut groups: Vec<_> = flushed
        .iter()
        .flat_map(|p| &p.stats)
        .flat_map(|b| {
            b.stats
                .iter()
                .map(move |g| (b.start, g.timestamp_type, g.hash, g.parent_hash, &g.edge_tags))
        })
        .collect();
    let total = groups.len();
    groups.sort();
    groups.dedup();
    assert_eq!(groups.len(), total);

    for payload in &flushed {
        let bytes = payload.to_json().expect("payload encodes");
        let decoded: StatsPayload = serde_json::from_slice(&bytes).expect("payload decodes");
        assert_eq!(&decoded, payload);
    }
});

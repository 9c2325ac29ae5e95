#![no_main]

use datastreams_sketch::DDSketch;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // arbitrary bytes must be rejected, never panic
    if let Ok(sketch) = DDSketch::decode(data) {
        let again = DDSketch::decode(&sketch.encode()).expect("re-encoded sketch decodes");
        assert_eq!(again.is_empty(), sketch.is_empty());
        let _ = sketch.quantile(0.5);
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use zerobuild_preview::tree::{flatten_files, normalize, normalize_with_diagnostics};

fuzz_target!(|data: &[u8]| {
    let Ok(serde_json::Value::Object(raw)) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let normalized = normalize_with_diagnostics(&raw);
    let _ = flatten_files(&normalized.tree);

    // A normalized tree fed back through the normalizer is unchanged.
    let canonical = serde_json::to_value(&normalized.tree).unwrap();
    if let serde_json::Value::Object(canonical) = canonical {
        let again = normalize(&canonical);
        assert_eq!(again, normalized.tree);
    }
});

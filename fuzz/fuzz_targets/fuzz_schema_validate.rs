#![no_main]

use confluence::metadata::MetadataTree;
use confluence::schema::{validate, Schema};
use libfuzzer_sys::fuzz_target;

// Input: a schema document and an instance document separated by a NUL byte.
fuzz_target!(|data: &[u8]| {
    let mut parts = data.splitn(2, |&b| b == 0);
    let (Some(schema), Some(instance)) = (parts.next(), parts.next()) else {
        return;
    };

    // Malformed schemas must be rejected, never panic.
    let Ok(schema) = std::str::from_utf8(schema)
        .map_err(|_| ())
        .and_then(|s| Schema::from_json_str(s).map_err(|_| ()))
    else {
        return;
    };
    let _ = schema.check();

    let Ok(instance) = serde_json::from_slice::<serde_json::Value>(instance) else {
        return;
    };
    if let Err(violation) = validate(&instance, &schema) {
        let _ = violation.to_string();
    }

    // Round trips through the wire format and metadata trees are panic-free too.
    let _ = Schema::from_value(schema.to_value());
    if let Ok(tree) = MetadataTree::from_value(instance) {
        let mut merged = MetadataTree::new();
        merged.merge(&tree, "fuzz");
        merged.merge(&tree, "fuzz again");
    }
});

//! Payload filter builders for maintenance operations.

use serde_json::{Value, json};

/// Match every point written for the given document.
pub fn document_filter(doc_id: &str) -> Value {
    keyword_filter("doc_id", doc_id)
}

fn keyword_filter(key: &str, value: &str) -> Value {
    json!({
        "must": [
            {
                "key": key,
                "match": { "value": value }
            }
        ]
    })
}

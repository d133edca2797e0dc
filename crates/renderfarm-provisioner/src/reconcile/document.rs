//! Resource documents and their canonical comparison
//!
//! Every resource state is a JSON document. Two documents describe the same
//! state when their canonical forms are equal: object keys sorted, arrays in
//! their original order, scalars compared by value.
//!
//! Observed documents usually carry more than was asked for (ARNs, revision
//! numbers, provider defaults). [`converged`] therefore projects the observed
//! document onto the fields the desired document declares before comparing.

use super::error::ReconcileError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// JSON document describing a resource state
pub type Document = Value;

/// Rebuild `doc` with every object's keys in sorted order.
pub fn canonicalize(doc: &Document) -> Document {
    match doc {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Document> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact serialization of the canonical form.
pub fn canonical_json(doc: &Document) -> String {
    canonicalize(doc).to_string()
}

/// Structural equality of canonical forms.
pub fn documents_match(a: &Document, b: &Document) -> bool {
    canonical_json(a) == canonical_json(b)
}

/// Keep only the parts of `observed` whose keys appear in `desired`.
///
/// Recurses through nested objects. Arrays and scalars are kept whole.
pub fn project_onto(observed: &Document, desired: &Document) -> Document {
    match (observed, desired) {
        (Value::Object(obs), Value::Object(want)) => {
            let mut out = Map::new();
            for (key, wanted) in want {
                if let Some(value) = obs.get(key) {
                    out.insert(key.clone(), project_onto(value, wanted));
                }
            }
            Value::Object(out)
        }
        _ => observed.clone(),
    }
}

/// Whether `observed` already satisfies every field declared by `desired`.
pub fn converged(observed: &Document, desired: &Document) -> bool {
    documents_match(&project_onto(observed, desired), desired)
}

/// Read a required string field from a document.
pub fn required_str<'a>(
    doc: &'a Document,
    key: &str,
    resource: &str,
) -> Result<&'a str, ReconcileError> {
    doc.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ReconcileError::malformed(resource, format!("missing string field '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"a": 1, "b": {"y": 2, "x": [1, 2]}});
        let b = json!({"b": {"x": [1, 2], "y": 2}, "a": 1});
        assert!(documents_match(&a, &b));
        assert_eq!(canonical_json(&a), r#"{"a":1,"b":{"x":[1,2],"y":2}}"#);
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"Events": ["s3:ObjectCreated:*", "s3:ObjectRemoved:*"]});
        let b = json!({"Events": ["s3:ObjectRemoved:*", "s3:ObjectCreated:*"]});
        assert!(!documents_match(&a, &b));
    }

    #[test]
    fn test_projection_ignores_undeclared_fields() {
        let observed = json!({
            "QueueName": "AppQueue",
            "QueueArn": "arn:aws:sqs:us-east-1:123456789012:AppQueue",
            "Attributes": {"VisibilityTimeout": "30", "DelaySeconds": "0"}
        });
        let desired = json!({"QueueName": "AppQueue", "Attributes": {"VisibilityTimeout": "30"}});
        assert!(converged(&observed, &desired));
    }

    #[test]
    fn test_missing_declared_field_is_drift() {
        let observed = json!({"RoleName": "r"});
        let desired = json!({"RoleName": "r", "AssumeRolePolicyDocument": {"Version": "2012-10-17"}});
        assert!(!converged(&observed, &desired));
    }

    #[test]
    fn test_changed_value_is_drift() {
        let observed = json!({"Handler": "bootstrap", "Runtime": "provided.al2"});
        let desired = json!({"Handler": "bootstrap", "Runtime": "provided.al2023"});
        assert!(!converged(&observed, &desired));
    }

    #[test]
    fn test_array_elements_compared_whole() {
        let observed = json!({"Statement": [{"Effect": "Allow", "Sid": "extra"}]});
        let desired = json!({"Statement": [{"Effect": "Allow"}]});
        assert!(!converged(&observed, &desired));
    }

    #[test]
    fn test_required_str() {
        let doc = json!({"QueueUrl": "https://q", "Count": 1});
        assert_eq!(required_str(&doc, "QueueUrl", "queue").unwrap(), "https://q");
        assert!(matches!(
            required_str(&doc, "Count", "queue"),
            Err(ReconcileError::MalformedResponse { .. })
        ));
        assert!(required_str(&doc, "Missing", "queue").is_err());
    }
}

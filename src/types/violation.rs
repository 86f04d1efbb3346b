use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A single rule-record mismatch.
///
/// Created transiently during one `find_violations` pass and handed to the
/// storage collaborator; never mutated after creation. The envelope fields
/// are common to every engine; `violation_data` carries the engine's
/// fixed-shape payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub resource_id: String,
    pub resource_type: String,
    pub rule_name: String,
    pub rule_index: usize,
    pub violation_type: String,
    pub violation_data: Value,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} '{}' (rule {} '{}')",
            self.violation_type,
            self.resource_type,
            self.resource_id,
            self.rule_index,
            self.rule_name,
        )
    }
}

/// Flatten violations into plain field mappings for a scalar-only storage
/// sink.
///
/// Exactly one output row per input violation, every envelope field
/// carried through, and the structured `violation_data` JSON-encoded to a
/// string. No matching or decision logic lives here.
pub fn flatten_violations<'a>(
    violations: impl IntoIterator<Item = &'a Violation> + 'a,
) -> impl Iterator<Item = BTreeMap<String, Value>> + 'a {
    violations.into_iter().map(|violation| {
        let mut row = BTreeMap::new();
        row.insert(
            "resource_id".to_owned(),
            Value::String(violation.resource_id.clone()),
        );
        row.insert(
            "resource_type".to_owned(),
            Value::String(violation.resource_type.clone()),
        );
        row.insert(
            "rule_name".to_owned(),
            Value::String(violation.rule_name.clone()),
        );
        row.insert("rule_index".to_owned(), Value::from(violation.rule_index));
        row.insert(
            "violation_type".to_owned(),
            Value::String(violation.violation_type.clone()),
        );
        row.insert(
            "violation_data".to_owned(),
            Value::String(violation.violation_data.to_string()),
        );
        row
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Violation {
        Violation {
            resource_id: "b1".into(),
            resource_type: "bucket".into(),
            rule_name: "no-public-buckets".into(),
            rule_index: 2,
            violation_type: "ACL_VIOLATION".into(),
            violation_data: json!({"entity": "allUsers"}),
        }
    }

    #[test]
    fn flatten_is_one_to_one() {
        let violations = vec![sample(), sample(), sample()];
        assert_eq!(flatten_violations(&violations).count(), 3);
    }

    #[test]
    fn flatten_carries_every_field() {
        let violations = vec![sample()];
        let row = flatten_violations(&violations).next().unwrap();
        assert_eq!(row["resource_id"], json!("b1"));
        assert_eq!(row["resource_type"], json!("bucket"));
        assert_eq!(row["rule_name"], json!("no-public-buckets"));
        assert_eq!(row["rule_index"], json!(2));
        assert_eq!(row["violation_type"], json!("ACL_VIOLATION"));
    }

    #[test]
    fn flatten_encodes_structured_data_as_string() {
        let violations = vec![sample()];
        let row = flatten_violations(&violations).next().unwrap();
        let encoded = row["violation_data"].as_str().unwrap();
        let decoded: Value = serde_json::from_str(encoded).unwrap();
        assert_eq!(decoded, json!({"entity": "allUsers"}));
    }

    #[test]
    fn flatten_empty_input() {
        assert_eq!(flatten_violations(&[]).count(), 0);
    }

    #[test]
    fn display_names_the_rule() {
        let text = sample().to_string();
        assert!(text.contains("ACL_VIOLATION"));
        assert!(text.contains("no-public-buckets"));
    }
}

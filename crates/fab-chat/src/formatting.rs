//! Rendering controller payloads for the operator

use serde_json::{Map, Value};

use crate::messages::MessageCatalog;

/// Longest object list rendered in full
pub const MAX_LISTED_OBJECTS: usize = 50;
/// Longest raw JSON rendered before truncation
pub const MAX_RAW_CHARS: usize = 4000;

/// `(class, attributes)` for every object in an `imdata` payload
pub fn managed_objects(payload: &Value) -> Option<Vec<(&str, &Map<String, Value>)>> {
    let items = payload.get("imdata")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let (class, body) = item.as_object()?.iter().next()?;
                let attributes = body.get("attributes")?.as_object()?;
                Some((class.as_str(), attributes))
            })
            .collect(),
    )
}

/// A well-formed reply that carries no objects
pub fn is_empty_result(payload: &Value) -> bool {
    match payload.get("imdata").and_then(Value::as_array) {
        Some(items) => items.is_empty(),
        None => payload.get("totalCount").and_then(Value::as_str) == Some("0"),
    }
}

fn label(attributes: &Map<String, Value>) -> Option<&str> {
    ["name", "dn", "rn", "id"]
        .iter()
        .find_map(|k| attributes.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

/// Enumerate managed objects by name, falling back to pretty JSON
pub fn format_payload(messages: &MessageCatalog, payload: &Value) -> String {
    let objects = match managed_objects(payload) {
        Some(objects) if !objects.is_empty() => objects,
        _ => return format_raw(payload),
    };

    let single_class = objects.iter().all(|(class, _)| *class == objects[0].0);
    let mut lines = vec![if single_class {
        messages.found_objects(objects.len(), objects[0].0)
    } else {
        messages.found_mixed(objects.len())
    }];

    for (class, attributes) in objects.iter().take(MAX_LISTED_OBJECTS) {
        let name = label(attributes).unwrap_or(*class);
        if single_class {
            lines.push(format!("- {}", name));
        } else {
            lines.push(format!("- {} ({})", name, class));
        }
    }
    if objects.len() > MAX_LISTED_OBJECTS {
        lines.push(format!("... (+{})", objects.len() - MAX_LISTED_OBJECTS));
    }
    lines.join("\n")
}

/// Pretty JSON, truncated on a char boundary
pub fn format_raw(payload: &Value) -> String {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    if text.chars().count() <= MAX_RAW_CHARS {
        return text;
    }
    let cut: String = text.chars().take(MAX_RAW_CHARS).collect();
    format!("{}\n...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenants() -> Value {
        json!({
            "totalCount": "3",
            "imdata": [
                {"fvTenant": {"attributes": {"name": "common", "dn": "uni/tn-common"}}},
                {"fvTenant": {"attributes": {"name": "infra", "dn": "uni/tn-infra"}}},
                {"fvTenant": {"attributes": {"dn": "uni/tn-mgmt"}}}
            ]
        })
    }

    #[test]
    fn test_lists_names_of_one_class() {
        let text = format_payload(&MessageCatalog::default(), &tenants());
        assert_eq!(text, "Found 3 fvTenant objects:\n- common\n- infra\n- uni/tn-mgmt");
    }

    #[test]
    fn test_mixed_classes_are_tagged() {
        let payload = json!({"imdata": [
            {"fvTenant": {"attributes": {"name": "PROD"}}},
            {"fvBD": {"attributes": {"name": "bd1"}}}
        ]});
        let text = format_payload(&MessageCatalog::default(), &payload);
        assert_eq!(text, "Found 2 objects:\n- PROD (fvTenant)\n- bd1 (fvBD)");
    }

    #[test]
    fn test_empty_detection() {
        assert!(is_empty_result(&json!({"totalCount": "0", "imdata": []})));
        assert!(is_empty_result(&json!({"totalCount": "0"})));
        assert!(!is_empty_result(&tenants()));
        assert!(!is_empty_result(&json!({"status": "ok"})));
    }

    #[test]
    fn test_non_imdata_payload_is_raw_json() {
        let text = format_payload(&MessageCatalog::default(), &json!({"status": "ok"}));
        assert_eq!(text, "{\n  \"status\": \"ok\"\n}");
    }
}

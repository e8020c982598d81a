//! Reading completion output
//!
//! The synthesizer and the completion service return untrusted text. This
//! module pulls endpoint candidates, JSON objects and code snippets out of it
//! and never assumes the text is well formed.

use fab_controller::{ControllerError, ResourcePath};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static API_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/[^\s`]+").expect("api token is a valid regex"));

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][\w-]*)\}|<([A-Za-z_][\w-]*)>").expect("placeholder is a valid regex")
});

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("code fence is a valid regex")
});

/// The JSON shape the structured synthesizer template asks for
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StructuredSuggestion {
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub technical_basis: Option<String>,
    #[serde(default)]
    pub complexity_estimate: Option<String>,
    #[serde(default)]
    pub security_note: Option<String>,
    #[serde(default)]
    pub alternative_endpoints: Vec<String>,
}

/// A path the synthesizer proposed, validated against the resource grammar
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCandidate {
    pub template: String,
    /// Placeholders such as `{tenant}` that still need a value
    pub required_params: Vec<String>,
    /// [`ResourcePath::specificity`] for valid paths, `(0, 0)` otherwise
    pub priority: (u8, usize),
    /// Position in the synthesizer output
    pub order: usize,
    validated: Result<ResourcePath, String>,
}

impl EndpointCandidate {
    pub fn new(template: impl Into<String>, order: usize) -> Self {
        let template = template.into();
        let required_params: Vec<String> = PLACEHOLDER
            .captures_iter(&template)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string())
            .collect();

        let validated = if required_params.is_empty() {
            ResourcePath::parse(&template).map_err(|e| match e {
                ControllerError::InvalidPath { reason, .. } => reason,
                other => other.to_string(),
            })
        } else {
            Err(format!("requires parameters: {}", required_params.join(", ")))
        };
        let priority = validated
            .as_ref()
            .map(ResourcePath::specificity)
            .unwrap_or((0, 0));

        Self {
            template,
            required_params,
            priority,
            order,
            validated,
        }
    }

    pub fn path(&self) -> Option<&ResourcePath> {
        self.validated.as_ref().ok()
    }

    pub fn rejection(&self) -> Option<&str> {
        self.validated.as_ref().err().map(String::as_str)
    }
}

/// Everything the loop needs from one synthesizer answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggestion {
    /// Valid candidates first, most specific first, then rejected ones in order
    pub candidates: Vec<EndpointCandidate>,
    pub structured: Option<StructuredSuggestion>,
}

impl Suggestion {
    pub fn valid(&self) -> impl Iterator<Item = &ResourcePath> {
        self.candidates.iter().filter_map(EndpointCandidate::path)
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&str, &str)> {
        self.candidates
            .iter()
            .filter_map(|c| c.rejection().map(|r| (c.template.as_str(), r)))
    }
}

/// Parse synthesizer output: structured JSON first, free text otherwise
pub fn parse_suggestion(text: &str) -> Suggestion {
    let structured = extract_json_object(text)
        .and_then(|v| serde_json::from_value::<StructuredSuggestion>(v).ok())
        .filter(|s| s.api_endpoint.is_some() || !s.alternative_endpoints.is_empty());

    let raw: Vec<String> = match &structured {
        Some(s) => s
            .api_endpoint
            .iter()
            .chain(s.alternative_endpoints.iter())
            .map(|p| reduce_to_api_path(p.trim()).to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        None => free_text_paths(text),
    };

    let mut seen = Vec::new();
    for path in raw {
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    let mut candidates: Vec<_> = seen
        .into_iter()
        .enumerate()
        .map(|(order, template)| EndpointCandidate::new(template, order))
        .collect();
    rank(&mut candidates);

    Suggestion {
        candidates,
        structured,
    }
}

/// Valid candidates by descending priority, ties keep first-seen order;
/// rejected candidates trail in their original order
pub fn rank(candidates: &mut [EndpointCandidate]) {
    candidates.sort_by(|a, b| {
        b.path()
            .is_some()
            .cmp(&a.path().is_some())
            .then(b.priority.cmp(&a.priority))
            .then(a.order.cmp(&b.order))
    });
}

/// Every `/api/...` token in free text, trailing punctuation removed
pub fn free_text_paths(text: &str) -> Vec<String> {
    API_TOKEN
        .find_iter(text)
        .map(|m| trim_token(m.as_str()).to_string())
        .filter(|t| t.len() > "/api/".len())
        .collect()
}

/// `https://apic.example.com/api/class/fvBD.json` -> `/api/class/fvBD.json`
pub fn reduce_to_api_path(s: &str) -> &str {
    let s = s.trim_matches(|c: char| c == '`' || c == '"' || c == '\'');
    if s.starts_with("/api/") {
        return trim_token(s);
    }
    match s.find("/api/") {
        Some(idx) if s.starts_with("http://") || s.starts_with("https://") => trim_token(&s[idx..]),
        _ => s,
    }
}

fn trim_token(token: &str) -> &str {
    let mut t = token;
    loop {
        let before = t.len();
        t = t.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\'', '*']);
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')] {
            if t.ends_with(close) && t.matches(open).count() < t.matches(close).count() {
                t = &t[..t.len() - close.len_utf8()];
            }
        }
        if t.len() == before {
            return t;
        }
    }
}

/// First JSON object embedded anywhere in the text
pub fn extract_json_object(text: &str) -> Option<Value> {
    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = stream.next() {
            return Some(value);
        }
    }
    None
}

/// Code from the first fenced block, or the whole reply when unfenced
pub fn extract_code(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(code) => code.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_free_text_with_punctuation() {
        let s = parse_suggestion("You can use `/api/class/fvTenant.json`.");
        let valid: Vec<_> = s.valid().map(|p| p.as_str().to_string()).collect();
        assert_eq!(valid, vec!["/api/class/fvTenant.json"]);
        assert!(s.structured.is_none());

        let paths = free_text_paths("See [docs](/api/class/fvBD.json), or **/api/mo/uni/tn-PROD.json**.");
        assert_eq!(paths, vec!["/api/class/fvBD.json", "/api/mo/uni/tn-PROD.json"]);
    }

    #[test]
    fn test_query_filters_survive_trimming() {
        let paths = free_text_paths(
            r#"Use /api/class/fvCtx.json?query-target-filter=eq(fvCtx.name,"VRF_700")."#,
        );
        assert_eq!(
            paths,
            vec![r#"/api/class/fvCtx.json?query-target-filter=eq(fvCtx.name,"VRF_700")"#]
        );
    }

    #[test]
    fn test_full_urls_are_reduced() {
        assert_eq!(
            reduce_to_api_path("https://10.0.0.1/api/node/class/fvBD.json"),
            "/api/node/class/fvBD.json"
        );
        assert_eq!(reduce_to_api_path("fvTenant"), "fvTenant");
        let s = parse_suggestion("GET https://apic.lab/api/class/fabricNode.json");
        assert_eq!(s.valid().next().unwrap().as_str(), "/api/class/fabricNode.json");
    }

    #[test]
    fn test_structured_output_with_alternatives() {
        let text = r#"```json
{"api_endpoint": "/api/class/fvBD.json",
 "technical_basis": "fvBD is the bridge domain class",
 "complexity_estimate": "low",
 "security_note": "read only",
 "alternative_endpoints": ["/api/mo/uni/tn-PROD.json?query-target=children&target-subtree-class=fvBD", "/api/class/fvBD.json"]}
```"#;
        let s = parse_suggestion(text);
        let structured = s.structured.as_ref().unwrap();
        assert_eq!(structured.complexity_estimate.as_deref(), Some("low"));

        let valid: Vec<_> = s.valid().map(|p| p.as_str().to_string()).collect();
        assert_eq!(
            valid,
            vec![
                "/api/mo/uni/tn-PROD.json?query-target=children&target-subtree-class=fvBD",
                "/api/class/fvBD.json",
            ]
        );
    }

    #[test]
    fn test_malformed_structured_falls_back_to_free_text() {
        let s = parse_suggestion(r#"{"api_endpoint": "/api/class/fvAp.json", "alternative_endpoints": [{"path": 1}]"#);
        assert!(s.structured.is_none());
        assert_eq!(s.valid().next().unwrap().as_str(), "/api/class/fvAp.json");
    }

    #[test]
    fn test_rejected_candidates_carry_reasons() {
        let s = parse_suggestion("Try /api/tenants or /api/mo/uni/tn-{tenant}.json");
        assert_eq!(s.valid().count(), 0);
        let rejected: Vec<_> = s.rejected().collect();
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].0, "/api/tenants");
        assert_eq!(rejected[1].1, "requires parameters: tenant");
        assert_eq!(s.candidates[1].required_params, vec!["tenant"]);
    }

    #[test]
    fn test_ranking_prefers_instance_then_first_seen() {
        let s = parse_suggestion(
            "/api/class/fvTenant.json /api/class/fvBD.json /api/mo/uni/tn-common.json /api/bogus",
        );
        let order: Vec<_> = s.candidates.iter().map(|c| c.template.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "/api/mo/uni/tn-common.json",
                "/api/class/fvTenant.json",
                "/api/class/fvBD.json",
                "/api/bogus",
            ]
        );
    }

    #[test]
    fn test_extract_json_object() {
        let v = extract_json_object(r#"create tenant {"fvTenant": {"attributes": {"name": "X"}}} please"#);
        assert_eq!(v, Some(json!({"fvTenant": {"attributes": {"name": "X"}}})));
        assert_eq!(extract_json_object("no json { here"), None);
        assert_eq!(extract_json_object("[1, 2]"), None);
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(extract_code("```python\nresult = len(data)\n```"), "result = len(data)");
        assert_eq!(extract_code("  print(1)  "), "print(1)");
    }
}

//! Resource path grammar
//!
//! A resource path addresses a class of managed objects or one object
//! instance on the controller:
//!
//! | Form | Example |
//! |------|---------|
//! | Class query | `/api/class/fvTenant.json` |
//! | Node class query | `/api/node/class/fvBD.json?query-target-filter=...` |
//! | Object query | `/api/mo/uni/tn-PROD.json` |
//! | Node object query | `/api/node/mo/uni/tn-PROD.json?query-target=children` |
//!
//! Every accepted path matches `^/api/[A-Za-z0-9/_.-]+\.json(\?.*)?$`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::ControllerError;

static PATH_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/api/[A-Za-z0-9/_.-]+\.json(\?.*)?$").expect("path grammar is a valid regex")
});

/// Managed-object class names: lowercase package prefix then CamelCase (`fvTenant`, `l3extOut`)
static CLASS_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*[A-Z][A-Za-z0-9]*$").expect("class name is a valid regex")
});

/// Session endpoints that must never be reached through resource tools
const RESERVED_CLASSES: &[&str] = &["aaaLogin", "aaaLogout", "aaaRefresh"];

/// What a resource path addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    /// Every object of a class
    Class(String),
    /// One object by distinguished name
    Object(String),
}

/// A grammar-checked resource path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    raw: String,
    scope: ResourceScope,
    query: Option<String>,
}

impl ResourcePath {
    /// Check the raw grammar only
    pub fn matches_grammar(raw: &str) -> bool {
        PATH_GRAMMAR.is_match(raw)
    }

    /// Parse and validate a path: grammar first, then a known resource scope
    pub fn parse(raw: &str) -> Result<Self, ControllerError> {
        let raw = raw.trim();
        if !raw.starts_with("/api/") {
            return Err(ControllerError::invalid_path(raw, "must begin with /api/"));
        }
        if !Self::matches_grammar(raw) {
            return Err(ControllerError::invalid_path(
                raw,
                "must match /api/<segments>.json with an optional query string",
            ));
        }

        let (body, query) = match raw.split_once('?') {
            Some((body, query)) => (body, Some(query.to_string())),
            None => (raw, None),
        };
        let body = body.trim_start_matches("/api/").trim_end_matches(".json");
        let body = body.strip_prefix("node/").unwrap_or(body);

        if body.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(ControllerError::invalid_path(raw, "contains an empty or relative segment"));
        }

        let scope = if let Some(class) = body.strip_prefix("class/") {
            if class.contains('/') {
                return Err(ControllerError::invalid_path(
                    raw,
                    "class queries take exactly one class name",
                ));
            }
            if !CLASS_NAME.is_match(class) {
                return Err(ControllerError::invalid_path(
                    raw,
                    format!("'{}' is not a managed-object class name", class),
                ));
            }
            if RESERVED_CLASSES.contains(&class) {
                return Err(ControllerError::invalid_path(raw, "session endpoints are not resources"));
            }
            ResourceScope::Class(class.to_string())
        } else if let Some(dn) = body.strip_prefix("mo/") {
            ResourceScope::Object(dn.to_string())
        } else {
            return Err(ControllerError::invalid_path(
                raw,
                "must address /api/class/<class> or /api/mo/<dn>",
            ));
        };

        Ok(Self {
            raw: raw.to_string(),
            scope,
            query,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.scope, ResourceScope::Object(_))
    }

    /// Ordering key: object queries beat class-wide ones, then more query filters win
    pub fn specificity(&self) -> (u8, usize) {
        let scope_rank = match self.scope {
            ResourceScope::Object(_) => 2,
            ResourceScope::Class(_) => 1,
        };
        let filters = self
            .query
            .as_deref()
            .map(|q| q.split('&').filter(|p| !p.is_empty()).count())
            .unwrap_or(0);
        (scope_rank, filters)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

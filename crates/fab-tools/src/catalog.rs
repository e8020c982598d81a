//! Named endpoint catalog
//!
//! A static table of human names to resource paths, e.g.
//! `"List all tenants" -> /api/class/fvTenant.json`. Lookup is deterministic:
//!
//! 1. exact match on the normalized name
//! 2. otherwise the best Levenshtein similarity `1 - d / max_len` over
//!    normalized names, if it reaches the threshold
//!
//! Ties go to the entry defined first.
//!
//! The on-disk format is a JSON array of `{"Name": "...", "URL": "..."}`.

use anyhow::{Context, Result};
use fab_controller::ResourcePath;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// One catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "URL")]
    pub path: String,
}

/// A lookup hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMatch {
    pub name: String,
    pub path: String,
    pub score: f64,
}

const BUILTIN: &[(&str, &str)] = &[
    ("tenants", "/api/class/fvTenant.json"),
    ("bridge domains", "/api/class/fvBD.json"),
    ("vrfs", "/api/class/fvCtx.json"),
    ("application profiles", "/api/class/fvAp.json"),
    ("endpoint groups", "/api/class/fvAEPg.json"),
    ("contracts", "/api/class/vzBrCP.json"),
    ("filters", "/api/class/vzFilter.json"),
    ("subnets", "/api/class/fvSubnet.json"),
    ("l3 outs", "/api/class/l3extOut.json"),
    ("fabric nodes", "/api/class/fabricNode.json"),
    ("faults", "/api/class/faultInst.json"),
    ("physical interfaces", "/api/class/l1PhysIf.json"),
    ("vlan pools", "/api/class/fvnsVlanInstP.json"),
    ("physical domains", "/api/class/physDomP.json"),
    ("endpoints", "/api/class/fvCEp.json"),
];

#[derive(Debug, Clone)]
struct CatalogRow {
    entry: EndpointEntry,
    normalized: String,
}

#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    rows: Vec<CatalogRow>,
    threshold: f64,
}

impl EndpointCatalog {
    /// Build from entries; every path must satisfy the resource grammar
    pub fn from_entries(entries: Vec<EndpointEntry>, threshold: f64) -> Result<Self> {
        let rows = entries
            .into_iter()
            .map(|entry| {
                ResourcePath::parse(&entry.path)
                    .with_context(|| format!("catalog entry '{}' has an invalid path", entry.name))?;
                Ok(CatalogRow {
                    normalized: normalize(&entry.name),
                    entry,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows, threshold })
    }

    /// The common object classes
    pub fn builtin(threshold: f64) -> Self {
        let rows = BUILTIN
            .iter()
            .map(|(name, path)| CatalogRow {
                normalized: normalize(name),
                entry: EndpointEntry {
                    name: name.to_string(),
                    path: path.to_string(),
                },
            })
            .collect();
        Self { rows, threshold }
    }

    pub fn from_json_file(path: impl AsRef<Path>, threshold: f64) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read endpoint catalog {}", path.display()))?;
        let entries: Vec<EndpointEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse endpoint catalog {}", path.display()))?;
        let catalog = Self::from_entries(entries, threshold)?;
        info!("Loaded {} catalog endpoints from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn lookup(&self, name: &str) -> Option<EndpointMatch> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }

        if let Some(row) = self.rows.iter().find(|r| r.normalized == wanted) {
            return Some(row.to_match(1.0));
        }

        let mut best: Option<(&CatalogRow, f64)> = None;
        for row in &self.rows {
            let score = similarity(&wanted, &row.normalized);
            // Strictly greater keeps the first-defined entry on ties
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((row, score));
            }
        }

        let (row, score) = best?;
        if score >= self.threshold {
            debug!("Catalog match '{}' -> {} ({:.2})", name, row.entry.path, score);
            Some(row.to_match(score))
        } else {
            None
        }
    }
}

impl CatalogRow {
    fn to_match(&self, score: f64) -> EndpointMatch {
        EndpointMatch {
            name: self.entry.name.clone(),
            path: self.entry.path.clone(),
            score,
        }
    }
}

/// Lowercase, alphanumerics only, single spaces
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `1 - d / max_len`, 1.0 for two empty strings
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Two rolling rows instead of the full matrix
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1) // deletion
                .min(curr[j] + 1) // insertion
                .min(prev[j] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

//! Roadmap table parsing.
//!
//! The roadmap is a markdown table, one feature per row:
//!
//! ```text
//! | id | Feature | Source | Jira | Complexity | Deps | Status |
//! ```
//!
//! Status is a glyph: ✅ completed, ⬜ pending. Rows with any other status
//! (in progress, paused, failed) are parsed but never scheduled.

use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::Regex;

use crate::core::types::{Feature, FeatureStatus};

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|\s*(\d+)\s*\|").expect("valid roadmap row regex"))
}

/// Parse roadmap text into features, in declaration order.
///
/// Non-table lines and malformed rows are ignored. Duplicate feature names
/// are an error because the name is the identity used for resume bookkeeping.
pub fn parse_roadmap(text: &str) -> Result<Vec<Feature>> {
    let mut features = Vec::new();

    for line in text.lines() {
        if !row_re().is_match(line) {
            continue;
        }
        let cols: Vec<&str> = line.split('|').map(str::trim).collect();
        // Split yields ["", id, name, source, jira, complexity, deps, status, ""].
        if cols.len() < 9 {
            continue;
        }
        let Ok(id) = cols[1].parse::<u32>() else {
            continue;
        };
        features.push(Feature {
            id,
            name: cols[2].to_string(),
            source: cols[3].to_string(),
            complexity: cols[5].to_string(),
            dependency_ids: parse_deps(cols[6]),
            status: parse_status(cols[7]),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for feature in &features {
        if !seen.insert(feature.name.as_str()) {
            bail!("duplicate feature name in roadmap: '{}'", feature.name);
        }
    }

    Ok(features)
}

fn parse_deps(raw: &str) -> Vec<u32> {
    if raw.is_empty() || raw == "-" {
        return Vec::new();
    }
    raw.split(',')
        .filter_map(|part| {
            let digits: String = part.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect()
}

fn parse_status(raw: &str) -> FeatureStatus {
    if raw.contains('\u{2705}') {
        FeatureStatus::Completed
    } else if raw.contains('\u{2b1c}') {
        FeatureStatus::Pending
    } else {
        FeatureStatus::Skipped
    }
}

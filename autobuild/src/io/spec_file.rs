//! Feature spec files and their frontmatter contract.
//!
//! Every feature spec must open with a YAML frontmatter block declaring at
//! least `feature:` and `domain:`. Validation runs before any agent is
//! invoked so a malformed spec fails fast instead of burning an invocation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Lines scanned for the closing `---` before giving up.
const FRONTMATTER_SCAN_LINES: usize = 20;

const REQUIRED_FIELDS: [&str; 2] = ["feature", "domain"];

/// Check a spec's frontmatter block.
///
/// Requires an opening `---` on the first line, a closing `---` within the
/// first [`FRONTMATTER_SCAN_LINES`] lines, and the required fields between
/// them. Returns the list of problems, empty when valid.
pub fn frontmatter_problems(contents: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let lines: Vec<&str> = contents.lines().collect();

    if lines.first().map(|line| line.trim()) != Some("---") {
        problems.push("missing opening '---' on first line".to_string());
        return problems;
    }

    let close = lines
        .iter()
        .take(FRONTMATTER_SCAN_LINES)
        .skip(1)
        .position(|line| line.trim() == "---");
    let Some(close) = close else {
        problems.push(format!(
            "no closing '---' within first {FRONTMATTER_SCAN_LINES} lines"
        ));
        return problems;
    };

    let block = &lines[1..=close];
    for field in REQUIRED_FIELDS {
        let present = block.iter().any(|line| {
            line.trim_start()
                .strip_prefix(field)
                .and_then(|rest| rest.trim_start().strip_prefix(':'))
                .is_some_and(|value| !value.trim().is_empty())
        });
        if !present {
            problems.push(format!("missing required frontmatter field '{field}'"));
        }
    }
    problems
}

/// Read and validate a spec file, returning its contents.
pub fn read_validated_spec(path: &Path) -> Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read spec {}", path.display()))?;
    let problems = frontmatter_problems(&contents);
    if !problems.is_empty() {
        bail!("invalid spec {}: {}", path.display(), problems.join("; "));
    }
    debug!(path = %path.display(), "spec frontmatter valid");
    Ok(contents)
}

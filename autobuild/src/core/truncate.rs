//! Context-budget truncation of oversized specification documents.
//!
//! Token counts are estimated with a fixed characters-per-token ratio. When a
//! document exceeds its budget, prose is dropped first: the YAML front-matter
//! block, markdown headings, bold lines, and Gherkin scenario lines survive in
//! original order. If the structural skeleton alone still exceeds the budget,
//! lines are dropped from the end, never from the front matter.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Estimation ratio: 4 characters ≈ 1 token.
const CHARS_PER_TOKEN: usize = 4;

fn scenario_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(Feature|Scenario|Given|When|Then|And|But|Background|Rule)[:\s]")
            .expect("valid scenario regex")
    })
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s").expect("valid heading regex"))
}

pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

/// Reduce `document` to roughly `max_tokens`, preserving structure.
///
/// Documents already within budget are returned unchanged.
pub fn truncate_for_context(document: &str, max_tokens: usize) -> String {
    if estimate_tokens(document) <= max_tokens {
        return document.to_string();
    }

    warn!(
        estimated_tokens = estimate_tokens(document),
        max_tokens, "document over context budget, dropping prose"
    );

    let kept = structural_lines(document);
    let mut total_chars: usize = kept.iter().map(|line| line.text.len() + 1).sum();
    let budget_chars = max_tokens * CHARS_PER_TOKEN;

    let mut kept = kept;
    while total_chars > budget_chars {
        // Front matter is never sacrificed, even over budget.
        let Some(last) = kept.last() else { break };
        if last.front_matter {
            break;
        }
        total_chars -= last.text.len() + 1;
        kept.pop();
    }

    kept.into_iter()
        .map(|line| line.text)
        .collect::<Vec<_>>()
        .join("\n")
}

struct KeptLine {
    text: String,
    front_matter: bool,
}

fn structural_lines(document: &str) -> Vec<KeptLine> {
    let mut kept = Vec::new();
    let mut in_front_matter = false;
    let mut markers_seen = 0;

    for line in document.lines() {
        if line.trim_end() == "---" && markers_seen < 2 {
            markers_seen += 1;
            in_front_matter = markers_seen == 1;
            kept.push(KeptLine {
                text: line.to_string(),
                front_matter: true,
            });
            continue;
        }
        if in_front_matter {
            kept.push(KeptLine {
                text: line.to_string(),
                front_matter: true,
            });
            continue;
        }
        if heading_re().is_match(line)
            || scenario_re().is_match(line)
            || line.starts_with("**")
        {
            kept.push(KeptLine {
                text: line.to_string(),
                front_matter: false,
            });
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> String {
        let mut doc = String::from("---\nfeature: checkout\ndomain: payments\n---\n");
        for i in 0..200 {
            doc.push_str(&format!("prose line {i} with plenty of filler text\n"));
        }
        for i in 0..10 {
            doc.push_str(&format!("Scenario: path {i}\n"));
            doc.push_str(&format!("  Given precondition {i}\n"));
        }
        doc
    }

    #[test]
    fn within_budget_is_unchanged() {
        let doc = "---\nfeature: x\n---\nshort body\n";
        assert_eq!(truncate_for_context(doc, 1_000), doc);
    }

    #[test]
    fn over_budget_keeps_front_matter_and_scenarios_drops_prose() {
        let doc = sample_document();
        let out = truncate_for_context(&doc, estimate_tokens(&doc) / 2);

        assert!(out.starts_with("---\nfeature: checkout"));
        for i in 0..10 {
            assert!(out.contains(&format!("Scenario: path {i}")), "scenario {i} kept");
        }
        assert!(!out.contains("prose line"));
    }

    #[test]
    fn retained_lines_keep_original_order() {
        let doc = sample_document();
        let out = truncate_for_context(&doc, estimate_tokens(&doc) / 2);
        let first = out.find("Scenario: path 0").expect("first scenario");
        let last = out.find("Scenario: path 9").expect("last scenario");
        assert!(first < last);
    }

    #[test]
    fn tight_budget_truncates_tail_but_never_front_matter() {
        let doc = sample_document();
        // Budget smaller than the structural skeleton itself.
        let out = truncate_for_context(&doc, 15);
        assert!(out.starts_with("---\nfeature: checkout"));
        assert!(out.contains("domain: payments"));
        assert!(!out.contains("Scenario: path 9"));
    }

    #[test]
    fn headings_and_bold_lines_survive() {
        let mut doc = String::from("# Title\n**key point**\n");
        for _ in 0..2000 {
            doc.push_str("filler prose\n");
        }
        let out = truncate_for_context(&doc, 100);
        assert!(out.contains("# Title"));
        assert!(out.contains("**key point**"));
    }
}

//! Flat-line signal protocol.
//!
//! Structured outcomes cross the agent boundary as bare `NAME: value` lines
//! embedded in free text. This is deliberately the only structured format
//! accepted on that channel: when upstream output degrades, extraction fails
//! visibly here instead of corrupting a nested parse somewhere else.

/// Render one signal line for inclusion in agent-observable output.
pub fn format_signal(name: &str, value: &str) -> String {
    format!("{name}: {value}")
}

/// Extract the value of the last `NAME: value` line in `text`.
///
/// Agents may correct themselves mid-output, so the last occurrence is
/// authoritative. Returns `None` when the signal never appears.
pub fn parse_signal(name: &str, text: &str) -> Option<String> {
    let prefix = format!("{name}:");
    let mut value = None;
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix(&prefix) {
            value = Some(rest.trim().to_string());
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_occurrence_wins() {
        let text = "working...\nEVAL_COMPLETE: true\nactually no\nEVAL_COMPLETE: false\n";
        assert_eq!(parse_signal("EVAL_COMPLETE", text).as_deref(), Some("false"));
    }

    #[test]
    fn absent_signal_is_none() {
        assert_eq!(parse_signal("NEVER_EMITTED", "plain text\n"), None);
    }

    #[test]
    fn leading_whitespace_and_padding_are_tolerated() {
        let text = "  DRIFT_DETECTED:   true  \n";
        assert_eq!(parse_signal("DRIFT_DETECTED", text).as_deref(), Some("true"));
    }

    #[test]
    fn name_must_match_exactly_at_line_start() {
        let text = "NOT_DRIFT_DETECTED: true\n";
        assert_eq!(parse_signal("DRIFT_DETECTED", text), None);
    }

    #[test]
    fn format_round_trips_through_parse() {
        let line = format_signal("IMPLEMENTATION_COMPLETE", "true");
        assert_eq!(
            parse_signal("IMPLEMENTATION_COMPLETE", &line).as_deref(),
            Some("true")
        );
    }
}

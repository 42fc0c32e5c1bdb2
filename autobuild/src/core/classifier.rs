//! Deterministic classification of agent invocation results.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::types::{AgentInvocation, Outcome};

/// Markers that indicate a retryable failure: rate limiting, credit
/// exhaustion, or provider overload.
fn transient_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|429|too many requests|overloaded|capacity|credit")
            .expect("valid transient-failure regex")
    })
}

/// Classify one invocation into a retry decision.
///
/// Timeout takes precedence over the exit code because a killed child reports
/// an arbitrary status. A non-zero exit is transient only when the output
/// carries a known transient marker; everything else is fatal.
pub fn classify(invocation: &AgentInvocation) -> Outcome {
    if invocation.timed_out {
        return Outcome::Timeout;
    }
    match invocation.exit_code {
        Some(0) => Outcome::Success,
        code => {
            if let Some(found) = transient_re().find(&invocation.raw_output) {
                Outcome::TransientFailure(found.as_str().to_string())
            } else {
                Outcome::FatalFailure(match code {
                    Some(n) => format!("agent exited with code {n}"),
                    None => "agent killed by signal".to_string(),
                })
            }
        }
    }
}

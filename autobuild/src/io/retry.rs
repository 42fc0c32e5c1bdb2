//! Retry with exponential backoff around agent invocations.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

use crate::core::backoff::backoff_delay;
use crate::core::classifier::classify;
use crate::core::types::{AgentInvocation, Outcome};
use crate::errors::OrchestratorError;
use crate::io::agent::{Agent, InvokeRequest};

/// Bounds for the retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

/// Final result of an invocation that may have been retried.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub invocation: AgentInvocation,
    pub outcome: Outcome,
    /// Total attempts made, including the first.
    pub attempts: u32,
}

/// Invoke the agent, retrying transient failures with capped, jittered
/// exponential backoff.
///
/// `Success` and `FatalFailure` return immediately. A `TransientFailure` or
/// `Timeout` sleeps `base * 2^attempt` (capped, plus jitter to spread load on
/// a shared rate limit) and retries, at most `max_retries` times. Exhaustion
/// is an [`OrchestratorError::RetriesExhausted`]: the caller must persist
/// state and stop rather than loop.
pub fn invoke_with_backoff<A: Agent>(
    agent: &A,
    request: &InvokeRequest,
    policy: &RetryPolicy,
) -> Result<InvocationReport> {
    let mut last_reason = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = jittered(backoff_delay(attempt - 1, policy.backoff_base, policy.backoff_cap));
            warn!(
                attempt,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                reason = %last_reason,
                "transient agent failure, backing off before retry"
            );
            thread::sleep(delay);
        }

        let invocation = agent.invoke(request)?;
        let outcome = classify(&invocation);

        match &outcome {
            Outcome::Success | Outcome::FatalFailure(_) => {
                info!(attempts = attempt + 1, outcome = ?outcome, "agent invocation settled");
                return Ok(InvocationReport {
                    invocation,
                    outcome,
                    attempts: attempt + 1,
                });
            }
            Outcome::TransientFailure(reason) => {
                last_reason = reason.clone();
            }
            Outcome::Timeout => {
                last_reason = format!("timeout after {}s", request.timeout.as_secs());
            }
        }
    }

    Err(OrchestratorError::RetriesExhausted {
        attempts: policy.max_retries + 1,
        reason: last_reason,
    }
    .into())
}

/// Add up to 25% random jitter so parallel clients do not retry in lockstep.
fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=millis / 4);
    delay + Duration::from_millis(jitter)
}

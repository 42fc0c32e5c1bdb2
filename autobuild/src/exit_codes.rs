//! Stable exit codes for autobuild CLI commands.

/// Run completed (or resumed to completion).
pub const OK: i32 = 0;
/// Generic failure: bad layout/config/roadmap or an unexpected error.
pub const FAILURE: i32 = 1;
/// Circular dependency detected; precondition failure, no work attempted.
pub const CIRCULAR_DEPENDENCY: i32 = 2;
/// The lock is held by a live process.
pub const LOCK_HELD: i32 = 3;
/// The run halted on an agent failure; state was persisted and a later
/// invocation resumes from the failed feature.
pub const HALTED_FOR_RETRY: i32 = 4;
/// All features built, but the drift validation pass found mismatches.
pub const DRIFT_DETECTED: i32 = 5;

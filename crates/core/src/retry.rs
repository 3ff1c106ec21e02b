//! The retry contract stamped onto every lowered statement.
//!
//! The transport owns the retry policy; the core only decides what is safe
//! to replay. Reads always are. Writes are idempotent unless they mutate
//! counters, push onto lists, or are raw CQL the engine cannot see into —
//! or unless the caller said otherwise, which always wins. Non-idempotent
//! statements forbid retry on write-timeout and speculative execution
//! downstream.

use crate::cql::StatementKind;
use crate::statement::clause::Assignment;

/// Infers whether a set of update assignments replays safely.
pub(crate) fn infer_assignments(assignments: &[Assignment]) -> bool {
    assignments.iter().all(Assignment::is_idempotent)
}

/// Final idempotence of one physical statement: reads are always
/// retryable; writes take the explicit override when present, the
/// inference otherwise.
pub(crate) fn resolve_idempotence(kind: StatementKind, explicit: Option<bool>, inferred: bool) -> bool {
    if kind.is_read() {
        return true;
    }
    explicit.unwrap_or(inferred)
}

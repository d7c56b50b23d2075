// ============================================================================
// spark-signals - Error Types
// ============================================================================

use thiserror::Error;

/// Errors surfaced by the reactive graph's fallible entry points.
///
/// Panics remain the default for programmer-error conditions the graph can't
/// recover from mid-update (an effect or derived panicking, a teardown
/// panicking); `ReactiveError` is for conditions a caller can reasonably
/// check for and route around, such as attempting a forbidden write.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ReactiveError {
    /// A write was attempted to a signal while a derived's computation
    /// function was running on the call stack.
    ///
    /// Deriveds must be pure: reading signals is fine, writing them is not,
    /// since the write's effects would depend on how many times (and in what
    /// order) the derived happens to be recomputed.
    #[error("cannot write to a signal from inside a derived's computation")]
    UnsafeMutation,
}

//! Failure classification shared by the retry and circuit breaker policies.

/// Classifies an operation error as transient or permanent.
///
/// Transient errors (connection failures, timeouts, server-side faults) are
/// retried and counted by circuit breakers. Permanent errors are surfaced
/// immediately and never touch breaker accounting.
pub trait Classify {
    /// Returns `true` when repeating the operation might succeed.
    fn is_transient(&self) -> bool;
}

impl<T: Classify + ?Sized> Classify for &T {
    fn is_transient(&self) -> bool {
        (**self).is_transient()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn is_transient(&self) -> bool {
        (**self).is_transient()
    }
}

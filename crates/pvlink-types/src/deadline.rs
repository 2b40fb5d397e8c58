//! Monotonic absolute-time guard for polling components.
//!
//! A [`Deadline`] is computed once, at the start of an operation, from a
//! relative timeout. Elapsed wall-clock time then advances monotonically
//! regardless of how often (or rarely) the owner polls; the scheduler,
//! not this type, decides the polling cadence.

use std::time::{Duration, Instant};

/// Absolute instant after which a pending operation is timed out.
///
/// The unbounded deadline is a distinct representation, not a sentinel
/// instant; it never expires.
///
/// # Example
///
/// ```
/// use pvlink_types::Deadline;
/// use std::time::Duration;
///
/// let d = Deadline::after(Duration::from_millis(10));
/// assert!(!d.is_expired());
/// std::thread::sleep(Duration::from_millis(20));
/// assert!(d.is_expired());
///
/// assert!(!Deadline::unbounded().is_expired());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline expiring `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// A deadline that never expires.
    #[must_use]
    pub fn unbounded() -> Self {
        Self { expires_at: None }
    }

    /// Returns `true` once the deadline has passed. Unbounded deadlines
    /// never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// The absolute expiry instant; `None` when unbounded.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Time left until expiry, saturating at zero. `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_timeout() {
        let d = Deadline::after(Duration::from_millis(20));
        assert!(!d.is_expired());
        assert!(d.remaining().is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(d.is_expired());
        assert_eq!(d.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.is_expired());
    }

    #[test]
    fn unbounded_never_expires() {
        let d = Deadline::unbounded();
        assert!(!d.is_expired());
        assert!(d.expires_at().is_none());
        assert!(d.remaining().is_none());
    }

    #[test]
    fn unbounded_is_distinct_from_any_bounded() {
        // Not a sentinel: a bounded deadline always carries an instant.
        assert_ne!(Deadline::unbounded(), Deadline::after(Duration::ZERO));
    }
}

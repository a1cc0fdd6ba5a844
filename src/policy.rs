// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The static, hard-ceiling policy [`DynamicThrottle`](crate::DynamicThrottle)
//! consults before applying its own window.

/// A pending-count ceiling consulted by the admission gate before the dynamic
/// window is applied.
///
/// `DynamicThrottle` composes with one of these rather than implementing a
/// hard cap itself: the dynamic window is a *target*, but some deployments
/// also want an absolute ceiling that never moves regardless of what the
/// controller learns. [`MaxPendingCountPolicy`] is the ceiling-only
/// implementation this crate ships; callers with more involved static
/// policies (e.g. one shared across several throttles) can supply their own.
pub trait StaticThrottlePolicy {
    /// Returns whether a new send is permitted given the current pending
    /// count, independent of the dynamic window.
    fn can_send(&self, pending_count: u64) -> bool;

    /// Tightens (or loosens) the hard ceiling.
    fn set_max_pending_count(&mut self, max_pending_count: u64);
}

/// A [`StaticThrottlePolicy`] that admits any send below a fixed ceiling.
#[derive(Clone, Copy, Debug)]
pub struct MaxPendingCountPolicy {
    max_pending_count: u64,
}

impl MaxPendingCountPolicy {
    /// Creates a policy with no effective ceiling.
    pub fn unbounded() -> Self {
        Self {
            max_pending_count: u64::MAX,
        }
    }

    /// Creates a policy with the given ceiling.
    pub fn new(max_pending_count: u64) -> Self {
        Self { max_pending_count }
    }

    /// Returns the current ceiling.
    pub fn max_pending_count(&self) -> u64 {
        self.max_pending_count
    }
}

impl Default for MaxPendingCountPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl StaticThrottlePolicy for MaxPendingCountPolicy {
    fn can_send(&self, pending_count: u64) -> bool {
        pending_count < self.max_pending_count
    }

    fn set_max_pending_count(&mut self, max_pending_count: u64) {
        self.max_pending_count = max_pending_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_at_ceiling() {
        let policy = MaxPendingCountPolicy::new(10);
        assert!(policy.can_send(9));
        assert!(!policy.can_send(10));
        assert!(!policy.can_send(11));
    }

    #[test]
    fn unbounded_admits_large_counts() {
        let policy = MaxPendingCountPolicy::unbounded();
        assert!(policy.can_send(u64::MAX - 1));
    }

    #[test]
    fn set_max_pending_count_tightens_ceiling() {
        let mut policy = MaxPendingCountPolicy::unbounded();
        policy.set_max_pending_count(3);
        assert!(policy.can_send(2));
        assert!(!policy.can_send(3));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded retry with exponential backoff.

use std::time::Duration;

use diagram_core::CompileQueueItem;

/// How failed batches are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a batch is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// What to do with a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    DeadLetter,
}

impl RetryPolicy {
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decision for a batch whose most-retried item has failed `attempts`
    /// times before this failure.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts + 1 >= self.max_attempts {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::Retry {
                delay: self.backoff(attempts),
            }
        }
    }

    /// Decision for a failed batch of `items`.
    pub fn decide_for(&self, items: &[CompileQueueItem]) -> RetryDecision {
        let attempts = items.iter().map(|i| i.attempts).max().unwrap_or(0);
        self.decide(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(3), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn dead_letters_once_budget_is_spent() {
        let p = policy();
        assert_eq!(
            p.decide(0),
            RetryDecision::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert!(matches!(p.decide(2), RetryDecision::Retry { .. }));
        assert_eq!(p.decide(3), RetryDecision::DeadLetter);
    }

    #[test]
    fn batch_uses_most_retried_item() {
        let mut items = vec![CompileQueueItem::new(1, 1), CompileQueueItem::new(2, 2)];
        items[1].attempts = 3;
        assert_eq!(policy().decide_for(&items), RetryDecision::DeadLetter);
    }
}

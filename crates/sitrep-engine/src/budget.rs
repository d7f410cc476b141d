//! Explicit attention budget.
//!
//! Association search and active sensing are the two compute-heavy
//! activities; both draw from this budget and stop when it runs out. The
//! budget refills on a declared cadence, so a pathological batch degrades
//! into deferred work rather than unbounded processing.

use sitrep_core::Tick;

use crate::config::AttentionConfig;

/// Per-tick compute/sensing allowance.
#[derive(Debug, Clone)]
pub struct AttentionBudget {
    config: AttentionConfig,
    association_units: u32,
    sense_requests: u32,
    last_refill: Option<Tick>,
}

impl AttentionBudget {
    /// Creates a budget starting at full capacity.
    #[must_use]
    pub fn new(config: AttentionConfig) -> Self {
        let association_units = config.association_units;
        let sense_requests = config.sense_requests;
        Self {
            config,
            association_units,
            sense_requests,
            last_refill: None,
        }
    }

    /// Refills both counters when the refill interval has elapsed.
    pub fn refill_if_due(&mut self, now: Tick) {
        let due = match self.last_refill {
            None => true,
            Some(last) => now.ticks_since(last) >= self.config.refill_interval_ticks,
        };
        if due {
            self.association_units = self.config.association_units;
            self.sense_requests = self.config.sense_requests;
            self.last_refill = Some(now);
        }
    }

    /// Attempts to spend `units` of association search; false means the
    /// caller must defer the remaining work.
    pub fn try_consume_association(&mut self, units: u32) -> bool {
        if self.association_units >= units {
            self.association_units -= units;
            true
        } else {
            false
        }
    }

    /// Attempts to spend one sensing request.
    pub fn try_consume_sense(&mut self) -> bool {
        if self.sense_requests >= 1 {
            self.sense_requests -= 1;
            true
        } else {
            false
        }
    }

    /// Remaining association units.
    #[must_use]
    pub fn remaining_association(&self) -> u32 {
        self.association_units
    }

    /// Remaining sensing requests.
    #[must_use]
    pub fn remaining_sense(&self) -> u32 {
        self.sense_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_budget() -> AttentionBudget {
        AttentionBudget::new(AttentionConfig {
            association_units: 10,
            sense_requests: 2,
            refill_interval_ticks: 2,
        })
    }

    #[test]
    fn consumption_is_bounded() {
        let mut budget = small_budget();
        assert!(budget.try_consume_association(7));
        assert!(!budget.try_consume_association(4));
        assert!(budget.try_consume_association(3));
        assert_eq!(budget.remaining_association(), 0);
    }

    #[test]
    fn refill_respects_interval() {
        let mut budget = small_budget();
        budget.refill_if_due(Tick::new(0));
        assert!(budget.try_consume_association(10));
        assert!(budget.try_consume_sense());
        assert!(budget.try_consume_sense());
        assert!(!budget.try_consume_sense());

        // One tick later: not yet due.
        budget.refill_if_due(Tick::new(1));
        assert_eq!(budget.remaining_association(), 0);
        assert_eq!(budget.remaining_sense(), 0);

        // Two ticks later: refilled.
        budget.refill_if_due(Tick::new(2));
        assert_eq!(budget.remaining_association(), 10);
        assert_eq!(budget.remaining_sense(), 2);
    }
}

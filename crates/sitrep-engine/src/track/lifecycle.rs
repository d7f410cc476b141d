//! Visibility lifecycle state machine for one track.
//!
//! provisional → visible → inferred → lost, with reacquisition edges back to
//! visible from inferred and lost. Transitions depend only on the confirm
//! streak and the number of ticks since the track was last seen, so replaying
//! the same batch sequence reproduces the same states. Destruction is not a
//! transition here; the boundedness stage owns it.

use serde::{Deserialize, Serialize};

use sitrep_core::Visibility;

use crate::config::LifecycleConfig;

/// A visibility transition worth reporting to the saliency stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Provisional track reached its confirm streak and became visible.
    Confirmed,
    /// Inferred or lost track was observed again and became visible.
    Reacquired,
    /// Visible track aged into inferred.
    BecameInferred,
    /// Track aged into lost.
    BecameLost,
}

/// Lifecycle state carried by every track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    visibility: Visibility,
    confirm_streak: u32,
}

impl Lifecycle {
    /// A freshly spawned track: provisional, no confirming observations yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visibility: Visibility::Provisional,
            confirm_streak: 0,
        }
    }

    /// Current visibility.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Consecutive confirming observations while provisional.
    #[must_use]
    pub fn confirm_streak(&self) -> u32 {
        self.confirm_streak
    }

    /// Registers a matched observation.
    ///
    /// Provisional tracks build their confirm streak and promote once it
    /// reaches `confirm_hits`; inferred and lost tracks reacquire. Both edges
    /// preserve identity — the caller keeps the same track.
    pub fn observed(&mut self, config: &LifecycleConfig) -> Option<LifecycleEvent> {
        match self.visibility {
            Visibility::Provisional => {
                self.confirm_streak += 1;
                if self.confirm_streak >= config.confirm_hits {
                    self.visibility = Visibility::Visible;
                    Some(LifecycleEvent::Confirmed)
                } else {
                    None
                }
            }
            Visibility::Visible => None,
            Visibility::Inferred | Visibility::Lost => {
                self.visibility = Visibility::Visible;
                Some(LifecycleEvent::Reacquired)
            }
        }
    }

    /// Ages an unmatched track given the ticks elapsed since it was last
    /// seen.
    ///
    /// Thresholds are recomputed from `unseen_ticks` rather than counted, so
    /// the transition is a pure function of elapsed time: a tick gap that
    /// jumps past the inferred window goes straight to lost. A miss while
    /// provisional resets the confirm streak; expiry of stale provisionals is
    /// decided elsewhere.
    pub fn age(&mut self, unseen_ticks: u64, config: &LifecycleConfig) -> Option<LifecycleEvent> {
        let inferred_at = u64::from(config.inferred_after_ticks);
        let lost_at = inferred_at + u64::from(config.lost_after_ticks);
        match self.visibility {
            Visibility::Provisional => {
                self.confirm_streak = 0;
                None
            }
            Visibility::Visible if unseen_ticks >= lost_at => {
                self.visibility = Visibility::Lost;
                Some(LifecycleEvent::BecameLost)
            }
            Visibility::Visible if unseen_ticks >= inferred_at => {
                self.visibility = Visibility::Inferred;
                Some(LifecycleEvent::BecameInferred)
            }
            Visibility::Inferred if unseen_ticks >= lost_at => {
                self.visibility = Visibility::Lost;
                Some(LifecycleEvent::BecameLost)
            }
            Visibility::Visible | Visibility::Inferred | Visibility::Lost => None,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LifecycleConfig {
        LifecycleConfig::default()
    }

    #[test]
    fn promotes_after_consecutive_confirms() {
        // Default confirm_hits = 3.
        let mut lc = Lifecycle::new();
        assert_eq!(lc.visibility(), Visibility::Provisional);

        assert_eq!(lc.observed(&config()), None);
        assert_eq!(lc.observed(&config()), None);
        assert_eq!(lc.observed(&config()), Some(LifecycleEvent::Confirmed));
        assert_eq!(lc.visibility(), Visibility::Visible);
    }

    #[test]
    fn miss_resets_streak_but_keeps_track_alive() {
        let mut lc = Lifecycle::new();
        lc.observed(&config());
        lc.observed(&config());
        assert_eq!(lc.confirm_streak(), 2);

        assert_eq!(lc.age(1, &config()), None);
        assert_eq!(lc.visibility(), Visibility::Provisional);
        assert_eq!(lc.confirm_streak(), 0);

        // Streak has to rebuild from scratch.
        lc.observed(&config());
        lc.observed(&config());
        assert_eq!(lc.observed(&config()), Some(LifecycleEvent::Confirmed));
    }

    #[test]
    fn ages_through_inferred_into_lost() {
        // Defaults: inferred after 3 unseen ticks, lost after 5 more.
        let mut lc = Lifecycle::new();
        for _ in 0..3 {
            lc.observed(&config());
        }

        assert_eq!(lc.age(2, &config()), None);
        assert_eq!(lc.visibility(), Visibility::Visible);
        assert_eq!(lc.age(3, &config()), Some(LifecycleEvent::BecameInferred));
        assert_eq!(lc.age(7, &config()), None);
        assert_eq!(lc.age(8, &config()), Some(LifecycleEvent::BecameLost));
        assert_eq!(lc.visibility(), Visibility::Lost);
        assert_eq!(lc.age(50, &config()), None);
    }

    #[test]
    fn tick_gap_jumps_straight_to_lost() {
        let mut lc = Lifecycle::new();
        for _ in 0..3 {
            lc.observed(&config());
        }
        assert_eq!(lc.age(20, &config()), Some(LifecycleEvent::BecameLost));
    }

    #[test]
    fn reacquisition_returns_to_visible() {
        let mut lc = Lifecycle::new();
        for _ in 0..3 {
            lc.observed(&config());
        }
        lc.age(3, &config());
        assert_eq!(lc.visibility(), Visibility::Inferred);
        assert_eq!(lc.observed(&config()), Some(LifecycleEvent::Reacquired));
        assert_eq!(lc.visibility(), Visibility::Visible);

        lc.age(8, &config());
        assert_eq!(lc.visibility(), Visibility::Lost);
        assert_eq!(lc.observed(&config()), Some(LifecycleEvent::Reacquired));
        assert_eq!(lc.visibility(), Visibility::Visible);
    }
}

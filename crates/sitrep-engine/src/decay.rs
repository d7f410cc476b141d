//! Aging of tracks that received no evidence this tick.
//!
//! Belief drains toward `unknown`, kinematic uncertainty grows to its cap,
//! position extrapolates by the last velocity estimate, and visibility
//! degrades on the configured thresholds. Runs once per advanced tick, in
//! identifier order.

use sitrep_core::{Tick, TrackId};

use crate::config::{DecayConfig, LifecycleConfig};
use crate::track::{LifecycleEvent, TrackSet};

/// Ages every track not seen at `now`. Returns the visibility transitions
/// that occurred, in identifier order, for the saliency stage.
pub fn run(
    tracks: &mut TrackSet,
    now: Tick,
    decay: &DecayConfig,
    lifecycle: &LifecycleConfig,
) -> Vec<(TrackId, LifecycleEvent)> {
    let mut events = Vec::new();
    for track in tracks.iter_mut() {
        if track.last_seen() == now {
            continue;
        }
        if let Some(event) = track.age(now, decay, lifecycle) {
            tracing::debug!(
                track_id = %track.id(),
                visibility = %track.visibility(),
                unseen = track.unseen_ticks(now),
                "track visibility degraded"
            );
            events.push((track.id(), event));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FusionConfig;
    use crate::track::Track;
    use sitrep_core::{EvidenceItem, Position, Visibility, PPM_ONE};

    fn confirmed_track(source: &str) -> Track {
        let mut track = Track::spawn(
            &EvidenceItem::new(source, Tick::ZERO, Position::origin()).with_class_hint("drone"),
            &FusionConfig::default(),
        );
        for tick in 1..=3u64 {
            track.apply_match(
                &EvidenceItem::new(source, Tick::new(tick), Position::origin())
                    .with_class_hint("drone"),
                Tick::new(tick),
                &FusionConfig::default(),
                &LifecycleConfig::default(),
            );
        }
        track
    }

    #[test]
    fn unmatched_tracks_decay_monotonically() {
        let mut tracks = TrackSet::new();
        let track = confirmed_track("e1");
        let id = track.id();
        tracks.insert(track);

        let initial_unknown = tracks.get(&id).unwrap().class().unknown_mass();
        let mut last_unknown = initial_unknown;
        let mut last_uncertainty = 0;
        for tick in 4..20u64 {
            run(
                &mut tracks,
                Tick::new(tick),
                &DecayConfig::default(),
                &LifecycleConfig::default(),
            );
            let track = tracks.get(&id).unwrap();
            let unknown = track.class().unknown_mass();
            assert!(unknown >= last_unknown);
            assert!(track.kinematics().uncertainty_mm >= last_uncertainty);
            last_unknown = unknown;
            last_uncertainty = track.kinematics().uncertainty_mm;
        }
        assert!(last_unknown > initial_unknown);
        assert!(last_unknown <= PPM_ONE);
    }

    #[test]
    fn tracks_seen_this_tick_are_untouched() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed_track("e1");
        track.apply_match(
            &EvidenceItem::new("e1", Tick::new(4), Position::origin()),
            Tick::new(4),
            &FusionConfig::default(),
            &LifecycleConfig::default(),
        );
        let id = track.id();
        let unknown_before = track.class().unknown_mass();
        tracks.insert(track);

        let events = run(
            &mut tracks,
            Tick::new(4),
            &DecayConfig::default(),
            &LifecycleConfig::default(),
        );
        assert!(events.is_empty());
        assert_eq!(tracks.get(&id).unwrap().class().unknown_mass(), unknown_before);
    }

    #[test]
    fn reports_visibility_transitions() {
        let mut tracks = TrackSet::new();
        let track = confirmed_track("e1");
        let id = track.id();
        tracks.insert(track);

        // Last seen at tick 3; inferred after 3 unseen, lost after 5 more.
        let events = run(
            &mut tracks,
            Tick::new(6),
            &DecayConfig::default(),
            &LifecycleConfig::default(),
        );
        assert_eq!(events, vec![(id, LifecycleEvent::BecameInferred)]);
        assert_eq!(tracks.get(&id).unwrap().visibility(), Visibility::Inferred);

        let events = run(
            &mut tracks,
            Tick::new(11),
            &DecayConfig::default(),
            &LifecycleConfig::default(),
        );
        assert_eq!(events, vec![(id, LifecycleEvent::BecameLost)]);
        assert_eq!(tracks.get(&id).unwrap().visibility(), Visibility::Lost);
    }
}

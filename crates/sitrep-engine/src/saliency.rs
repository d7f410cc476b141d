//! Saliency diffing: turning state churn into a handful of typed deltas.
//!
//! The stage compares each exposed track against the view a downstream
//! consumer last committed (the track's [`Exposure`]) and emits at most one
//! classification-lane delta per track per tick, priority `new_threat` over
//! `reclassified` over `risk_changed`. A transition into `lost` emits on the
//! visibility lane and silences the classification lane for that tick.
//!
//! Exposed fields commit only when the announcing delta actually goes out.
//! A change blocked by hysteresis therefore stays pending and re-fires on
//! its own once the cooldown expires, without needing a second trigger.
//!
//! [`Exposure`]: crate::track::Exposure

use serde::{Deserialize, Serialize};

use sitrep_core::{ClassLabel, Position, Ppm, RiskBand, Tick, TrackId, TrackSnapshot};

use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::track::{LifecycleEvent, TrackSet};

/// One meaningful change, addressed to the downstream consumer.
///
/// `new_threat` carries the full snapshot so the consumer never needs a
/// follow-up fetch; the other kinds carry the minimal diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaliencyDelta {
    /// A track's risk band reached the threat band for the first time since
    /// it was confirmed or last reported lost.
    NewThreat {
        /// Track being announced.
        track_id: TrackId,
        /// Tick of the announcement.
        tick: Tick,
        /// Band that triggered the announcement.
        band: RiskBand,
        /// Full state of the track at the announcement tick.
        snapshot: TrackSnapshot,
    },
    /// A track's visibility degraded all the way to `lost`.
    Lost {
        /// Track that went lost.
        track_id: TrackId,
        /// Tick of the transition.
        tick: Tick,
        /// Tick of the last positive association.
        last_seen_tick: Tick,
        /// Last estimated position, milli-units.
        last_position: Position,
        /// Risk band at the time of the transition.
        last_band: RiskBand,
    },
    /// A track's dominant class label changed.
    Reclassified {
        /// Track that was reclassified.
        track_id: TrackId,
        /// Tick of the change.
        tick: Tick,
        /// Previously committed dominant label.
        former: ClassLabel,
        /// New dominant label.
        current: ClassLabel,
        /// Belief mass behind the new label, ppm.
        dominant_mass_ppm: Ppm,
    },
    /// A track's risk band crossed a configured boundary.
    RiskChanged {
        /// Track whose risk moved.
        track_id: TrackId,
        /// Tick of the crossing.
        tick: Tick,
        /// Previously committed band.
        former: RiskBand,
        /// New band.
        current: RiskBand,
        /// Overall risk behind the new band, ppm.
        overall_ppm: Ppm,
    },
}

impl SaliencyDelta {
    /// Wire name of the delta kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SaliencyDelta::NewThreat { .. } => "new_threat",
            SaliencyDelta::Lost { .. } => "lost",
            SaliencyDelta::Reclassified { .. } => "reclassified",
            SaliencyDelta::RiskChanged { .. } => "risk_changed",
        }
    }

    /// Track the delta is about.
    #[must_use]
    pub fn track_id(&self) -> TrackId {
        match self {
            SaliencyDelta::NewThreat { track_id, .. }
            | SaliencyDelta::Lost { track_id, .. }
            | SaliencyDelta::Reclassified { track_id, .. }
            | SaliencyDelta::RiskChanged { track_id, .. } => *track_id,
        }
    }

    /// Tick the delta was generated at.
    #[must_use]
    pub fn tick(&self) -> Tick {
        match self {
            SaliencyDelta::NewThreat { tick, .. }
            | SaliencyDelta::Lost { tick, .. }
            | SaliencyDelta::Reclassified { tick, .. }
            | SaliencyDelta::RiskChanged { tick, .. } => *tick,
        }
    }

    /// Ordering weight for envelope packing; larger packs first.
    #[must_use]
    pub fn severity(&self) -> u8 {
        match self {
            SaliencyDelta::NewThreat { .. } => 3,
            SaliencyDelta::Lost { .. } => 2,
            SaliencyDelta::Reclassified { .. } => 1,
            SaliencyDelta::RiskChanged { .. } => 0,
        }
    }
}

/// What the diff produced this tick.
#[derive(Debug, Default)]
pub struct SaliencyOutcome {
    /// Emitted deltas, in track-identifier order. The envelope stage
    /// re-orders by severity.
    pub deltas: Vec<SaliencyDelta>,
    /// Classification-lane changes blocked by hysteresis and left pending.
    pub suppressed: u32,
}

/// The classification-lane change a track wants to announce.
enum Pending {
    Threat,
    Relabel(ClassLabel),
    Reband(RiskBand),
}

/// Diffs exposed state against committed state and emits deltas.
pub fn run(
    tracks: &mut TrackSet,
    events: &[(TrackId, LifecycleEvent)],
    now: Tick,
    config: &EngineConfig,
    diagnostics: &dyn DiagnosticSink,
) -> SaliencyOutcome {
    let mut outcome = SaliencyOutcome::default();
    let events: std::collections::BTreeMap<TrackId, LifecycleEvent> =
        events.iter().copied().collect();

    for id in tracks.ids() {
        let Some(track) = tracks.get_mut(&id) else {
            continue;
        };
        let event = events.get(&id).copied();

        if event == Some(LifecycleEvent::Confirmed) {
            // First exposure: the initial label and band commit silently;
            // only a threat-band arrival is announced below.
            let band = track.band().unwrap_or(RiskBand::Benign);
            track.begin_exposure(band);
            tracing::info!(track_id = %id, band = %band, "track confirmed");
        }

        let Some(summary) = track.risk().copied() else {
            continue;
        };
        if track.exposure().is_none() {
            continue;
        }

        if event == Some(LifecycleEvent::BecameLost) {
            outcome.deltas.push(SaliencyDelta::Lost {
                track_id: id,
                tick: now,
                last_seen_tick: track.last_seen(),
                last_position: track.position(),
                last_band: summary.band,
            });
            if let Some(exposure) = track.exposure_mut() {
                exposure.threat_announced = false;
                exposure.fresh = true;
            }
            tracing::info!(track_id = %id, "track lost");
            continue;
        }

        let dominant = track.dominant_label();
        let Some(exposure) = track.exposure() else {
            continue;
        };
        let threat_worthy = summary.band >= config.risk_bands.threat_band;
        let pending = if threat_worthy && !exposure.threat_announced {
            Some(Pending::Threat)
        } else if dominant != exposure.dominant {
            Some(Pending::Relabel(dominant.clone()))
        } else if summary.band != exposure.band {
            Some(Pending::Reband(summary.band))
        } else {
            None
        };
        let Some(pending) = pending else {
            continue;
        };

        let bypass = exposure.fresh || matches!(pending, Pending::Threat);
        if !track.cooldown().permits(now, bypass, &config.hysteresis) {
            outcome.suppressed += 1;
            tracing::debug!(track_id = %id, "classification-lane change held by hysteresis");
            continue;
        }

        let delta = match &pending {
            Pending::Threat => SaliencyDelta::NewThreat {
                track_id: id,
                tick: now,
                band: summary.band,
                snapshot: track.snapshot(now),
            },
            Pending::Relabel(current) => SaliencyDelta::Reclassified {
                track_id: id,
                tick: now,
                former: exposure.dominant.clone(),
                current: current.clone(),
                dominant_mass_ppm: track.class().dominant().1,
            },
            Pending::Reband(current) => SaliencyDelta::RiskChanged {
                track_id: id,
                tick: now,
                former: exposure.band,
                current: *current,
                overall_ppm: summary.overall_ppm,
            },
        };
        track.cooldown_mut().record(now, &config.hysteresis);
        if let Some(exposure) = track.exposure_mut() {
            exposure.fresh = false;
            match pending {
                Pending::Threat => {
                    exposure.dominant = dominant;
                    exposure.band = summary.band;
                    exposure.threat_announced = true;
                }
                Pending::Relabel(current) => exposure.dominant = current,
                Pending::Reband(current) => exposure.band = current,
            }
        }
        tracing::debug!(track_id = %id, kind = delta.kind(), "delta emitted");
        outcome.deltas.push(delta);
    }

    if now.get() >= config.warmup_ticks && outcome.deltas.len() as u32 > config.sparsity_budget {
        tracing::debug!(
            tick = now.get(),
            emitted = outcome.deltas.len(),
            budget = config.sparsity_budget,
            "delta rate above the sparsity budget"
        );
        diagnostics.record(DiagnosticEvent::SparsityExceeded {
            tick: now,
            emitted: outcome.deltas.len() as u32,
            budget: config.sparsity_budget,
        });
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FusionConfig, LifecycleConfig, RiskBandConfig};
    use crate::diagnostics::InMemoryDiagnostics;
    use crate::track::Track;
    use sitrep_core::{EvidenceItem, RiskSummary};

    fn item(source: &str, tick: u64, x: i64) -> EvidenceItem {
        EvidenceItem::new(source, Tick::new(tick), Position::new(x, 0))
    }

    fn confirmed(source: &str, x: i64, hint: &str) -> Track {
        let mut track = Track::spawn(
            &item(source, 0, x).with_class_hint(hint),
            &FusionConfig::default(),
        );
        for tick in 1..=3u64 {
            track.apply_match(
                &item(source, tick, x).with_class_hint(hint),
                Tick::new(tick),
                &FusionConfig::default(),
                &LifecycleConfig::default(),
            );
        }
        track
    }

    fn summary(overall_ppm: Ppm) -> RiskSummary {
        RiskSummary {
            classification_ppm: overall_ppm,
            presence_ppm: 0,
            overall_ppm,
            opportunity_ppm: 0,
            band: RiskBandConfig::default().band_for(overall_ppm),
            suppressed: false,
        }
    }

    fn run_on(
        tracks: &mut TrackSet,
        events: &[(TrackId, LifecycleEvent)],
        now: u64,
    ) -> SaliencyOutcome {
        let sink = InMemoryDiagnostics::new();
        run(
            tracks,
            events,
            Tick::new(now),
            &EngineConfig::default(),
            &sink,
        )
    }

    #[test]
    fn benign_confirmation_commits_silently() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "walker");
        track.set_risk(summary(100_000));
        let id = track.id();
        tracks.insert(track);

        let outcome = run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);
        assert!(outcome.deltas.is_empty());
        let exposure = tracks.get(&id).unwrap().exposure().unwrap();
        assert_eq!(exposure.dominant, ClassLabel::new("walker"));
        assert_eq!(exposure.band, RiskBand::Benign);
        assert!(!exposure.threat_announced);
    }

    #[test]
    fn threat_band_confirmation_announces_with_full_snapshot() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "drone");
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);

        let outcome = run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);
        assert_eq!(outcome.deltas.len(), 1);
        match &outcome.deltas[0] {
            SaliencyDelta::NewThreat { track_id, band, snapshot, .. } => {
                assert_eq!(*track_id, id);
                assert_eq!(*band, RiskBand::Critical);
                assert_eq!(*snapshot, tracks.get(&id).unwrap().snapshot(Tick::new(3)));
            }
            other => panic!("expected new_threat, got {other:?}"),
        }
        assert!(tracks.get(&id).unwrap().exposure().unwrap().threat_announced);
    }

    #[test]
    fn standing_threat_is_not_reannounced() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "drone");
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);

        let first = run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);
        assert_eq!(first.deltas.len(), 1);
        for tick in 4..20u64 {
            let again = run_on(&mut tracks, &[], tick);
            assert!(again.deltas.is_empty(), "duplicate announcement at {tick}");
        }
    }

    #[test]
    fn dominant_change_emits_reclassified_and_commits_the_label() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "walker");
        track.set_risk(summary(100_000));
        let id = track.id();
        tracks.insert(track);
        run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);

        // Contradicting evidence flips the dominant label.
        let track = tracks.get_mut(&id).unwrap();
        for tick in 15..=18u64 {
            track.apply_match(
                &item("e1", tick, 0).with_class_hint("drone"),
                Tick::new(tick),
                &FusionConfig::default(),
                &LifecycleConfig::default(),
            );
        }
        track.set_risk(summary(100_000));
        assert_eq!(track.dominant_label(), ClassLabel::new("drone"));

        let outcome = run_on(&mut tracks, &[], 18);
        assert_eq!(outcome.deltas.len(), 1);
        match &outcome.deltas[0] {
            SaliencyDelta::Reclassified { former, current, .. } => {
                assert_eq!(*former, ClassLabel::new("walker"));
                assert_eq!(*current, ClassLabel::new("drone"));
            }
            other => panic!("expected reclassified, got {other:?}"),
        }
        let exposure = tracks.get(&id).unwrap().exposure().unwrap();
        assert_eq!(exposure.dominant, ClassLabel::new("drone"));
    }

    #[test]
    fn band_crossing_emits_risk_changed() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "drone");
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);
        run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);

        // Risk falls out of the threat band well after the dwell cooldown.
        tracks.get_mut(&id).unwrap().set_risk(summary(300_000));
        let outcome = run_on(&mut tracks, &[], 30);
        assert_eq!(outcome.deltas.len(), 1);
        match &outcome.deltas[0] {
            SaliencyDelta::RiskChanged { former, current, overall_ppm, .. } => {
                assert_eq!(*former, RiskBand::Critical);
                assert_eq!(*current, RiskBand::Guarded);
                assert_eq!(*overall_ppm, 300_000);
            }
            other => panic!("expected risk_changed, got {other:?}"),
        }
        // The standing announcement survives a downward crossing.
        let exposure = tracks.get(&id).unwrap().exposure().unwrap();
        assert_eq!(exposure.band, RiskBand::Guarded);
        assert!(exposure.threat_announced);
    }

    #[test]
    fn lost_emits_once_and_silences_the_classification_lane() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "drone");
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);
        run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);

        // Band drops on the same tick the track goes lost; only the lost
        // delta goes out.
        tracks.get_mut(&id).unwrap().set_risk(summary(300_000));
        let outcome = run_on(&mut tracks, &[(id, LifecycleEvent::BecameLost)], 11);
        assert_eq!(outcome.deltas.len(), 1);
        match &outcome.deltas[0] {
            SaliencyDelta::Lost { track_id, last_seen_tick, .. } => {
                assert_eq!(*track_id, id);
                assert_eq!(*last_seen_tick, Tick::new(3));
            }
            other => panic!("expected lost, got {other:?}"),
        }
        let exposure = tracks.get(&id).unwrap().exposure().unwrap();
        assert!(!exposure.threat_announced);
        assert!(exposure.fresh);
    }

    #[test]
    fn reannouncement_after_lost_bypasses_the_dwell() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "drone");
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);
        run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);
        run_on(&mut tracks, &[(id, LifecycleEvent::BecameLost)], 11);

        // Reacquired two ticks later, still critical: the announcement goes
        // straight back out despite the ten-tick dwell.
        tracks.get_mut(&id).unwrap().set_risk(summary(900_000));
        let outcome = run_on(&mut tracks, &[(id, LifecycleEvent::Reacquired)], 13);
        assert_eq!(outcome.deltas.len(), 1);
        assert_eq!(outcome.deltas[0].kind(), "new_threat");
        assert!(tracks.get(&id).unwrap().exposure().unwrap().threat_announced);
    }

    #[test]
    fn hysteresis_holds_the_change_until_the_dwell_expires() {
        let mut tracks = TrackSet::new();
        let mut track = confirmed("e1", 0, "walker");
        track.set_risk(summary(100_000));
        let id = track.id();
        tracks.insert(track);
        run_on(&mut tracks, &[(id, LifecycleEvent::Confirmed)], 3);

        // Emit once to arm the dwell cooldown.
        tracks.get_mut(&id).unwrap().set_risk(summary(300_000));
        assert_eq!(run_on(&mut tracks, &[], 20).deltas.len(), 1);

        // A further band move inside the dwell is held, not dropped.
        tracks.get_mut(&id).unwrap().set_risk(summary(600_000));
        let held = run_on(&mut tracks, &[], 21);
        assert!(held.deltas.is_empty());
        assert_eq!(held.suppressed, 1);
        assert_eq!(
            tracks.get(&id).unwrap().exposure().unwrap().band,
            RiskBand::Guarded
        );

        // Nothing new happens, yet the pending change fires once the dwell
        // expires.
        let fired = run_on(&mut tracks, &[], 30);
        assert_eq!(fired.deltas.len(), 1);
        match &fired.deltas[0] {
            SaliencyDelta::RiskChanged { former, current, .. } => {
                assert_eq!(*former, RiskBand::Guarded);
                assert_eq!(*current, RiskBand::Elevated);
            }
            other => panic!("expected risk_changed, got {other:?}"),
        }
    }

    #[test]
    fn provisional_tracks_never_surface() {
        let mut tracks = TrackSet::new();
        let mut track = Track::spawn(&item("e1", 0, 0), &FusionConfig::default());
        track.set_risk(summary(900_000));
        let id = track.id();
        tracks.insert(track);

        let outcome = run_on(&mut tracks, &[], 1);
        assert!(outcome.deltas.is_empty());
        assert!(tracks.get(&id).unwrap().exposure().is_none());
    }

    #[test]
    fn sparsity_overrun_records_a_diagnostic() {
        let mut tracks = TrackSet::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let source = format!("e{i}");
            let mut track = confirmed(&source, i64::from(i) * 100_000, "drone");
            track.set_risk(summary(400_000));
            ids.push(track.id());
            tracks.insert(track);
        }
        let events: Vec<_> = ids
            .iter()
            .map(|id| (*id, LifecycleEvent::Confirmed))
            .collect();
        run_on(&mut tracks, &events, 3);

        // Three simultaneous lost transitions overrun the default budget of
        // two, past warmup.
        let events: Vec<_> = ids
            .iter()
            .map(|id| (*id, LifecycleEvent::BecameLost))
            .collect();
        let sink = InMemoryDiagnostics::new();
        let outcome = run(
            &mut tracks,
            &events,
            Tick::new(12),
            &EngineConfig::default(),
            &sink,
        );
        assert_eq!(outcome.deltas.len(), 3);
        assert_eq!(sink.count_of("sparsity_exceeded"), 1);
    }
}

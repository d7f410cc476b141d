//! Boundedness: the one place tracks die.
//!
//! Two duties, in order. First, provisional tracks that outlived their TTL
//! without confirming expire silently — they were never exposed, so nothing
//! downstream ever hears of them. Second, spawn admissions are enforced
//! against the track cap: if the cap is reached, the lowest-priority
//! evictable track makes room — lost tracks first, then provisionals, oldest
//! `last_seen` first, lowest identifier on ties. Visible and inferred tracks
//! are never evicted; with nothing evictable the admission is rejected and
//! recorded, never a panic.

use sitrep_core::{EvidenceItem, Tick, TrackId, Visibility};

use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::track::{Track, TrackSet};

/// What the boundedness stage did this tick.
#[derive(Debug, Default)]
pub struct BoundsOutcome {
    /// Provisional tracks that expired unconfirmed.
    pub expired: Vec<TrackId>,
    /// Tracks evicted to make room for admissions.
    pub evicted: Vec<TrackId>,
    /// Newly admitted tracks, in admission order.
    pub admitted: Vec<TrackId>,
    /// Spawn admissions rejected with nothing evictable.
    pub rejected: u32,
}

/// Expires over-age provisionals, then admits spawn candidates under the
/// track cap.
pub fn run(
    tracks: &mut TrackSet,
    spawns: Vec<EvidenceItem>,
    now: Tick,
    config: &EngineConfig,
    diagnostics: &dyn DiagnosticSink,
) -> BoundsOutcome {
    let mut outcome = BoundsOutcome::default();

    for id in tracks.ids() {
        let expired = tracks
            .get(&id)
            .is_some_and(|t| t.is_expired_provisional(now, &config.lifecycle));
        if expired {
            tracks.remove(&id);
            tracing::debug!(track_id = %id, "provisional track expired unconfirmed");
            outcome.expired.push(id);
        }
    }

    for item in spawns {
        if tracks.len() >= config.track_cap {
            match eviction_candidate(tracks) {
                Some(victim) => {
                    tracks.remove(&victim);
                    tracing::debug!(
                        track_id = %victim,
                        cap = config.track_cap,
                        "evicted to admit new spawn"
                    );
                    outcome.evicted.push(victim);
                }
                None => {
                    tracing::warn!(
                        source = %item.source_id,
                        cap = config.track_cap,
                        "track cap reached with nothing evictable; spawn rejected"
                    );
                    diagnostics.record(DiagnosticEvent::CapacityExceeded {
                        tick: now,
                        source: item.source_id.clone(),
                    });
                    outcome.rejected += 1;
                    continue;
                }
            }
        }
        let track = Track::spawn(&item, &config.fusion);
        outcome.admitted.push(track.id());
        tracks.insert(track);
    }
    outcome
}

/// Picks the next eviction victim, or `None` when every track is visible or
/// inferred.
fn eviction_candidate(tracks: &TrackSet) -> Option<TrackId> {
    let mut best: Option<(u8, Tick, TrackId)> = None;
    for track in tracks.iter() {
        let rank = match track.visibility() {
            Visibility::Lost => 0u8,
            Visibility::Provisional => 1,
            Visibility::Visible | Visibility::Inferred => continue,
        };
        let key = (rank, track.last_seen(), track.id());
        if best.is_none_or(|current| key < current) {
            best = Some(key);
        }
    }
    best.map(|(_, _, id)| id)
}

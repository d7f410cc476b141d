//! Association: deciding which track, if any, each observation belongs to.
//!
//! Candidates come from the spatial grid (never a full scan), scores are
//! squared distances with a deterministic class-mismatch penalty, and every
//! tie has a fixed resolution: lowest track identifier for equal scores,
//! higher item weight then lower source identifier for contested tracks. The
//! attention budget is charged per item plus per candidate examined; when it
//! runs out, the remaining items are deferred in order, never dropped.

mod grid;

pub use grid::SpatialGrid;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use sitrep_core::{EvidenceItem, TrackId, PPM_ONE};

use crate::budget::AttentionBudget;
use crate::config::AssociationConfig;
use crate::track::TrackSet;

/// Outcome of one tick's association pass.
#[derive(Debug, Default)]
pub struct Association {
    /// Winning observation per matched track.
    pub matches: BTreeMap<TrackId, EvidenceItem>,
    /// Observations that matched nothing; candidate spawns, in order.
    pub spawns: Vec<EvidenceItem>,
    /// Observations deferred to the next tick after budget exhaustion, in
    /// arrival order.
    pub deferred: Vec<EvidenceItem>,
}

/// Associates a validated, ordered evidence slice against the track set.
///
/// `id_robustness` controls whether an observation carrying an external
/// entity reference may match a track recorded under a different one.
#[must_use]
pub fn associate(
    tracks: &TrackSet,
    items: Vec<EvidenceItem>,
    budget: &mut AttentionBudget,
    config: &AssociationConfig,
    id_robustness: bool,
) -> Association {
    let grid = SpatialGrid::build(tracks, config.gate_radius_mm);
    let gate_sq = i128::from(config.gate_radius_mm) * i128::from(config.gate_radius_mm);
    let penalty_sq =
        gate_sq * i128::from(config.class_mismatch_penalty_ppm) / i128::from(PPM_ONE);

    let mut out = Association::default();
    let mut exhausted = false;

    for item in items {
        if exhausted {
            out.deferred.push(item);
            continue;
        }
        let candidates: Vec<TrackId> = grid
            .neighborhood(item.position)
            .take(config.max_candidates)
            .collect();
        let cost = 1 + candidates.len() as u32;
        if !budget.try_consume_association(cost) {
            tracing::debug!(
                source = %item.source_id,
                cost,
                remaining = budget.remaining_association(),
                "attention budget exhausted; deferring remaining evidence"
            );
            exhausted = true;
            out.deferred.push(item);
            continue;
        }

        match best_candidate(tracks, &candidates, &item, gate_sq, penalty_sq, id_robustness) {
            Some(winner) => assign(&mut out, winner, item),
            None => out.spawns.push(item),
        }
    }
    out
}

/// Scores the candidate list and returns the best admissible track.
///
/// The gate applies to the raw squared distance; the class-mismatch penalty
/// only reorders candidates inside the gate. Equal scores resolve to the
/// lowest identifier.
fn best_candidate(
    tracks: &TrackSet,
    candidates: &[TrackId],
    item: &EvidenceItem,
    gate_sq: i128,
    penalty_sq: i128,
    id_robustness: bool,
) -> Option<TrackId> {
    let mut best: Option<(i128, TrackId)> = None;
    for id in candidates {
        let Some(track) = tracks.get(id) else {
            continue;
        };
        let dist_sq = item.position.distance_sq(&track.position());
        if dist_sq > gate_sq {
            continue;
        }
        if !id_robustness {
            if let (Some(item_ref), Some(track_ref)) = (item.entity_ref(), track.entity_ref()) {
                if item_ref != track_ref {
                    continue;
                }
            }
        }
        let mut score = dist_sq;
        if let Some(hint) = &item.class_hint {
            let dominant = track.dominant_label();
            if !hint.is_unknown() && !dominant.is_unknown() && dominant != *hint {
                score += penalty_sq;
            }
        }
        let key = (score, *id);
        let replace = match best {
            None => true,
            Some(current) => key < current,
        };
        if replace {
            best = Some(key);
        }
    }
    best.map(|(_, id)| id)
}

/// Resolves a contested track: the higher-weight item keeps it, weight ties
/// go to the earlier (lower source identifier) item, and the loser falls
/// through to spawn evaluation without cascading to its second-best track.
fn assign(out: &mut Association, track_id: TrackId, item: EvidenceItem) {
    match out.matches.entry(track_id) {
        Entry::Vacant(slot) => {
            slot.insert(item);
        }
        Entry::Occupied(mut slot) => {
            // Items arrive sorted by source, so the holder has the lower one.
            if item.weight_ppm() > slot.get().weight_ppm() {
                let loser = slot.insert(item);
                out.spawns.push(loser);
            } else {
                out.spawns.push(item);
            }
        }
    }
}

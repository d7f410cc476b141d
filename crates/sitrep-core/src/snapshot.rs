//! Read-only projections of track state.
//!
//! [`TrackSnapshot`] is the engine's only externally visible view of a track:
//! it is the classifier's input, the payload of `new_threat` deltas, and the
//! unit of periodic full-state resynchronization. A delta payload must
//! deep-equal an independently fetched snapshot of the same track at the same
//! tick, so everything here derives `PartialEq`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{Position, Ppm, Velocity};
use crate::types::{ClassLabel, FeatureValue, RiskBand, Tick, TrackId, Visibility};

/// Risk assessment attached to a track after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    /// Risk attributable to what the entity is believed to be.
    pub classification_ppm: Ppm,
    /// Risk attributable to the entity being there at all.
    pub presence_ppm: Ppm,
    /// Overall risk: the larger of the two components.
    pub overall_ppm: Ppm,
    /// Opportunity score reported by the classifier.
    pub opportunity_ppm: Ppm,
    /// Band the overall risk falls in.
    pub band: RiskBand,
    /// True when uncertainty suppression lowered the classification risk.
    pub suppressed: bool,
}

/// Full point-in-time view of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Stable content-addressed identifier.
    pub track_id: TrackId,
    /// Tick the snapshot was taken at.
    pub tick: Tick,
    /// Lifecycle state.
    pub visibility: Visibility,
    /// Belief distribution over class labels, ppm, summing to one.
    pub class_belief: BTreeMap<ClassLabel, Ppm>,
    /// Label holding the largest mass (ties broken lexicographically).
    pub dominant_label: ClassLabel,
    /// Mass on the reserved `unknown` label.
    pub unknown_mass_ppm: Ppm,
    /// Estimated position, milli-units.
    pub position: Position,
    /// Estimated velocity, milli-units per tick.
    pub velocity: Velocity,
    /// Scalar kinematic uncertainty radius, milli-units.
    pub uncertainty_mm: u32,
    /// Tick of the last positive association.
    pub last_seen_tick: Tick,
    /// Tick the track was created at.
    pub created_tick: Tick,
    /// Opaque features accumulated from matched evidence.
    pub features: BTreeMap<String, FeatureValue>,
    /// Most recent risk assessment; absent before first classification.
    pub risk: Option<RiskSummary>,
}

impl TrackSnapshot {
    /// Ticks since the last positive association, as of the snapshot tick.
    #[must_use]
    pub fn ticks_unseen(&self) -> u64 {
        self.tick.ticks_since(self.last_seen_tick)
    }
}

/// Reacquisition recommendation handed to the sensing actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseRequest {
    /// Track to reacquire.
    pub track_id: TrackId,
    /// Tick the request was issued.
    pub tick: Tick,
    /// Last estimated position, milli-units.
    pub last_position: Position,
    /// Last estimated velocity, milli-units per tick.
    pub last_velocity: Velocity,
    /// Last-known risk band that justified the request.
    pub urgency: RiskBand,
    /// Tick of the last positive association.
    pub last_seen_tick: Tick,
}

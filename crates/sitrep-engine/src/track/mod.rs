//! The track model: one persistent entity hypothesis.
//!
//! A [`Track`] composes class belief, kinematics, lifecycle, and the
//! per-track bookkeeping the later stages need (emission cooldown, exposed
//! downstream view, sensing state). Everything lives on the track itself so
//! eviction cleans up every trace of it in one move.

mod belief;
mod lifecycle;
mod store;

pub use belief::{ClassBelief, KinematicBelief, INITIAL_UNCERTAINTY_MM};
pub use lifecycle::{Lifecycle, LifecycleEvent};
pub use store::TrackSet;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sitrep_core::{
    ClassLabel, EvidenceItem, FeatureValue, Position, RiskBand, RiskSummary, Tick, TrackId,
    TrackSnapshot, Visibility,
};

use crate::config::{DecayConfig, FusionConfig, HysteresisConfig, LifecycleConfig};

/// The downstream-committed view of a track.
///
/// Created when a track is first confirmed. Fields commit only when a delta
/// announcing them is emitted, so a change blocked by hysteresis stays
/// pending and re-fires once its cooldown expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    /// Last announced dominant label.
    pub dominant: ClassLabel,
    /// Last announced risk band.
    pub band: RiskBand,
    /// A threat announcement is standing (cleared when the track goes lost).
    pub threat_announced: bool,
    /// The track just came back from a lost period; the next
    /// classification-lane emission bypasses the cooldown.
    pub fresh: bool,
}

/// Hysteresis bookkeeping for one track's classification-lane deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    last_emission: Option<Tick>,
    /// Emission ticks inside the current rolling window, oldest first.
    recent: Vec<Tick>,
}

impl Cooldown {
    /// Whether a classification-lane delta may be emitted at `now`.
    ///
    /// The rolling-window budget always applies; the dwell cooldown is
    /// skipped for the first emission ever and when `bypass_cooldown` is set
    /// (fresh exposure after a lost period).
    #[must_use]
    pub fn permits(&self, now: Tick, bypass_cooldown: bool, config: &HysteresisConfig) -> bool {
        let in_window = self
            .recent
            .iter()
            .filter(|e| now.ticks_since(**e) < config.window_ticks)
            .count();
        if in_window >= config.budget as usize {
            return false;
        }
        if bypass_cooldown {
            return true;
        }
        match self.last_emission {
            None => true,
            Some(last) => now.ticks_since(last) >= config.cooldown_ticks,
        }
    }

    /// Records an emission at `now` and drops window-expired entries.
    pub fn record(&mut self, now: Tick, config: &HysteresisConfig) {
        self.last_emission = Some(now);
        self.recent.push(now);
        self.recent
            .retain(|e| now.ticks_since(*e) < config.window_ticks);
    }
}

/// One persistent entity hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: TrackId,
    created: Tick,
    last_seen: Tick,
    lifecycle: Lifecycle,
    class: ClassBelief,
    kinematics: KinematicBelief,
    features: BTreeMap<String, FeatureValue>,
    entity_ref: Option<FeatureValue>,
    risk: Option<RiskSummary>,
    exposure: Option<Exposure>,
    cooldown: Cooldown,
    last_sense_request: Option<Tick>,
}

impl Track {
    /// Spawns a provisional track from an unmatched observation.
    ///
    /// The identifier is content-addressed from the spawning observation, so
    /// identical input histories mint identical identifiers.
    #[must_use]
    pub fn spawn(item: &EvidenceItem, config: &FusionConfig) -> Self {
        let id = TrackId::derive(item.tick, &item.source_id, item.position);
        let mut class = ClassBelief::uninformed();
        class.observe(item.class_hint.as_ref(), item.weight_ppm(), config);
        Self {
            id,
            created: item.tick,
            last_seen: item.tick,
            lifecycle: Lifecycle::new(),
            class,
            kinematics: KinematicBelief::from_observation(item.position),
            features: item.features.clone(),
            entity_ref: item.entity_ref().cloned(),
            risk: None,
            exposure: None,
            cooldown: Cooldown::default(),
            last_sense_request: None,
        }
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Creation tick.
    #[must_use]
    pub fn created(&self) -> Tick {
        self.created
    }

    /// Tick of the last positive association.
    #[must_use]
    pub fn last_seen(&self) -> Tick {
        self.last_seen
    }

    /// Current visibility.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.lifecycle.visibility()
    }

    /// Ticks since the last positive association.
    #[must_use]
    pub fn unseen_ticks(&self, now: Tick) -> u64 {
        now.ticks_since(self.last_seen)
    }

    /// Current position estimate.
    #[must_use]
    pub fn position(&self) -> Position {
        self.kinematics.position
    }

    /// Class belief distribution.
    #[must_use]
    pub fn class(&self) -> &ClassBelief {
        &self.class
    }

    /// Kinematic estimate.
    #[must_use]
    pub fn kinematics(&self) -> &KinematicBelief {
        &self.kinematics
    }

    /// Label with the largest belief mass.
    #[must_use]
    pub fn dominant_label(&self) -> ClassLabel {
        self.class.dominant().0
    }

    /// Recorded external entity reference, if any evidence carried one.
    #[must_use]
    pub fn entity_ref(&self) -> Option<&FeatureValue> {
        self.entity_ref.as_ref()
    }

    /// Most recent risk assessment.
    #[must_use]
    pub fn risk(&self) -> Option<&RiskSummary> {
        self.risk.as_ref()
    }

    /// Most recent risk band.
    #[must_use]
    pub fn band(&self) -> Option<RiskBand> {
        self.risk.map(|r| r.band)
    }

    /// Stores this tick's classification result.
    pub fn set_risk(&mut self, summary: RiskSummary) {
        self.risk = Some(summary);
    }

    /// Downstream-committed view; `None` until first confirmed.
    #[must_use]
    pub fn exposure(&self) -> Option<&Exposure> {
        self.exposure.as_ref()
    }

    /// Mutable access for the saliency stage.
    pub fn exposure_mut(&mut self) -> Option<&mut Exposure> {
        self.exposure.as_mut()
    }

    /// Initializes the exposed view when a track is first confirmed.
    ///
    /// The initial dominant label and band commit silently; whether the
    /// moment itself warrants a threat announcement is the saliency stage's
    /// call.
    pub fn begin_exposure(&mut self, band: RiskBand) {
        self.exposure = Some(Exposure {
            dominant: self.dominant_label(),
            band,
            threat_announced: false,
            fresh: false,
        });
    }

    /// Hysteresis bookkeeping.
    #[must_use]
    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    /// Mutable hysteresis bookkeeping for the saliency stage.
    pub fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }

    /// Tick of the last reacquisition request, if one is outstanding.
    #[must_use]
    pub fn last_sense_request(&self) -> Option<Tick> {
        self.last_sense_request
    }

    /// Records a reacquisition request issued at `now`.
    pub fn record_sense_request(&mut self, now: Tick) {
        self.last_sense_request = Some(now);
    }

    /// Fuses one matched observation into the track.
    ///
    /// Kinematics blend toward the observation weighted by the item's
    /// confidence, the class hint updates the belief, observation features
    /// overwrite per key, and any attached entity reference is recorded.
    /// Reacquisition clears the outstanding sensing request.
    pub fn apply_match(
        &mut self,
        item: &EvidenceItem,
        now: Tick,
        fusion: &FusionConfig,
        lifecycle: &LifecycleConfig,
    ) -> Option<LifecycleEvent> {
        let weight = item.weight_ppm();
        let ticks_since_seen = now.ticks_since(self.last_seen);
        self.kinematics
            .fuse(item.position, ticks_since_seen, weight, fusion);
        self.class.observe(item.class_hint.as_ref(), weight, fusion);
        for (key, value) in &item.features {
            self.features.insert(key.clone(), value.clone());
        }
        if let Some(reference) = item.entity_ref() {
            self.entity_ref = Some(reference.clone());
        }
        self.last_seen = now;
        self.last_sense_request = None;
        self.lifecycle.observed(lifecycle)
    }

    /// Ages an unmatched track one tick: belief decays toward `unknown`,
    /// kinematics extrapolate and blur, visibility degrades on the
    /// configured thresholds.
    pub fn age(
        &mut self,
        now: Tick,
        decay: &DecayConfig,
        lifecycle: &LifecycleConfig,
    ) -> Option<LifecycleEvent> {
        self.class.decay_toward_unknown(decay.unknown_shift_ppm);
        self.kinematics.drift(decay);
        self.lifecycle.age(self.unseen_ticks(now), lifecycle)
    }

    /// True for a provisional track that has gone unmatched past its TTL and
    /// should expire silently.
    #[must_use]
    pub fn is_expired_provisional(&self, now: Tick, config: &LifecycleConfig) -> bool {
        self.visibility() == Visibility::Provisional
            && self.unseen_ticks(now) >= u64::from(config.provisional_ttl_ticks)
    }

    /// Feeds every field of the track into a content hasher in a fixed
    /// order. Replayed histories must produce identical digests, so this
    /// covers bookkeeping (cooldown, sensing) as well as belief state.
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(self.id.as_bytes());
        hasher.update(&self.created.get().to_le_bytes());
        hasher.update(&self.last_seen.get().to_le_bytes());
        hasher.update(&[visibility_tag(self.visibility())]);
        hasher.update(&self.lifecycle.confirm_streak().to_le_bytes());

        hasher.update(&(self.class.iter().count() as u64).to_le_bytes());
        for (label, mass) in self.class.iter() {
            hash_str(hasher, label.as_str());
            hasher.update(&mass.to_le_bytes());
        }

        hasher.update(&self.kinematics.position.x.to_le_bytes());
        hasher.update(&self.kinematics.position.y.to_le_bytes());
        hasher.update(&self.kinematics.velocity.dx.to_le_bytes());
        hasher.update(&self.kinematics.velocity.dy.to_le_bytes());
        hasher.update(&self.kinematics.uncertainty_mm.to_le_bytes());

        hasher.update(&(self.features.len() as u64).to_le_bytes());
        for (key, value) in &self.features {
            hash_str(hasher, key);
            hash_feature(hasher, value);
        }
        match &self.entity_ref {
            None => {
                hasher.update(&[0u8]);
            }
            Some(value) => {
                hasher.update(&[1u8]);
                hash_feature(hasher, value);
            }
        }

        match &self.risk {
            None => {
                hasher.update(&[0u8]);
            }
            Some(risk) => {
                hasher.update(&[1u8]);
                hasher.update(&risk.classification_ppm.to_le_bytes());
                hasher.update(&risk.presence_ppm.to_le_bytes());
                hasher.update(&risk.overall_ppm.to_le_bytes());
                hasher.update(&risk.opportunity_ppm.to_le_bytes());
                hasher.update(&[risk.band.priority(), u8::from(risk.suppressed)]);
            }
        }

        match &self.exposure {
            None => {
                hasher.update(&[0u8]);
            }
            Some(exposure) => {
                hasher.update(&[1u8]);
                hash_str(hasher, exposure.dominant.as_str());
                hasher.update(&[
                    exposure.band.priority(),
                    u8::from(exposure.threat_announced),
                    u8::from(exposure.fresh),
                ]);
            }
        }

        match self.cooldown.last_emission {
            None => {
                hasher.update(&[0u8]);
            }
            Some(tick) => {
                hasher.update(&[1u8]);
                hasher.update(&tick.get().to_le_bytes());
            }
        }
        hasher.update(&(self.cooldown.recent.len() as u64).to_le_bytes());
        for tick in &self.cooldown.recent {
            hasher.update(&tick.get().to_le_bytes());
        }
        match self.last_sense_request {
            None => {
                hasher.update(&[0u8]);
            }
            Some(tick) => {
                hasher.update(&[1u8]);
                hasher.update(&tick.get().to_le_bytes());
            }
        }
    }

    /// Full point-in-time view of the track.
    #[must_use]
    pub fn snapshot(&self, now: Tick) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.id,
            tick: now,
            visibility: self.visibility(),
            class_belief: self.class.to_map(),
            dominant_label: self.dominant_label(),
            unknown_mass_ppm: self.class.unknown_mass(),
            position: self.kinematics.position,
            velocity: self.kinematics.velocity,
            uncertainty_mm: self.kinematics.uncertainty_mm,
            last_seen_tick: self.last_seen,
            created_tick: self.created,
            features: self.features.clone(),
            risk: self.risk,
        }
    }
}

fn visibility_tag(visibility: Visibility) -> u8 {
    match visibility {
        Visibility::Provisional => 0,
        Visibility::Visible => 1,
        Visibility::Inferred => 2,
        Visibility::Lost => 3,
    }
}

fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn hash_feature(hasher: &mut blake3::Hasher, value: &FeatureValue) {
    match value {
        FeatureValue::Number(n) => {
            hasher.update(&[0u8]);
            hasher.update(&n.to_bits().to_le_bytes());
        }
        FeatureValue::Text(s) => {
            hasher.update(&[1u8]);
            hash_str(hasher, s);
        }
    }
}

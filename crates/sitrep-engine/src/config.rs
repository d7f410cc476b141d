//! Engine configuration.
//!
//! Every threshold the pipeline consults lives here — nothing is hardcoded
//! in the stages. Validation is fail-closed and happens once, at
//! construction: a configuration that passes [`EngineConfig::validate`] will
//! never surprise the pipeline later.

use std::fmt;

use serde::{Deserialize, Serialize};

use sitrep_core::{BeliefMode, ConfigError, Milli, Ppm, RiskBand, PPM_ONE};

/// Optional engine capabilities that must be declared up front.
///
/// Declaring an extension the supplied collaborators cannot honor fails at
/// configuration time, never at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extension {
    /// Split classification/presence risk via `classify_detailed`.
    DetailedRisk,
    /// Allow evidence carrying a new external entity reference to re-bind to
    /// an existing track. Strictly opt-in.
    IdRobustness,
}

impl Extension {
    /// Canonical extension name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Extension::DetailedRisk => "detailed_risk",
            Extension::IdRobustness => "id_robustness",
        }
    }

    /// Parses a canonical extension name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "detailed_risk" => Some(Extension::DetailedRisk),
            "id_robustness" => Some(Extension::IdRobustness),
            _ => None,
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Association gate and candidate-search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// Spatial gate radius, milli-units. Evidence beyond this distance can
    /// never match a track.
    pub gate_radius_mm: Milli,
    /// Upper bound on candidates examined per evidence item.
    pub max_candidates: usize,
    /// Score penalty for a class hint that contradicts a track's dominant
    /// label, as ppm of the squared gate radius.
    pub class_mismatch_penalty_ppm: Ppm,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            gate_radius_mm: 5_000,
            max_candidates: 16,
            class_mismatch_penalty_ppm: 250_000,
        }
    }
}

/// Visibility state-machine thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Consecutive confirming associations required to promote a
    /// provisional track to visible.
    pub confirm_hits: u32,
    /// Unmatched ticks after which a visible track becomes inferred.
    pub inferred_after_ticks: u32,
    /// Further unmatched ticks after which an inferred track becomes lost.
    pub lost_after_ticks: u32,
    /// Unmatched ticks after which an unconfirmed provisional track expires
    /// silently.
    pub provisional_ttl_ticks: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirm_hits: 3,
            inferred_after_ticks: 3,
            lost_after_ticks: 5,
            provisional_ttl_ticks: 8,
        }
    }
}

/// Per-tick aging applied to unmatched tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Fraction of each label's mass shifted to `unknown` per unmatched
    /// tick, ppm.
    pub unknown_shift_ppm: Ppm,
    /// Uncertainty radius growth per unmatched tick, milli-units.
    pub uncertainty_growth_mm: u32,
    /// Saturation cap for the uncertainty radius, milli-units.
    pub uncertainty_cap_mm: u32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            unknown_shift_ppm: 40_000,
            uncertainty_growth_mm: 400,
            uncertainty_cap_mm: 60_000,
        }
    }
}

/// Fusion blend parameters for matched evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Blend factor toward the observation for a zero-weight item, ppm.
    pub min_blend_ppm: Ppm,
    /// Blend factor toward the observation for a full-weight item, ppm.
    pub max_blend_ppm: Ppm,
    /// Floor for the uncertainty radius after a match, milli-units.
    pub min_uncertainty_mm: u32,
    /// How strongly a class hint pulls the belief distribution, ppm.
    pub hint_strength_ppm: Ppm,
    /// Upper bound on distinct labels kept per track (including `unknown`);
    /// overflow mass folds back into `unknown`.
    pub max_class_labels: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_blend_ppm: 200_000,
            max_blend_ppm: 800_000,
            min_uncertainty_mm: 250,
            hint_strength_ppm: 600_000,
            max_class_labels: 8,
        }
    }
}

/// Risk band boundaries over the overall risk score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBandConfig {
    /// Lowest overall risk that maps to `guarded`, ppm.
    pub guarded_floor_ppm: Ppm,
    /// Lowest overall risk that maps to `elevated`, ppm.
    pub elevated_floor_ppm: Ppm,
    /// Lowest overall risk that maps to `critical`, ppm.
    pub critical_floor_ppm: Ppm,
    /// Band at or above which a track counts as a threat.
    pub threat_band: RiskBand,
}

impl RiskBandConfig {
    /// Maps an overall risk score onto its band.
    #[must_use]
    pub fn band_for(&self, overall_ppm: Ppm) -> RiskBand {
        if overall_ppm >= self.critical_floor_ppm {
            RiskBand::Critical
        } else if overall_ppm >= self.elevated_floor_ppm {
            RiskBand::Elevated
        } else if overall_ppm >= self.guarded_floor_ppm {
            RiskBand::Guarded
        } else {
            RiskBand::Benign
        }
    }
}

impl Default for RiskBandConfig {
    fn default() -> Self {
        Self {
            guarded_floor_ppm: 250_000,
            elevated_floor_ppm: 500_000,
            critical_floor_ppm: 750_000,
            threat_band: RiskBand::Critical,
        }
    }
}

/// Hysteresis gating for classification-lane deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    /// Minimum ticks between classification-lane deltas for one track.
    pub cooldown_ticks: u64,
    /// Maximum classification-lane deltas per track per rolling window.
    pub budget: u32,
    /// Rolling window length, ticks.
    pub window_ticks: u64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            cooldown_ticks: 10,
            budget: 3,
            window_ticks: 100,
        }
    }
}

/// Attention budget capacity and refill cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Association-search units available per refill.
    pub association_units: u32,
    /// Sensing requests available per refill.
    pub sense_requests: u32,
    /// Ticks between refills.
    pub refill_interval_ticks: u64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            association_units: 4_096,
            sense_requests: 8,
            refill_interval_ticks: 1,
        }
    }
}

/// Active sensing policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensingConfig {
    /// Minimum last-known risk band for a lost track to warrant
    /// reacquisition.
    pub criticality_band: RiskBand,
    /// Ticks between reacquisition requests for one track.
    pub cooldown_ticks: u64,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            criticality_band: RiskBand::Elevated,
            cooldown_ticks: 25,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on simultaneous tracks.
    pub track_cap: usize,
    /// Hard cap on deltas per envelope.
    pub delta_cap: usize,
    /// Steady-state deltas-per-tick target after warmup.
    pub sparsity_budget: u32,
    /// Ticks of startup during which the sparsity target is not monitored.
    pub warmup_ticks: u64,
    /// Full snapshots are attached at least this often, ticks.
    pub snapshot_interval_ticks: u64,
    /// How uncertainty affects derived risk.
    pub belief_mode: BeliefMode,
    /// `unknown` mass above which conservative mode suppresses
    /// classification risk, ppm.
    pub uncertainty_threshold_ppm: Ppm,
    /// Ceiling the suppressed classification risk is clamped to, ppm.
    pub suppressed_risk_ceiling_ppm: Ppm,
    /// Declared optional capabilities.
    pub declared_extensions: Vec<Extension>,
    /// Association gate parameters.
    pub association: AssociationConfig,
    /// Visibility state-machine thresholds.
    pub lifecycle: LifecycleConfig,
    /// Unmatched-track aging rates.
    pub decay: DecayConfig,
    /// Matched-evidence blend parameters.
    pub fusion: FusionConfig,
    /// Risk band boundaries.
    pub risk_bands: RiskBandConfig,
    /// Delta hysteresis gating.
    pub hysteresis: HysteresisConfig,
    /// Attention budget capacity.
    pub attention: AttentionConfig,
    /// Active sensing policy.
    pub sensing: SensingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            track_cap: 256,
            delta_cap: 32,
            sparsity_budget: 2,
            warmup_ticks: 10,
            snapshot_interval_ticks: 64,
            belief_mode: BeliefMode::Conservative,
            uncertainty_threshold_ppm: 600_000,
            suppressed_risk_ceiling_ppm: 200_000,
            declared_extensions: Vec::new(),
            association: AssociationConfig::default(),
            lifecycle: LifecycleConfig::default(),
            decay: DecayConfig::default(),
            fusion: FusionConfig::default(),
            risk_bands: RiskBandConfig::default(),
            hysteresis: HysteresisConfig::default(),
            attention: AttentionConfig::default(),
            sensing: SensingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Starts a builder over the default configuration.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// True when the given extension was declared.
    #[must_use]
    pub fn has_extension(&self, extension: Extension) -> bool {
        self.declared_extensions.contains(&extension)
    }

    /// Validates every field combination, fail-closed.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered; a configuration that
    /// passes here cannot produce range surprises inside the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.track_cap == 0 {
            return Err(ConfigError::invalid("track_cap", "must be at least 1"));
        }
        if self.delta_cap == 0 {
            return Err(ConfigError::invalid("delta_cap", "must be at least 1"));
        }
        if self.snapshot_interval_ticks == 0 {
            return Err(ConfigError::invalid(
                "snapshot_interval_ticks",
                "must be at least 1",
            ));
        }
        for (field, value) in [
            ("uncertainty_threshold_ppm", self.uncertainty_threshold_ppm),
            (
                "suppressed_risk_ceiling_ppm",
                self.suppressed_risk_ceiling_ppm,
            ),
            (
                "association.class_mismatch_penalty_ppm",
                self.association.class_mismatch_penalty_ppm,
            ),
            ("decay.unknown_shift_ppm", self.decay.unknown_shift_ppm),
            ("fusion.min_blend_ppm", self.fusion.min_blend_ppm),
            ("fusion.max_blend_ppm", self.fusion.max_blend_ppm),
            ("fusion.hint_strength_ppm", self.fusion.hint_strength_ppm),
            ("risk_bands.guarded_floor_ppm", self.risk_bands.guarded_floor_ppm),
            ("risk_bands.elevated_floor_ppm", self.risk_bands.elevated_floor_ppm),
            ("risk_bands.critical_floor_ppm", self.risk_bands.critical_floor_ppm),
        ] {
            if value > PPM_ONE {
                return Err(ConfigError::invalid(field, format!("{value} exceeds one (ppm)")));
            }
        }
        if self.association.gate_radius_mm <= 0 {
            return Err(ConfigError::invalid(
                "association.gate_radius_mm",
                "must be positive",
            ));
        }
        if self.association.max_candidates == 0 {
            return Err(ConfigError::invalid(
                "association.max_candidates",
                "must be at least 1",
            ));
        }
        if self.lifecycle.confirm_hits == 0 {
            return Err(ConfigError::invalid(
                "lifecycle.confirm_hits",
                "must be at least 1",
            ));
        }
        if self.lifecycle.inferred_after_ticks == 0 || self.lifecycle.lost_after_ticks == 0 {
            return Err(ConfigError::invalid(
                "lifecycle",
                "inferred_after_ticks and lost_after_ticks must be at least 1",
            ));
        }
        if self.lifecycle.provisional_ttl_ticks == 0 {
            return Err(ConfigError::invalid(
                "lifecycle.provisional_ttl_ticks",
                "must be at least 1",
            ));
        }
        if self.fusion.min_blend_ppm > self.fusion.max_blend_ppm {
            return Err(ConfigError::invalid(
                "fusion.min_blend_ppm",
                "must not exceed fusion.max_blend_ppm",
            ));
        }
        if self.fusion.max_class_labels < 2 {
            return Err(ConfigError::invalid(
                "fusion.max_class_labels",
                "must keep room for `unknown` plus at least one label",
            ));
        }
        if self.decay.uncertainty_cap_mm < self.fusion.min_uncertainty_mm {
            return Err(ConfigError::invalid(
                "decay.uncertainty_cap_mm",
                "must not undercut fusion.min_uncertainty_mm",
            ));
        }
        if self.risk_bands.guarded_floor_ppm >= self.risk_bands.elevated_floor_ppm
            || self.risk_bands.elevated_floor_ppm >= self.risk_bands.critical_floor_ppm
        {
            return Err(ConfigError::invalid(
                "risk_bands",
                "band floors must be strictly increasing",
            ));
        }
        if self.hysteresis.window_ticks == 0 || self.hysteresis.budget == 0 {
            return Err(ConfigError::invalid(
                "hysteresis",
                "window_ticks and budget must be at least 1",
            ));
        }
        if self.attention.refill_interval_ticks == 0 {
            return Err(ConfigError::invalid(
                "attention.refill_interval_ticks",
                "must be at least 1",
            ));
        }
        if self.attention.association_units == 0 {
            return Err(ConfigError::invalid(
                "attention.association_units",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Builder over [`EngineConfig`] for the common knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Sets the track cap.
    #[must_use]
    pub fn track_cap(mut self, cap: usize) -> Self {
        self.config.track_cap = cap;
        self
    }

    /// Sets the per-envelope delta cap.
    #[must_use]
    pub fn delta_cap(mut self, cap: usize) -> Self {
        self.config.delta_cap = cap;
        self
    }

    /// Sets the sparsity budget.
    #[must_use]
    pub fn sparsity_budget(mut self, budget: u32) -> Self {
        self.config.sparsity_budget = budget;
        self
    }

    /// Sets the belief mode.
    #[must_use]
    pub fn belief_mode(mut self, mode: BeliefMode) -> Self {
        self.config.belief_mode = mode;
        self
    }

    /// Sets the uncertainty suppression threshold.
    #[must_use]
    pub fn uncertainty_threshold_ppm(mut self, threshold: Ppm) -> Self {
        self.config.uncertainty_threshold_ppm = threshold;
        self
    }

    /// Sets the snapshot cadence.
    #[must_use]
    pub fn snapshot_interval_ticks(mut self, interval: u64) -> Self {
        self.config.snapshot_interval_ticks = interval;
        self
    }

    /// Declares an optional extension.
    #[must_use]
    pub fn declare_extension(mut self, extension: Extension) -> Self {
        if !self.config.declared_extensions.contains(&extension) {
            self.config.declared_extensions.push(extension);
        }
        self
    }

    /// Replaces the hysteresis parameters.
    #[must_use]
    pub fn hysteresis(mut self, hysteresis: HysteresisConfig) -> Self {
        self.config.hysteresis = hysteresis;
        self
    }

    /// Replaces the lifecycle thresholds.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: LifecycleConfig) -> Self {
        self.config.lifecycle = lifecycle;
        self
    }

    /// Replaces the attention budget parameters.
    #[must_use]
    pub fn attention(mut self, attention: AttentionConfig) -> Self {
        self.config.attention = attention;
        self
    }

    /// Replaces the sensing policy parameters.
    #[must_use]
    pub fn sensing(mut self, sensing: SensingConfig) -> Self {
        self.config.sensing = sensing;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Propagates the first [`ConfigError`] from [`EngineConfig::validate`].
    pub fn build(mut self) -> Result<EngineConfig, ConfigError> {
        self.config.declared_extensions.sort();
        self.config.declared_extensions.dedup();
        self.config.validate()?;
        Ok(self.config)
    }
}

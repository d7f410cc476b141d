//! Classification stage: deriving per-track risk from the injected
//! classifier.
//!
//! Risk is recomputed from scratch for every exposed track every tick; the
//! engine never trusts a previous tick's score. A classifier error or an
//! out-of-range value fails closed to the most cautious assessment — the
//! tick continues, the condition is logged and recorded as a diagnostic.
//!
//! Uncertainty suppression: in `conservative` mode, a track whose `unknown`
//! mass exceeds the configured threshold has its *classification* risk
//! clamped to the suppressed ceiling. Presence risk is exempt by contract —
//! not knowing what something is must not hide that it is there.

use sitrep_core::{
    ppm_mul, BeliefMode, ClassifierResult, DetailedRisk, FeatureValue, Ppm, RiskAssessment,
    RiskClassifier, RiskSummary, Tick, TrackId, TrackSnapshot, Visibility, PPM_ONE,
};

use crate::config::{EngineConfig, Extension};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::track::TrackSet;

/// Classifies every exposed track at `now`, storing a fresh [`RiskSummary`]
/// on each. Provisional tracks are internal and carry no risk.
pub fn run(
    tracks: &mut TrackSet,
    now: Tick,
    classifier: &dyn RiskClassifier,
    config: &EngineConfig,
    diagnostics: &dyn DiagnosticSink,
) {
    let detailed = config.has_extension(Extension::DetailedRisk);
    for track in tracks.iter_mut() {
        if !track.visibility().is_exposed() {
            continue;
        }
        let snapshot = track.snapshot(now);
        let assessed = if detailed {
            classifier.classify_detailed(&snapshot, config.belief_mode)
        } else {
            classifier
                .classify(&snapshot, config.belief_mode)
                .map(DetailedRisk::from_basic)
        };
        let summary = match assessed {
            Ok(assessment) if assessment.is_in_range() => {
                summarize(assessment, snapshot.unknown_mass_ppm, config)
            }
            Ok(_) => {
                fail_closed(track.id(), now, classifier.name(), "out-of-range value", config, diagnostics)
            }
            Err(error) => fail_closed(
                track.id(),
                now,
                classifier.name(),
                &error.to_string(),
                config,
                diagnostics,
            ),
        };
        track.set_risk(summary);
    }
}

/// Applies uncertainty suppression and folds the components into a summary.
fn summarize(assessment: DetailedRisk, unknown_mass_ppm: Ppm, config: &EngineConfig) -> RiskSummary {
    let mut classification = assessment.classification_ppm;
    let mut suppressed = false;
    if config.belief_mode == BeliefMode::Conservative
        && unknown_mass_ppm > config.uncertainty_threshold_ppm
        && classification > config.suppressed_risk_ceiling_ppm
    {
        classification = config.suppressed_risk_ceiling_ppm;
        suppressed = true;
    }
    let overall = classification.max(assessment.presence_ppm);
    RiskSummary {
        classification_ppm: classification,
        presence_ppm: assessment.presence_ppm,
        overall_ppm: overall,
        opportunity_ppm: assessment.opportunity_ppm,
        band: config.risk_bands.band_for(overall),
        suppressed,
    }
}

/// The most cautious summary a configuration allows: full risk on both
/// components, never suppressed.
fn fail_closed(
    track_id: TrackId,
    now: Tick,
    classifier: &str,
    reason: &str,
    config: &EngineConfig,
    diagnostics: &dyn DiagnosticSink,
) -> RiskSummary {
    tracing::warn!(
        track_id = %track_id,
        classifier,
        reason,
        "classifier failed; assigning most cautious risk"
    );
    diagnostics.record(DiagnosticEvent::ClassifierFailure {
        tick: now,
        track_id,
        message: reason.to_string(),
    });
    RiskSummary {
        classification_ppm: PPM_ONE,
        presence_ppm: PPM_ONE,
        overall_ppm: PPM_ONE,
        opportunity_ppm: 0,
        band: config.risk_bands.band_for(PPM_ONE),
        suppressed: false,
    }
}

/// Feature key the built-in classifier reads for an externally supplied
/// threat score in `[0, 1]`.
pub const THREAT_FEATURE_KEY: &str = "threat";

/// Classification risk assigned when no `threat` feature is present.
const BASELINE_THREAT_PPM: Ppm = 200_000;

/// Kinematic uncertainty at which presence confidence bottoms out.
const PRESENCE_BLUR_CAP_MM: u32 = 50_000;

/// Built-in classifier so the engine can run without an external risk model.
///
/// Presence follows visibility and is discounted as kinematic uncertainty
/// grows; classification scales the optional [`THREAT_FEATURE_KEY`] feature
/// by the belief mass attributed to known labels. Integer arithmetic only,
/// so two runs over the same snapshots agree byte for byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRiskClassifier;

impl DefaultRiskClassifier {
    /// Creates the built-in classifier.
    pub fn new() -> Self {
        Self
    }

    fn threat_ppm(snapshot: &TrackSnapshot) -> Ppm {
        match snapshot.features.get(THREAT_FEATURE_KEY) {
            Some(FeatureValue::Number(score)) => {
                (score.clamp(0.0, 1.0) * f64::from(PPM_ONE)) as Ppm
            }
            _ => BASELINE_THREAT_PPM,
        }
    }

    fn presence_ppm(snapshot: &TrackSnapshot) -> Ppm {
        let base: Ppm = match snapshot.visibility {
            Visibility::Visible => 600_000,
            Visibility::Inferred => 400_000,
            Visibility::Provisional => 250_000,
            Visibility::Lost => 200_000,
        };
        // Linear discount down to half confidence at the blur cap.
        let blur = snapshot.uncertainty_mm.min(PRESENCE_BLUR_CAP_MM) as u64;
        let discount = (blur * 500_000 / PRESENCE_BLUR_CAP_MM as u64) as Ppm;
        ppm_mul(base, PPM_ONE - discount)
    }
}

impl RiskClassifier for DefaultRiskClassifier {
    fn name(&self) -> &str {
        "default"
    }

    fn classify(
        &self,
        snapshot: &TrackSnapshot,
        mode: BeliefMode,
    ) -> ClassifierResult<RiskAssessment> {
        let detailed = self.classify_detailed(snapshot, mode)?;
        Ok(RiskAssessment::new(
            detailed.classification_ppm.max(detailed.presence_ppm),
        ))
    }

    fn supports_detailed(&self) -> bool {
        true
    }

    fn classify_detailed(
        &self,
        snapshot: &TrackSnapshot,
        _mode: BeliefMode,
    ) -> ClassifierResult<DetailedRisk> {
        let attributed = PPM_ONE - snapshot.unknown_mass_ppm;
        let classification = ppm_mul(Self::threat_ppm(snapshot), attributed);
        Ok(DetailedRisk::new(classification, Self::presence_ppm(snapshot)))
    }
}

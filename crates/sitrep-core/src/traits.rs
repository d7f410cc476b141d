//! Traits for the collaborators injected into the engine at construction.
//!
//! The engine holds no domain policy of its own: what makes a track risky is
//! the business of a [`RiskClassifier`], and how to go look for a lost track
//! again is the business of an [`ActiveSensingActuator`]. Both are trait
//! objects supplied once, at construction, and both must be deterministic for
//! replay to hold: same snapshot in, same answer out.

use crate::error::{ActuatorError, ClassifierResult};
use crate::fixed::{ppm_clamp, Ppm, PPM_ONE};
use crate::snapshot::{SenseRequest, TrackSnapshot};
use crate::types::BeliefMode;

/// Basic risk assessment for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    /// Risk level, ppm of certain threat.
    pub risk_ppm: Ppm,
    /// Opportunity level, ppm.
    pub opportunity_ppm: Ppm,
}

impl RiskAssessment {
    /// Creates an assessment with no opportunity component.
    #[must_use]
    pub fn new(risk_ppm: Ppm) -> Self {
        Self {
            risk_ppm,
            opportunity_ppm: 0,
        }
    }

    /// Sets the opportunity component.
    #[must_use]
    pub fn with_opportunity(mut self, opportunity_ppm: Ppm) -> Self {
        self.opportunity_ppm = opportunity_ppm;
        self
    }

    /// True when every component is a valid ppm value.
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        self.risk_ppm <= PPM_ONE && self.opportunity_ppm <= PPM_ONE
    }

    /// The most cautious possible assessment, used on classifier failure.
    #[must_use]
    pub fn most_cautious() -> Self {
        Self {
            risk_ppm: PPM_ONE,
            opportunity_ppm: 0,
        }
    }
}

/// Split risk assessment distinguishing what a track is from that it is
/// there, produced by classifiers supporting the `detailed_risk` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailedRisk {
    /// Risk attributable to the believed classification.
    pub classification_ppm: Ppm,
    /// Risk attributable to presence alone; never subject to uncertainty
    /// suppression.
    pub presence_ppm: Ppm,
    /// Opportunity level, ppm.
    pub opportunity_ppm: Ppm,
}

impl DetailedRisk {
    /// Creates a detailed assessment with no opportunity component.
    #[must_use]
    pub fn new(classification_ppm: Ppm, presence_ppm: Ppm) -> Self {
        Self {
            classification_ppm,
            presence_ppm,
            opportunity_ppm: 0,
        }
    }

    /// True when every component is a valid ppm value.
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        self.classification_ppm <= PPM_ONE
            && self.presence_ppm <= PPM_ONE
            && self.opportunity_ppm <= PPM_ONE
    }

    /// Lifts a basic assessment into the detailed shape.
    ///
    /// A basic assessment declares no presence component, so the whole risk
    /// counts as classification risk and remains subject to uncertainty
    /// suppression.
    #[must_use]
    pub fn from_basic(assessment: RiskAssessment) -> Self {
        Self {
            classification_ppm: assessment.risk_ppm,
            presence_ppm: 0,
            opportunity_ppm: assessment.opportunity_ppm,
        }
    }

    /// Clamps every component into range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            classification_ppm: ppm_clamp(u64::from(self.classification_ppm)),
            presence_ppm: ppm_clamp(u64::from(self.presence_ppm)),
            opportunity_ppm: ppm_clamp(u64::from(self.opportunity_ppm)),
        }
    }
}

/// Maps a track snapshot and belief mode to a risk assessment.
///
/// Implementations must be pure with respect to their inputs: the engine's
/// determinism guarantee extends only as far as the classifier's.
pub trait RiskClassifier: Send + Sync {
    /// Short name used in logs and capability errors.
    fn name(&self) -> &str;

    /// Assesses one track.
    ///
    /// # Errors
    ///
    /// Any error is absorbed by the engine's fail-closed rule: the track is
    /// assigned the most cautious risk and the tick continues.
    fn classify(&self, snapshot: &TrackSnapshot, mode: BeliefMode) -> ClassifierResult<RiskAssessment>;

    /// True when [`classify_detailed`](Self::classify_detailed) is
    /// implemented. Checked at configuration time when the `detailed_risk`
    /// extension is declared.
    fn supports_detailed(&self) -> bool {
        false
    }

    /// Assesses one track with split classification/presence components.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::NotSupported`] unless the implementation
    /// opts in; other errors are absorbed by the fail-closed rule.
    ///
    /// [`ClassifierError::NotSupported`]: crate::error::ClassifierError::NotSupported
    fn classify_detailed(
        &self,
        snapshot: &TrackSnapshot,
        mode: BeliefMode,
    ) -> ClassifierResult<DetailedRisk> {
        let _ = (snapshot, mode);
        Err(crate::error::ClassifierError::not_supported("classify_detailed"))
    }
}

/// Receives reacquisition recommendations for high-risk lost tracks.
///
/// The actuator performs out-of-band sensing; the engine only hands it the
/// recommendation. Actuator outcomes never feed back into engine state, so a
/// failing actuator cannot fork a replay.
pub trait ActiveSensingActuator: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Accepts one reacquisition request.
    ///
    /// # Errors
    ///
    /// Failures are logged and recorded as diagnostics; the request still
    /// counts against the track's sensing cooldown.
    fn request_scan(&self, request: &SenseRequest) -> Result<(), ActuatorError>;
}

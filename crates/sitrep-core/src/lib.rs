//! # sitrep-core
//!
//! Shared vocabulary for the sitrep belief-tracking substrate: fixed-point
//! scalars, content-addressed identifiers, evidence and snapshot types, the
//! collaborator traits injected into the engine, and the error hierarchy.
//!
//! Everything here is deliberately inert — no stage logic, no policy. The
//! one rule this crate enforces everywhere is determinism: integer
//! arithmetic, content-addressed identity, and canonical orderings, so that
//! identical input histories produce bit-identical state downstream.
//!
//! The engine itself lives in `sitrep-engine`.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod error;
pub mod evidence;
pub mod fixed;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use error::{
    ActuatorError, ClassifierError, ClassifierResult, ConfigError, EngineError, EngineResult,
    EnvelopeError, StoreError, ValidationError, ValidationResult,
};
pub use evidence::{EvidenceBatch, EvidenceItem, SensorMeta, ENTITY_REF_KEY};
pub use fixed::{ppm_clamp, ppm_lerp, ppm_mul, ppm_scale_u32, Milli, Position, Ppm, Velocity, PPM_ONE};
pub use snapshot::{RiskSummary, SenseRequest, TrackSnapshot};
pub use traits::{ActiveSensingActuator, DetailedRisk, RiskAssessment, RiskClassifier};
pub use types::{
    BeliefMode, ClassLabel, FeatureValue, RiskBand, SourceId, StateHash, Tick, TrackId,
    Visibility, UNKNOWN_LABEL,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

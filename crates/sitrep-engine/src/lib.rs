//! # sitrep-engine
//!
//! A deterministic, bounded perception→belief→delta tracking engine.
//!
//! Evidence batches go in through [`Engine::submit_evidence_batch`]; what
//! comes out is a stream of budgeted [`Envelope`]s carrying only the changes
//! a downstream consumer must hear about — new threats, lost tracks,
//! reclassifications, risk-band changes — plus periodic full snapshots for
//! resynchronization.
//!
//! Design commitments, in rough order of importance:
//!
//! - **Determinism.** Identical configurations fed identical batch
//!   histories produce identical envelopes, byte for byte. All arithmetic
//!   is fixed-point integer, identifiers are content-addressed, and every
//!   container iterates in a canonical order.
//! - **Boundedness.** Tracks are capped with deterministic eviction,
//!   envelopes are capped with overflow deferral, and per-tick association
//!   and sensing work is capped by an attention budget. Overload degrades;
//!   it never grows state.
//! - **Fail-closed inputs.** A malformed batch is rejected wholesale, a
//!   failing classifier yields the most cautious assessment, and a declared
//!   extension no collaborator supports fails at construction.
//!
//! ```
//! use sitrep_engine::prelude::*;
//!
//! let mut engine = Engine::builder(EngineConfig::default()).build()?;
//! let batch = EvidenceBatch::new(Tick::new(0))
//!     .with_item(EvidenceItem::new("cam-1", Tick::new(0), Position::new(1_500, -2_000)));
//! let report = engine.submit_evidence_batch(batch)?;
//! assert_eq!(report.spawned, 1);
//! while let Some(envelope) = engine.next_envelope() {
//!     println!("seq {} carries {} deltas", envelope.sequence, envelope.deltas.len());
//! }
//! # Ok::<(), EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod bounds;
pub mod budget;
pub mod config;
pub mod decay;
pub mod diagnostics;
pub mod engine;
pub mod envelope;
pub mod fusion;
pub mod intake;
pub mod persist;
pub mod risk;
pub mod saliency;
pub mod sensing;
pub mod track;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, TickReport};
pub use envelope::Envelope;
pub use saliency::SaliencyDelta;

/// Everything a typical embedding needs, one import away.
pub mod prelude {
    pub use crate::config::{
        AssociationConfig, AttentionConfig, DecayConfig, EngineConfig, Extension, FusionConfig,
        HysteresisConfig, LifecycleConfig, RiskBandConfig, SensingConfig,
    };
    pub use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, InMemoryDiagnostics};
    pub use crate::engine::{Engine, EngineBuilder, TickReport};
    pub use crate::envelope::Envelope;
    pub use crate::persist::{InMemorySnapshotStore, PersistedState, SnapshotStore};
    pub use crate::risk::DefaultRiskClassifier;
    pub use crate::saliency::SaliencyDelta;
    pub use sitrep_core::{
        ActiveSensingActuator, BeliefMode, ClassLabel, ClassifierError, ClassifierResult,
        DetailedRisk, EngineError, EngineResult, EvidenceBatch, EvidenceItem, Position,
        RiskAssessment, RiskBand, RiskClassifier, SenseRequest, SensorMeta, SourceId, StateHash,
        Tick, TrackId, TrackSnapshot, Visibility,
    };
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Error types for the belief-tracking substrate.
//!
//! Every fallible boundary has its own error enum so callers can match on
//! exactly the failures that boundary produces. Enums are `#[non_exhaustive]`
//! to keep adding variants a non-breaking change, and each offers an
//! `is_recoverable` predicate: recoverable errors leave the engine in a
//! consistent state and the current or next tick may proceed.

use thiserror::Error;

use crate::types::Tick;

/// Why an evidence batch was rejected at intake.
///
/// Intake is fail-closed: the first malformed item rejects the whole batch
/// and nothing is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// An item carried an empty source identifier.
    #[error("evidence item {index} has an empty source id")]
    EmptySourceId {
        /// Index of the offending item within the submitted batch.
        index: usize,
    },

    /// The batch tick went backwards relative to the last accepted batch.
    #[error("batch tick {batch_tick} precedes last accepted tick {last_tick}")]
    NonMonotonicTick {
        /// Tick of the rejected batch.
        batch_tick: Tick,
        /// Most recently accepted tick.
        last_tick: Tick,
    },

    /// An item's tick disagrees with its batch's tick.
    #[error("evidence item {index} carries tick {item_tick}, batch is for tick {batch_tick}")]
    ItemTickMismatch {
        /// Index of the offending item within the submitted batch.
        index: usize,
        /// Tick carried by the item.
        item_tick: Tick,
        /// Tick carried by the batch.
        batch_tick: Tick,
    },

    /// A position coordinate exceeded the representable working range.
    #[error("evidence item {index} position coordinate {value} exceeds ±{limit}")]
    PositionOutOfRange {
        /// Index of the offending item within the submitted batch.
        index: usize,
        /// Offending coordinate value, milli-units.
        value: i64,
        /// Permitted absolute bound, milli-units.
        limit: i64,
    },

    /// A numeric feature was NaN or infinite.
    #[error("evidence item {index} feature `{key}` is not finite")]
    NonFiniteFeature {
        /// Index of the offending item within the submitted batch.
        index: usize,
        /// Feature key.
        key: String,
    },
}

impl ValidationError {
    /// Validation failures never corrupt state; the caller may resubmit a
    /// corrected batch.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Why an engine configuration was rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field value is outside its permitted range.
    #[error("invalid configuration: {field}: {message}")]
    InvalidValue {
        /// Offending field, dotted path.
        field: &'static str,
        /// Human-readable constraint description.
        message: String,
    },

    /// A declared extension name is not known to this build.
    #[error("unknown declared extension `{name}`")]
    UnknownExtension {
        /// The unrecognized extension name.
        name: String,
    },

    /// A declared extension is known but the supplied collaborators cannot
    /// honor it.
    #[error("declared extension `{name}` is not supported by {collaborator}")]
    UnsupportedExtension {
        /// Extension name as declared.
        name: &'static str,
        /// Collaborator that failed the capability check.
        collaborator: &'static str,
    },
}

impl ConfigError {
    /// Builds an [`ConfigError::InvalidValue`] for the given field.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }

    /// Configuration errors are fatal for construction.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

/// Failure reported by an injected risk classifier.
///
/// The engine treats any classifier failure as fail-closed: the affected
/// track is assigned the most cautious risk and the tick continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClassifierError {
    /// The classifier could not produce an assessment.
    #[error("classifier failed: {message}")]
    Failed {
        /// Classifier-supplied description.
        message: String,
    },

    /// An optional operation was invoked on a classifier that does not
    /// implement it.
    #[error("classifier does not support `{operation}`")]
    NotSupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },
}

impl ClassifierError {
    /// Builds a [`ClassifierError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Builds a [`ClassifierError::NotSupported`].
    #[must_use]
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }

    /// Classifier failures are absorbed by the fail-closed rule.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Failure reported by an injected sensing actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ActuatorError {
    /// The actuator could not accept the request.
    #[error("sensing actuator failed: {message}")]
    Failed {
        /// Actuator-supplied description.
        message: String,
    },
}

impl ActuatorError {
    /// Builds an [`ActuatorError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Actuator failures never affect engine state.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Failure in the snapshot persistence store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Persisting a state snapshot failed.
    #[error("failed to persist state: {message}")]
    PersistFailed {
        /// Store-supplied description.
        message: String,
    },

    /// Loading the persisted state failed.
    #[error("failed to load persisted state: {message}")]
    LoadFailed {
        /// Store-supplied description.
        message: String,
    },

    /// State bytes could not be encoded or decoded.
    #[error("state serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Builds a [`StoreError::PersistFailed`].
    #[must_use]
    pub fn persist_failed(message: impl Into<String>) -> Self {
        Self::PersistFailed {
            message: message.into(),
        }
    }

    /// Builds a [`StoreError::LoadFailed`].
    #[must_use]
    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::LoadFailed {
            message: message.into(),
        }
    }

    /// Persist failures are recoverable (the next snapshot retries); load
    /// and decode failures are fatal for construction.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::PersistFailed { .. })
    }
}

/// Failure while packaging a wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// Canonical serialization failed even after the defensive-copy retry.
    #[error("envelope serialization failed at tick {tick} after {attempts} attempts: {message}")]
    SerializationFailed {
        /// Tick whose envelope could not be serialized.
        tick: Tick,
        /// Number of serialization attempts made.
        attempts: u32,
        /// Underlying encoder message.
        message: String,
    },
}

impl EnvelopeError {
    /// Envelope failures are fatal for the tick that produced them.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

/// Top-level failure surfaced by the engine's public operations.
///
/// Each variant wraps the per-area error it came from, so callers can
/// delegate to that area's matching or just render the message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The submitted batch was rejected wholesale at intake.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The configuration or collaborator set was rejected at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Envelope packaging failed after the retry.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Persisted state could not be loaded or decoded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True when the engine remains consistent and may accept further
    /// batches.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Validation(e) => e.is_recoverable(),
            EngineError::Config(e) => e.is_recoverable(),
            EngineError::Envelope(e) => e.is_recoverable(),
            EngineError::Store(e) => e.is_recoverable(),
        }
    }
}

/// Convenience alias for intake results.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Convenience alias for classifier results.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_render_context() {
        let err = ValidationError::NonMonotonicTick {
            batch_tick: Tick::new(3),
            last_tick: Tick::new(7),
        };
        assert!(err.to_string().contains("3"));
        assert!(err.to_string().contains("7"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = ConfigError::invalid("track_cap", "must be at least 1");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("track_cap"));
    }

    #[test]
    fn store_recoverability_depends_on_direction() {
        assert!(StoreError::persist_failed("disk full").is_recoverable());
        assert!(!StoreError::load_failed("missing").is_recoverable());
    }
}

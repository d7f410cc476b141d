//! Structured diagnostics for conditions the engine absorbs without failing.
//!
//! Fail-closed paths keep the tick running; what they cannot do is stay
//! silent. Every absorbed condition is recorded as a typed event so an
//! operator can audit what the engine glossed over and when.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sitrep_core::{SourceId, Tick, TrackId};

/// A condition the engine handled without failing the tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// A spawn was rejected because the track cap was reached and nothing
    /// was evictable.
    CapacityExceeded {
        /// Tick of the rejected admission.
        tick: Tick,
        /// Source whose observation was turned away.
        source: SourceId,
    },
    /// The injected classifier failed or returned an out-of-range value;
    /// the track was assigned the most cautious risk instead.
    ClassifierFailure {
        /// Tick of the failure.
        tick: Tick,
        /// Track being classified.
        track_id: TrackId,
        /// Classifier-reported reason.
        message: String,
    },
    /// A post-warmup tick emitted more deltas than the sparsity budget.
    SparsityExceeded {
        /// Offending tick.
        tick: Tick,
        /// Deltas emitted that tick.
        emitted: u32,
        /// Configured budget.
        budget: u32,
    },
    /// The sensing actuator rejected a reacquisition request. The request
    /// still counts as issued.
    ActuatorFailure {
        /// Tick of the request.
        tick: Tick,
        /// Track the request targeted.
        track_id: TrackId,
        /// Actuator-reported reason.
        message: String,
    },
    /// Envelope serialization failed once and was retried from a fresh
    /// copy.
    EnvelopeRetry {
        /// Tick being packaged.
        tick: Tick,
        /// First attempt's error.
        message: String,
    },
    /// The snapshot store failed to persist; the tick continued.
    StoreFailure {
        /// Tick of the persist attempt.
        tick: Tick,
        /// Store-reported reason.
        message: String,
    },
}

impl DiagnosticEvent {
    /// Stable machine-readable event name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            DiagnosticEvent::CapacityExceeded { .. } => "capacity_exceeded",
            DiagnosticEvent::ClassifierFailure { .. } => "classifier_failure",
            DiagnosticEvent::SparsityExceeded { .. } => "sparsity_exceeded",
            DiagnosticEvent::ActuatorFailure { .. } => "actuator_failure",
            DiagnosticEvent::EnvelopeRetry { .. } => "envelope_retry",
            DiagnosticEvent::StoreFailure { .. } => "store_failure",
        }
    }

    /// Tick the event occurred at.
    #[must_use]
    pub fn tick(&self) -> Tick {
        match self {
            DiagnosticEvent::CapacityExceeded { tick, .. }
            | DiagnosticEvent::ClassifierFailure { tick, .. }
            | DiagnosticEvent::SparsityExceeded { tick, .. }
            | DiagnosticEvent::ActuatorFailure { tick, .. }
            | DiagnosticEvent::EnvelopeRetry { tick, .. }
            | DiagnosticEvent::StoreFailure { tick, .. } => *tick,
        }
    }
}

/// Receiver for diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    /// Records one event. Must not fail; diagnostics are best-effort by
    /// contract and never affect the tick.
    fn record(&self, event: DiagnosticEvent);
}

/// Default sink: an append-only in-memory log.
#[derive(Debug, Default)]
pub struct InMemoryDiagnostics {
    events: RwLock<Vec<DiagnosticEvent>>,
}

impl InMemoryDiagnostics {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every recorded event in order.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.read().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Number of events of the given type.
    #[must_use]
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

impl DiagnosticSink for InMemoryDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_counts_by_type() {
        let sink = InMemoryDiagnostics::new();
        assert!(sink.is_empty());

        sink.record(DiagnosticEvent::CapacityExceeded {
            tick: Tick::new(3),
            source: SourceId::new("e1"),
        });
        sink.record(DiagnosticEvent::SparsityExceeded {
            tick: Tick::new(4),
            emitted: 5,
            budget: 2,
        });
        sink.record(DiagnosticEvent::CapacityExceeded {
            tick: Tick::new(5),
            source: SourceId::new("e2"),
        });

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count_of("capacity_exceeded"), 2);
        assert_eq!(sink.count_of("sparsity_exceeded"), 1);
        assert_eq!(sink.count_of("store_failure"), 0);

        let events = sink.events();
        assert_eq!(events[0].tick(), Tick::new(3));
        assert_eq!(events[0].event_type(), "capacity_exceeded");
    }

    #[test]
    fn serializes_with_snake_case_tags() {
        let event = DiagnosticEvent::ClassifierFailure {
            tick: Tick::new(9),
            track_id: TrackId::derive(
                Tick::ZERO,
                &SourceId::new("e1"),
                sitrep_core::Position::origin(),
            ),
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"classifier_failure\""));
        assert!(json.contains("\"message\":\"boom\""));
    }
}

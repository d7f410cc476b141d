//! The engine: one perception stream's full pipeline behind a two-call API.
//!
//! [`Engine::submit_evidence_batch`] runs the eight stages in fixed order —
//! intake, association, decay, classification, boundedness, saliency diff,
//! active sensing, envelope packaging — and [`Engine::next_envelope`] drains
//! the output queue. Nothing in here consults a clock, a random source, or
//! the iteration order of an unordered container, so identical
//! configurations fed identical batch histories produce identical reports,
//! envelopes, and state hashes.

use std::sync::Arc;

use serde::Serialize;

use sitrep_core::{
    ActiveSensingActuator, ConfigError, EngineResult, EvidenceBatch, EvidenceItem, RiskClassifier,
    StateHash, Tick, TrackId, TrackSnapshot,
};

use crate::bounds;
use crate::budget::AttentionBudget;
use crate::config::{EngineConfig, Extension};
use crate::decay;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, InMemoryDiagnostics};
use crate::envelope::{Envelope, EnvelopePackager};
use crate::fusion;
use crate::intake::EvidenceIntake;
use crate::persist::{PersistedState, SnapshotStore};
use crate::risk::{self, DefaultRiskClassifier};
use crate::saliency;
use crate::sensing;
use crate::track::{LifecycleEvent, TrackSet};

/// What one call to [`Engine::submit_evidence_batch`] did.
///
/// Counts only; the state they summarize is reachable through the
/// introspection methods and the envelope queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tick the batch carried.
    pub tick: Tick,
    /// Items that survived validation and per-source deduplication.
    pub accepted: u32,
    /// Items fused into an existing track.
    pub matched: u32,
    /// Provisional tracks admitted from unmatched items.
    pub spawned: u32,
    /// Tracks promoted provisional → visible.
    pub promoted: u32,
    /// Tracks reacquired from inferred or lost.
    pub reacquired: u32,
    /// Tracks that degraded visible → inferred.
    pub inferred: u32,
    /// Tracks that degraded to lost.
    pub lost: u32,
    /// Provisional tracks expired past their TTL.
    pub expired: u32,
    /// Tracks evicted to stay under the track cap.
    pub evicted: u32,
    /// Spawns rejected because the cap was reached and nothing was
    /// evictable.
    pub rejected_admissions: u32,
    /// Items deferred to the next tick by attention-budget exhaustion.
    pub deferred_evidence: u32,
    /// Saliency deltas emitted this tick.
    pub deltas_emitted: u32,
    /// Classification-lane changes held back by hysteresis.
    pub deltas_suppressed: u32,
    /// Reacquisition requests issued.
    pub sense_requests: u32,
    /// Sequence of the envelope packaged this tick, if one was.
    pub envelope_sequence: Option<u64>,
}

/// Builds an [`Engine`], wiring in collaborators and recovering persisted
/// state.
///
/// Every collaborator is optional: the classifier defaults to
/// [`DefaultRiskClassifier`], diagnostics default to an in-memory sink, and
/// without a store the stream starts fresh at epoch zero.
pub struct EngineBuilder {
    config: EngineConfig,
    classifier: Option<Box<dyn RiskClassifier>>,
    actuator: Option<Box<dyn ActiveSensingActuator>>,
    store: Option<Box<dyn SnapshotStore>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl EngineBuilder {
    /// Sets the risk classifier consulted every tick.
    #[must_use]
    pub fn classifier(mut self, classifier: impl RiskClassifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Sets the actuator that receives reacquisition requests.
    #[must_use]
    pub fn actuator(mut self, actuator: impl ActiveSensingActuator + 'static) -> Self {
        self.actuator = Some(Box::new(actuator));
        self
    }

    /// Sets the store that state images are written to every tick and
    /// recovered from at construction.
    #[must_use]
    pub fn snapshot_store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Sets the sink operational diagnostics are recorded to.
    #[must_use]
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Validates the configuration, checks collaborator capabilities, and
    /// recovers persisted state if a store holds an image.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the configuration is invalid or a declared
    /// extension is not supported by the supplied collaborators;
    /// [`sitrep_core::StoreError`] when the store holds an image that cannot
    /// be read. Construction never degrades silently.
    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate()?;
        let classifier = self
            .classifier
            .unwrap_or_else(|| Box::new(DefaultRiskClassifier::new()));
        if self.config.has_extension(Extension::DetailedRisk) && !classifier.supports_detailed() {
            return Err(ConfigError::UnsupportedExtension {
                name: Extension::DetailedRisk.name(),
                collaborator: "risk classifier",
            }
            .into());
        }
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(InMemoryDiagnostics::new()));

        let restored = match &self.store {
            Some(store) => store.load()?,
            None => None,
        };
        let (intake, tracks, packager, deferred_evidence) = match restored {
            Some(state) => {
                let epoch = state.epoch + 1;
                tracing::info!(
                    epoch,
                    tick = %state.tick,
                    tracks = state.tracks.len(),
                    "resuming stream from persisted state"
                );
                (
                    EvidenceIntake::resume_from(Some(state.tick)),
                    state.tracks,
                    EnvelopePackager::resume(
                        epoch,
                        state.next_sequence,
                        state.last_envelope_hash,
                        state.deferred_deltas,
                    ),
                    state.deferred_evidence,
                )
            }
            None => {
                tracing::debug!("starting fresh stream at epoch 0");
                (
                    EvidenceIntake::new(),
                    TrackSet::new(),
                    EnvelopePackager::new(0),
                    Vec::new(),
                )
            }
        };

        let budget = AttentionBudget::new(self.config.attention.clone());
        Ok(Engine {
            config: self.config,
            intake,
            budget,
            tracks,
            deferred_evidence,
            packager,
            classifier,
            actuator: self.actuator,
            store: self.store,
            diagnostics,
        })
    }
}

/// One perception stream's tracking substrate.
///
/// The engine owns all mutable state for the stream and is driven entirely
/// by [`Engine::submit_evidence_batch`]; there are no background tasks and
/// no wall-clock coupling. It is `Send`, so a holder may move it into a
/// worker, but a single stream is inherently sequential — ticks are a total
/// order.
pub struct Engine {
    config: EngineConfig,
    intake: EvidenceIntake,
    budget: AttentionBudget,
    tracks: TrackSet,
    deferred_evidence: Vec<EvidenceItem>,
    packager: EnvelopePackager,
    classifier: Box<dyn RiskClassifier>,
    actuator: Option<Box<dyn ActiveSensingActuator>>,
    store: Option<Box<dyn SnapshotStore>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The injected collaborators are trait objects without a `Debug`
        // bound, so they are elided here.
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("intake", &self.intake)
            .field("budget", &self.budget)
            .field("tracks", &self.tracks)
            .field("deferred_evidence", &self.deferred_evidence)
            .field("packager", &self.packager)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Starts building an engine around a configuration.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            classifier: None,
            actuator: None,
            store: None,
            diagnostics: None,
        }
    }

    /// Runs one batch of evidence through the full pipeline.
    ///
    /// Stages run in fixed order; a batch at the same tick as the previous
    /// one is legal and re-runs every stage except decay, which ages a track
    /// at most once per distinct tick.
    ///
    /// # Errors
    ///
    /// [`sitrep_core::ValidationError`] rejects the whole batch with no
    /// state touched; [`sitrep_core::EnvelopeError`] means a packaged
    /// envelope could not be serialized even after a retry (its deltas stay
    /// queued). Persistence failures do not error — they are logged,
    /// recorded as diagnostics, and the tick completes.
    pub fn submit_evidence_batch(&mut self, batch: EvidenceBatch) -> EngineResult<TickReport> {
        let now = batch.tick;
        let previous = self.intake.last_accepted_tick();

        // Stage 1: intake. Fail-closed — one malformed item rejects the
        // whole batch before anything is applied.
        let fresh = self.intake.accept(batch)?;
        let accepted = fresh.len() as u32;
        let tick_advanced = previous.is_none_or(|last| now > last);

        // Stage 2: association. Evidence deferred by an earlier budget
        // exhaustion is processed first, in arrival order.
        self.budget.refill_if_due(now);
        let mut items = std::mem::take(&mut self.deferred_evidence);
        items.extend(fresh);
        let association = fusion::associate(
            &self.tracks,
            items,
            &mut self.budget,
            &self.config.association,
            self.config.has_extension(Extension::IdRobustness),
        );
        let matched = association.matches.len() as u32;
        let mut events: Vec<(TrackId, LifecycleEvent)> = Vec::new();
        for (id, item) in &association.matches {
            if let Some(track) = self.tracks.get_mut(id) {
                if let Some(event) =
                    track.apply_match(item, now, &self.config.fusion, &self.config.lifecycle)
                {
                    events.push((*id, event));
                }
            }
        }
        self.deferred_evidence = association.deferred;

        // Stage 3: decay, gated on tick advance so a resubmitted tick
        // cannot age unmatched tracks twice.
        if tick_advanced {
            events.extend(decay::run(
                &mut self.tracks,
                now,
                &self.config.decay,
                &self.config.lifecycle,
            ));
        }

        // Stage 4: classification. Fresh risk for every exposed track.
        risk::run(
            &mut self.tracks,
            now,
            self.classifier.as_ref(),
            &self.config,
            self.diagnostics.as_ref(),
        );

        // Stage 5: boundedness — expiry, then admission with eviction.
        let bounds = bounds::run(
            &mut self.tracks,
            association.spawns,
            now,
            &self.config,
            self.diagnostics.as_ref(),
        );

        // Stage 6: saliency diff against the committed downstream view.
        let saliency = saliency::run(
            &mut self.tracks,
            &events,
            now,
            &self.config,
            self.diagnostics.as_ref(),
        );
        let deltas_emitted = saliency.deltas.len() as u32;

        // Stage 7: active sensing for lost high-criticality tracks.
        let sense_requests = sensing::run(
            &mut self.tracks,
            now,
            &mut self.budget,
            &self.config,
            self.actuator.as_deref(),
            self.diagnostics.as_ref(),
        );

        // Stage 8: envelope packaging.
        let envelope_sequence = self.packager.package(
            saliency.deltas,
            &self.tracks,
            now,
            &self.config,
            self.diagnostics.as_ref(),
        )?;

        self.persist_state(now);

        let report = TickReport {
            tick: now,
            accepted,
            matched,
            spawned: bounds.admitted.len() as u32,
            promoted: count(&events, LifecycleEvent::Confirmed),
            reacquired: count(&events, LifecycleEvent::Reacquired),
            inferred: count(&events, LifecycleEvent::BecameInferred),
            lost: count(&events, LifecycleEvent::BecameLost),
            expired: bounds.expired.len() as u32,
            evicted: bounds.evicted.len() as u32,
            rejected_admissions: bounds.rejected,
            deferred_evidence: self.deferred_evidence.len() as u32,
            deltas_emitted,
            deltas_suppressed: saliency.suppressed,
            sense_requests: sense_requests.len() as u32,
            envelope_sequence,
        };
        tracing::debug!(
            tick = %now,
            matched = report.matched,
            spawned = report.spawned,
            deltas = report.deltas_emitted,
            "tick complete"
        );
        Ok(report)
    }

    /// Takes the oldest packaged envelope, if any.
    pub fn next_envelope(&mut self) -> Option<Envelope> {
        self.packager.next_envelope()
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current stream epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.packager.epoch()
    }

    /// Tick of the most recently accepted batch.
    #[must_use]
    pub fn last_processed_tick(&self) -> Option<Tick> {
        self.intake.last_accepted_tick()
    }

    /// Number of live tracks, provisional included.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Identifiers of all live tracks, in order.
    #[must_use]
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.ids()
    }

    /// Point-in-time view of one track as of the last processed tick.
    #[must_use]
    pub fn snapshot_of(&self, id: &TrackId) -> Option<TrackSnapshot> {
        let now = self.intake.last_accepted_tick().unwrap_or(Tick::ZERO);
        self.tracks.get(id).map(|track| track.snapshot(now))
    }

    /// Content hash over all track state. Two engines that processed
    /// identical histories report identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> StateHash {
        self.tracks.content_hash()
    }

    /// Envelopes packaged but not yet taken.
    #[must_use]
    pub fn pending_envelopes(&self) -> usize {
        self.packager.pending()
    }

    /// Writes a state image if a store is attached. Failure is survivable:
    /// the tick's results stand, the condition is logged and recorded.
    fn persist_state(&self, now: Tick) {
        let Some(store) = &self.store else { return };
        let image = PersistedState {
            epoch: self.packager.epoch(),
            next_sequence: self.packager.next_sequence(),
            tick: now,
            tracks: self.tracks.clone(),
            deferred_deltas: self.packager.deferred_deltas(),
            deferred_evidence: self.deferred_evidence.clone(),
            last_envelope_hash: self.packager.last_hash(),
        };
        if let Err(error) = store.persist(&image) {
            tracing::warn!(%error, "state persistence failed");
            self.diagnostics.record(DiagnosticEvent::StoreFailure {
                tick: now,
                message: error.to_string(),
            });
        }
    }
}

fn count(events: &[(TrackId, LifecycleEvent)], kind: LifecycleEvent) -> u32 {
    events.iter().filter(|(_, event)| *event == kind).count() as u32
}

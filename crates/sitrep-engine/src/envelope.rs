//! Envelope packaging: the wire boundary.
//!
//! Each tick's deltas, together with anything deferred from earlier ticks,
//! are ordered by severity, then recency, then track identifier, and packed
//! under the delta cap. Overflow is carried to the next envelope and counted,
//! never dropped. Envelopes carry a monotonic sequence, the stream epoch, a
//! periodic full snapshot of the exposed tracks, and a BLAKE3 chain over
//! canonical bytes so a consumer can detect gaps or corruption.
//!
//! Serialization is canonical by construction: stable struct field order,
//! `BTreeMap` maps, fixed-point integers. The same state always yields the
//! same bytes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use sitrep_core::{EnvelopeError, StateHash, Tick, TrackSnapshot};

use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::saliency::SaliencyDelta;
use crate::track::TrackSet;

/// One unit of emission toward the downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Monotonic per-stream sequence number.
    pub sequence: u64,
    /// Tick the envelope was packaged at.
    pub tick: Tick,
    /// Stream epoch; bumps on every restart from persisted state.
    pub epoch: u64,
    /// Deltas, most severe first, at most the configured cap.
    pub deltas: Vec<SaliencyDelta>,
    /// Deltas held over to the next envelope.
    pub deferred: u32,
    /// Periodic full view of every exposed track, in identifier order.
    pub snapshot: Option<Vec<TrackSnapshot>>,
    /// BLAKE3 hash of the previous envelope's canonical bytes; zero at the
    /// start of a chain.
    pub prev_hash: StateHash,
}

impl Envelope {
    /// Canonical wire bytes.
    ///
    /// # Errors
    ///
    /// Propagates the encoder error; the packager's retry path handles it.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// BLAKE3 hash of the canonical bytes, the value chained into the next
    /// envelope's `prev_hash`.
    ///
    /// # Errors
    ///
    /// Propagates the encoder error from [`canonical_bytes`](Self::canonical_bytes).
    pub fn content_hash(&self) -> Result<StateHash, serde_json::Error> {
        Ok(StateHash::of(&self.canonical_bytes()?))
    }

    /// True when the envelope carries a full snapshot.
    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Builds and queues envelopes across ticks.
#[derive(Debug)]
pub struct EnvelopePackager {
    epoch: u64,
    sequence: u64,
    last_hash: StateHash,
    last_snapshot_at: Option<Tick>,
    backlog: VecDeque<SaliencyDelta>,
    outbox: VecDeque<Envelope>,
}

impl EnvelopePackager {
    /// Starts a fresh stream at the given epoch.
    #[must_use]
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            sequence: 0,
            last_hash: StateHash::ZERO,
            last_snapshot_at: None,
            backlog: VecDeque::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Resumes a stream from persisted bookkeeping. The sequence continues
    /// monotonically and the hash chain links back to the last envelope of
    /// the previous epoch; the first envelope packaged after a resume always
    /// carries a snapshot so consumers can resynchronize.
    #[must_use]
    pub fn resume(
        epoch: u64,
        sequence: u64,
        last_hash: StateHash,
        backlog: Vec<SaliencyDelta>,
    ) -> Self {
        Self {
            epoch,
            sequence,
            last_hash,
            last_snapshot_at: None,
            backlog: backlog.into(),
            outbox: VecDeque::new(),
        }
    }

    /// Stream epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Sequence the next envelope will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.sequence
    }

    /// Hash of the most recently packaged envelope.
    #[must_use]
    pub fn last_hash(&self) -> StateHash {
        self.last_hash
    }

    /// Deltas currently held over for the next envelope.
    #[must_use]
    pub fn deferred_deltas(&self) -> Vec<SaliencyDelta> {
        self.backlog.iter().cloned().collect()
    }

    /// Envelopes packaged but not yet taken.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Packages this tick's deltas, if there is anything worth emitting.
    ///
    /// Returns the assigned sequence when an envelope was queued. A tick
    /// with no deltas, an empty backlog and no snapshot due emits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::SerializationFailed`] when canonical
    /// serialization fails twice; the failed envelope's deltas are placed
    /// back at the head of the backlog so nothing is lost.
    pub fn package(
        &mut self,
        fresh: Vec<SaliencyDelta>,
        tracks: &TrackSet,
        now: Tick,
        config: &EngineConfig,
        diagnostics: &dyn DiagnosticSink,
    ) -> Result<Option<u64>, EnvelopeError> {
        let mut pool: Vec<SaliencyDelta> = self.backlog.drain(..).collect();
        pool.extend(fresh);
        pool.sort_by(|a, b| {
            b.severity()
                .cmp(&a.severity())
                .then_with(|| b.tick().cmp(&a.tick()))
                .then_with(|| a.track_id().cmp(&b.track_id()))
        });
        if pool.len() > config.delta_cap {
            let overflow = pool.split_off(config.delta_cap);
            self.backlog.extend(overflow);
        }

        let snapshot_due = self
            .last_snapshot_at
            .is_none_or(|t| now.ticks_since(t) >= config.snapshot_interval_ticks);
        if pool.is_empty() && !snapshot_due {
            return Ok(None);
        }

        let envelope = Envelope {
            sequence: self.sequence,
            tick: now,
            epoch: self.epoch,
            deltas: pool,
            deferred: self.backlog.len() as u32,
            snapshot: snapshot_due.then(|| tracks.exposed_snapshots(now)),
            prev_hash: self.last_hash,
        };
        let bytes = match self.encode_with_retry(&envelope, now, diagnostics) {
            Ok(bytes) => bytes,
            Err(error) => {
                // Put the deltas back so the next tick re-attempts them.
                for delta in envelope.deltas.into_iter().rev() {
                    self.backlog.push_front(delta);
                }
                return Err(error);
            }
        };
        self.last_hash = StateHash::of(&bytes);
        if snapshot_due {
            self.last_snapshot_at = Some(now);
        }
        let sequence = self.sequence;
        self.sequence += 1;
        tracing::debug!(
            sequence,
            tick = now.get(),
            deltas = envelope.deltas.len(),
            deferred = envelope.deferred,
            snapshot = envelope.has_snapshot(),
            "envelope packaged"
        );
        self.outbox.push_back(envelope);
        Ok(Some(sequence))
    }

    /// Takes the oldest packaged envelope.
    pub fn next_envelope(&mut self) -> Option<Envelope> {
        self.outbox.pop_front()
    }

    fn encode_with_retry(
        &self,
        envelope: &Envelope,
        now: Tick,
        diagnostics: &dyn DiagnosticSink,
    ) -> Result<Vec<u8>, EnvelopeError> {
        match serde_json::to_vec(envelope) {
            Ok(bytes) => Ok(bytes),
            Err(first) => {
                tracing::warn!(error = %first, "envelope serialization failed; retrying from a copy");
                diagnostics.record(DiagnosticEvent::EnvelopeRetry {
                    tick: now,
                    message: first.to_string(),
                });
                let copy = envelope.clone();
                serde_json::to_vec(&copy).map_err(|second| EnvelopeError::SerializationFailed {
                    tick: now,
                    attempts: 2,
                    message: second.to_string(),
                })
            }
        }
    }
}

//! Snapshot persistence and epoch recovery.
//!
//! The engine writes a full state image at the end of every completed tick
//! when a store is supplied. Construction from a store that holds an image
//! resumes the stream: tracks, deferred work, the envelope hash chain, and
//! the sequence counter all carry over, and the epoch bumps by one so
//! consumers can tell a restart from a gap.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sitrep_core::{EvidenceItem, StateHash, StoreError, Tick};

use crate::saliency::SaliencyDelta;
use crate::track::TrackSet;

/// Durable image of one stream's engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Epoch the image was written under.
    pub epoch: u64,
    /// Sequence the next envelope would have carried.
    pub next_sequence: u64,
    /// Last accepted tick.
    pub tick: Tick,
    /// Full track state.
    pub tracks: TrackSet,
    /// Envelope backlog at the time of the image, FIFO.
    pub deferred_deltas: Vec<SaliencyDelta>,
    /// Evidence deferred by attention-budget exhaustion, FIFO.
    pub deferred_evidence: Vec<EvidenceItem>,
    /// Hash of the most recently packaged envelope; links the chain across
    /// the restart.
    pub last_envelope_hash: StateHash,
}

/// Where a stream's state goes between runs.
pub trait SnapshotStore: Send + Sync {
    /// Writes a state image, replacing any previous one.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] here is logged and recorded as a diagnostic; the
    /// tick that produced the image still completes.
    fn persist(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Reads the latest state image, or `None` for a fresh stream.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] here fails engine construction.
    fn load(&self) -> Result<Option<PersistedState>, StoreError>;
}

/// Keeps the latest image in memory. The default store, and the test
/// double for recovery scenarios.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    state: RwLock<Option<PersistedState>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest persisted image, if any.
    #[must_use]
    pub fn latest(&self) -> Option<PersistedState> {
        self.state.read().clone()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.state.read().clone())
    }
}

// A shared store is how a restarted engine finds its predecessor's image.
impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        (**self).persist(state)
    }

    fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        (**self).load()
    }
}

//! The bounded track collection.
//!
//! Ordered by `TrackId` so every iteration path is deterministic. Capacity
//! enforcement lives in the boundedness stage; the store only holds and
//! hashes state.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use sitrep_core::{StateHash, Tick, TrackId, TrackSnapshot};

use crate::track::Track;

/// All live tracks for one stream, keyed by content-addressed identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackSet {
    tracks: BTreeMap<TrackId, Track>,
}

impl TrackSet {
    /// An empty track set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True when no tracks are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// True when the identifier maps to a live track.
    #[must_use]
    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    /// Looks up a track.
    #[must_use]
    pub fn get(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    /// Looks up a track mutably.
    pub fn get_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(id)
    }

    /// Admits a track. Capacity was already enforced by the caller.
    pub fn insert(&mut self, track: Track) {
        self.tracks.insert(track.id(), track);
    }

    /// Removes and returns a track.
    pub fn remove(&mut self, id: &TrackId) -> Option<Track> {
        self.tracks.remove(id)
    }

    /// Iterates tracks in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Iterates tracks mutably in identifier order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    /// All live identifiers in order. Handy for mutate-while-scanning
    /// passes that cannot hold an iterator across the mutation.
    #[must_use]
    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    /// Snapshots of every exposed (non-provisional) track in identifier
    /// order. This is the downstream resynchronization payload; provisional
    /// tracks never leave the engine.
    #[must_use]
    pub fn exposed_snapshots(&self, now: Tick) -> Vec<TrackSnapshot> {
        self.tracks
            .values()
            .filter(|t| t.visibility().is_exposed())
            .map(|t| t.snapshot(now))
            .collect()
    }

    /// BLAKE3 digest over every track's canonical bytes in identifier order.
    ///
    /// Two engines that processed identical batch sequences hold identical
    /// digests; any divergence in belief, lifecycle, or bookkeeping state
    /// changes the value.
    #[must_use]
    pub fn content_hash(&self) -> StateHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sitrep.trackset.v1");
        hasher.update(&(self.tracks.len() as u64).to_le_bytes());
        for track in self.tracks.values() {
            track.hash_into(&mut hasher);
        }
        StateHash::from_bytes(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FusionConfig, LifecycleConfig};
    use sitrep_core::{EvidenceItem, Position};

    fn spawn(source: &str, tick: u64, x: i64) -> Track {
        let item = EvidenceItem::new(source, Tick::new(tick), Position::new(x, 0));
        Track::spawn(&item, &FusionConfig::default())
    }

    #[test]
    fn insert_lookup_remove_round_trip() {
        let mut set = TrackSet::new();
        let track = spawn("e1", 0, 0);
        let id = track.id();
        set.insert(track);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&id));
        assert!(set.get(&id).is_some());

        let removed = set.remove(&id);
        assert!(removed.is_some());
        assert!(set.is_empty());
        assert!(!set.contains(&id));
    }

    #[test]
    fn iteration_is_id_ordered() {
        let mut set = TrackSet::new();
        for (source, x) in [("c", 30), ("a", 10), ("b", 20)] {
            set.insert(spawn(source, 0, x));
        }
        let ids: Vec<_> = set.iter().map(Track::id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(set.ids(), sorted);
    }

    #[test]
    fn content_hash_is_stable_and_state_sensitive() {
        let build = || {
            let mut set = TrackSet::new();
            set.insert(spawn("e1", 0, 0));
            set.insert(spawn("e2", 0, 100));
            set
        };
        let a = build();
        let b = build();
        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = build();
        let id = c.ids()[0];
        if let Some(track) = c.get_mut(&id) {
            track.apply_match(
                &EvidenceItem::new("e1", Tick::new(1), Position::new(50, 0)),
                Tick::new(1),
                &FusionConfig::default(),
                &LifecycleConfig::default(),
            );
        }
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn exposed_snapshots_skip_provisionals() {
        let mut set = TrackSet::new();
        set.insert(spawn("e1", 0, 0));
        let mut confirmed = spawn("e2", 0, 100);
        for tick in 1..=3u64 {
            confirmed.apply_match(
                &EvidenceItem::new("e2", Tick::new(tick), Position::new(100, 0)),
                Tick::new(tick),
                &FusionConfig::default(),
                &LifecycleConfig::default(),
            );
        }
        let confirmed_id = confirmed.id();
        set.insert(confirmed);

        let snapshots = set.exposed_snapshots(Tick::new(3));
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].track_id, confirmed_id);
    }
}

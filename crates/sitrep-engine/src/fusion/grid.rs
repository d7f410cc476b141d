//! Spatial bucketing for gate-bounded candidate search.
//!
//! Tracks are bucketed into square cells whose side equals the gate radius,
//! so every track within the gate of a query position lives in the 3×3 cell
//! neighborhood around it. Candidate order is fixed (center cell first, then
//! neighbors row-major, identifier order within a cell), which keeps the
//! capped candidate scan deterministic.

use std::collections::BTreeMap;

use sitrep_core::{Milli, Position, TrackId};

use crate::track::TrackSet;

/// Cell offsets scanned around a query, center first.
const NEIGHBORHOOD: [(i64, i64); 9] = [
    (0, 0),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// One tick's spatial index over the track set.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: Milli,
    cells: BTreeMap<(i64, i64), Vec<TrackId>>,
}

impl SpatialGrid {
    /// Buckets every live track. `cell_size` is the gate radius and must be
    /// positive (enforced at configuration time).
    #[must_use]
    pub fn build(tracks: &TrackSet, cell_size: Milli) -> Self {
        let mut cells: BTreeMap<(i64, i64), Vec<TrackId>> = BTreeMap::new();
        for track in tracks.iter() {
            let cell = cell_of(track.position(), cell_size);
            cells.entry(cell).or_default().push(track.id());
        }
        Self { cell_size, cells }
    }

    /// Tracks in the 3×3 neighborhood around `position`, in scan order.
    ///
    /// Everything within one gate radius of `position` is included; entries
    /// farther away may appear and are filtered by the exact gate check.
    pub fn neighborhood(&self, position: Position) -> impl Iterator<Item = TrackId> + '_ {
        let (cx, cy) = cell_of(position, self.cell_size);
        NEIGHBORHOOD.iter().flat_map(move |(dx, dy)| {
            self.cells
                .get(&(cx + dx, cy + dy))
                .into_iter()
                .flatten()
                .copied()
        })
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}

fn cell_of(position: Position, cell_size: Milli) -> (i64, i64) {
    (
        position.x.div_euclid(cell_size),
        position.y.div_euclid(cell_size),
    )
}

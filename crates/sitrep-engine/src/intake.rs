//! Evidence intake: validation, deduplication, deterministic ordering.
//!
//! Intake is the only gate raw input passes through, and it is fail-closed:
//! one malformed item rejects the whole batch with nothing applied. Accepted
//! batches come out deduplicated by source and sorted by (source, spatial
//! key), so every later stage sees evidence in exactly one order.

use sitrep_core::{EvidenceBatch, EvidenceItem, Tick, ValidationError, ValidationResult};

/// Largest permitted absolute coordinate, milli-units (1,000 km). Keeps all
/// downstream integer arithmetic comfortably inside its widened types.
pub const MAX_ABS_COORD_MM: i64 = 1_000_000_000_000;

/// Stateful intake gate; remembers the last accepted tick to enforce
/// monotonicity.
#[derive(Debug, Clone, Default)]
pub struct EvidenceIntake {
    last_accepted: Option<Tick>,
}

impl EvidenceIntake {
    /// Creates an intake gate that will accept any first tick.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the monotonicity cursor from persisted state.
    #[must_use]
    pub fn resume_from(last_accepted: Option<Tick>) -> Self {
        Self { last_accepted }
    }

    /// Tick of the most recently accepted batch.
    #[must_use]
    pub fn last_accepted_tick(&self) -> Option<Tick> {
        self.last_accepted
    }

    /// Validates a batch without applying it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] in item order.
    pub fn validate(&self, batch: &EvidenceBatch) -> ValidationResult<()> {
        if let Some(last) = self.last_accepted {
            if batch.tick < last {
                return Err(ValidationError::NonMonotonicTick {
                    batch_tick: batch.tick,
                    last_tick: last,
                });
            }
        }
        for (index, item) in batch.items.iter().enumerate() {
            if item.source_id.is_empty() {
                return Err(ValidationError::EmptySourceId { index });
            }
            if item.tick != batch.tick {
                return Err(ValidationError::ItemTickMismatch {
                    index,
                    item_tick: item.tick,
                    batch_tick: batch.tick,
                });
            }
            for value in [item.position.x, item.position.y] {
                // unsigned_abs: `i64::MIN` has no `abs` and must still land
                // out of range.
                if value.unsigned_abs() > MAX_ABS_COORD_MM.unsigned_abs() {
                    return Err(ValidationError::PositionOutOfRange {
                        index,
                        value,
                        limit: MAX_ABS_COORD_MM,
                    });
                }
            }
            for (key, value) in &item.features {
                if value.is_non_finite() {
                    return Err(ValidationError::NonFiniteFeature {
                        index,
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates, deduplicates, and sorts a batch, advancing the
    /// monotonicity cursor on success.
    ///
    /// Duplicate sources keep the item with the smallest spatial key; the
    /// result is ordered by (source, spatial key).
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`]; the cursor does not advance on
    /// failure.
    pub fn accept(&mut self, batch: EvidenceBatch) -> ValidationResult<Vec<EvidenceItem>> {
        self.validate(&batch)?;
        let tick = batch.tick;
        let mut items = batch.items;
        items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        items.dedup_by(|next, kept| next.source_id == kept.source_id);
        tracing::debug!(tick = %tick, accepted = items.len(), "evidence batch accepted");
        self.last_accepted = Some(tick);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitrep_core::{FeatureValue, Position};

    fn item(source: &str, x: i64, y: i64, tick: u64) -> EvidenceItem {
        EvidenceItem::new(source, Tick::new(tick), Position::new(x, y))
    }

    #[test]
    fn accepts_and_sorts_by_source_then_position() {
        let mut intake = EvidenceIntake::new();
        let batch = EvidenceBatch::new(Tick::new(0))
            .with_item(item("b", 5, 5, 0))
            .with_item(item("a", 9, 9, 0))
            .with_item(item("a", 1, 1, 0));
        let items = intake.accept(batch).unwrap();
        // Duplicate source "a" collapses to its smallest spatial key.
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id.as_str(), "a");
        assert_eq!(items[0].position, Position::new(1, 1));
        assert_eq!(items[1].source_id.as_str(), "b");
    }

    #[test]
    fn rejects_backwards_tick() {
        let mut intake = EvidenceIntake::new();
        intake.accept(EvidenceBatch::new(Tick::new(5))).unwrap();
        let err = intake.accept(EvidenceBatch::new(Tick::new(4))).unwrap_err();
        assert!(matches!(err, ValidationError::NonMonotonicTick { .. }));
        // Cursor unchanged; the same tick is still acceptable.
        assert!(intake.accept(EvidenceBatch::new(Tick::new(5))).is_ok());
    }

    #[test]
    fn rejects_whole_batch_on_one_bad_item() {
        let mut intake = EvidenceIntake::new();
        let batch = EvidenceBatch::new(Tick::new(0))
            .with_item(item("good", 0, 0, 0))
            .with_item(item("", 0, 0, 0));
        let err = intake.accept(batch).unwrap_err();
        assert!(matches!(err, ValidationError::EmptySourceId { index: 1 }));
        assert!(intake.last_accepted_tick().is_none());
    }

    #[test]
    fn rejects_item_tick_mismatch() {
        let mut intake = EvidenceIntake::new();
        let batch = EvidenceBatch::new(Tick::new(2)).with_item(item("a", 0, 0, 3));
        assert!(matches!(
            intake.accept(batch).unwrap_err(),
            ValidationError::ItemTickMismatch { index: 0, .. }
        ));
    }

    #[test]
    fn rejects_out_of_range_position() {
        let mut intake = EvidenceIntake::new();
        let batch =
            EvidenceBatch::new(Tick::new(0)).with_item(item("a", MAX_ABS_COORD_MM + 1, 0, 0));
        assert!(matches!(
            intake.accept(batch).unwrap_err(),
            ValidationError::PositionOutOfRange { .. }
        ));
    }

    #[test]
    fn rejects_the_most_negative_coordinate() {
        // i64::MIN has no positive counterpart; a naive `abs` here would
        // overflow rather than reject.
        let mut intake = EvidenceIntake::new();
        let batch = EvidenceBatch::new(Tick::new(0)).with_item(item("a", i64::MIN, 0, 0));
        assert!(matches!(
            intake.accept(batch).unwrap_err(),
            ValidationError::PositionOutOfRange {
                value: i64::MIN,
                ..
            }
        ));
        assert!(intake.last_accepted_tick().is_none());
    }

    #[test]
    fn rejects_non_finite_feature() {
        let mut intake = EvidenceIntake::new();
        let bad = item("a", 0, 0, 0).with_feature("score", FeatureValue::Number(f64::NAN));
        let batch = EvidenceBatch::new(Tick::new(0)).with_item(bad);
        assert!(matches!(
            intake.accept(batch).unwrap_err(),
            ValidationError::NonFiniteFeature { .. }
        ));
    }

    #[test]
    fn empty_batch_advances_tick() {
        let mut intake = EvidenceIntake::new();
        let items = intake.accept(EvidenceBatch::new(Tick::new(7))).unwrap();
        assert!(items.is_empty());
        assert_eq!(intake.last_accepted_tick(), Some(Tick::new(7)));
    }
}

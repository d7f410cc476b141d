//! Evidence types: the observations the engine consumes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{ppm_lerp, Position, Ppm, PPM_ONE};
use crate::types::{ClassLabel, FeatureValue, SourceId, Tick};

/// Feature key under which producers may attach an external entity reference.
pub const ENTITY_REF_KEY: &str = "entity_id";

/// Weight multiplier applied when the sensor reports the subject occluded.
const OCCLUDED_FACTOR_PPM: Ppm = 450_000;
/// Weight multiplier applied without a line of sight.
const NO_LOS_FACTOR_PPM: Ppm = 600_000;
/// Weight multiplier applied outside the sensor's field of view.
const OUT_OF_FOV_FACTOR_PPM: Ppm = 500_000;
/// Range within which distance does not reduce the weight, in milli-units.
const NEAR_FIELD_MM: u32 = 2_000;
/// Range at and beyond which the distance factor bottoms out.
const FAR_FIELD_MM: u32 = 50_000;
/// Distance factor at or beyond the far field.
const FAR_FIELD_FLOOR_PPM: Ppm = 200_000;

/// Sensor-side metadata describing the conditions of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMeta {
    /// Subject inside the sensor's field of view.
    pub in_fov: bool,
    /// Unobstructed line of sight to the subject.
    pub has_line_of_sight: bool,
    /// Sensor-to-subject distance, milli-units.
    pub distance_mm: u32,
    /// Subject partially occluded.
    pub occluded: bool,
}

impl SensorMeta {
    /// Metadata for a clear observation at the given distance.
    #[must_use]
    pub fn clear_at(distance_mm: u32) -> Self {
        Self {
            in_fov: true,
            has_line_of_sight: true,
            distance_mm,
            occluded: false,
        }
    }

    /// Deterministic confidence weight for an observation under these
    /// conditions, in ppm of full trust.
    ///
    /// Drives both contradiction resolution (higher weight wins a contested
    /// track) and the kinematic blend factor. Pure integer arithmetic.
    #[must_use]
    pub fn weight_ppm(&self) -> Ppm {
        let mut weight = u64::from(PPM_ONE);
        if !self.in_fov {
            weight = weight * u64::from(OUT_OF_FOV_FACTOR_PPM) / u64::from(PPM_ONE);
        }
        if !self.has_line_of_sight {
            weight = weight * u64::from(NO_LOS_FACTOR_PPM) / u64::from(PPM_ONE);
        }
        if self.occluded {
            weight = weight * u64::from(OCCLUDED_FACTOR_PPM) / u64::from(PPM_ONE);
        }
        weight = weight * u64::from(self.distance_factor_ppm()) / u64::from(PPM_ONE);
        weight as Ppm
    }

    fn distance_factor_ppm(&self) -> Ppm {
        if self.distance_mm <= NEAR_FIELD_MM {
            return PPM_ONE;
        }
        if self.distance_mm >= FAR_FIELD_MM {
            return FAR_FIELD_FLOOR_PPM;
        }
        let span = u64::from(FAR_FIELD_MM - NEAR_FIELD_MM);
        let into = u64::from(self.distance_mm - NEAR_FIELD_MM);
        let progress = ((into * u64::from(PPM_ONE)) / span) as Ppm;
        ppm_lerp(PPM_ONE, FAR_FIELD_FLOOR_PPM, progress)
    }
}

impl Default for SensorMeta {
    fn default() -> Self {
        Self::clear_at(0)
    }
}

/// One observation from one source at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Originating source.
    pub source_id: SourceId,
    /// Tick the observation belongs to.
    pub tick: Tick,
    /// Optional class hint from the producer.
    pub class_hint: Option<ClassLabel>,
    /// Observed position, milli-units.
    pub position: Position,
    /// Observation conditions.
    pub meta: SensorMeta,
    /// Opaque features passed through to the classifier and threat payloads.
    pub features: BTreeMap<String, FeatureValue>,
}

impl EvidenceItem {
    /// Creates a clear-conditions observation with no hint or features.
    #[must_use]
    pub fn new(source_id: impl Into<SourceId>, tick: Tick, position: Position) -> Self {
        Self {
            source_id: source_id.into(),
            tick,
            class_hint: None,
            position,
            meta: SensorMeta::default(),
            features: BTreeMap::new(),
        }
    }

    /// Sets the class hint.
    #[must_use]
    pub fn with_class_hint(mut self, hint: impl Into<ClassLabel>) -> Self {
        self.class_hint = Some(hint.into());
        self
    }

    /// Sets the sensor metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: SensorMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Attaches one feature.
    #[must_use]
    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }

    /// Confidence weight for this observation.
    #[must_use]
    pub fn weight_ppm(&self) -> Ppm {
        self.meta.weight_ppm()
    }

    /// External entity reference, when the producer attached one.
    #[must_use]
    pub fn entity_ref(&self) -> Option<&FeatureValue> {
        self.features.get(ENTITY_REF_KEY)
    }

    /// Key used for the deterministic intra-batch sort.
    #[must_use]
    pub fn sort_key(&self) -> (&str, i64, i64) {
        (self.source_id.as_str(), self.position.x, self.position.y)
    }
}

/// All evidence for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBatch {
    /// Tick this batch advances the engine to.
    pub tick: Tick,
    /// Observations; deduplicated and ordered at intake.
    pub items: Vec<EvidenceItem>,
}

impl EvidenceBatch {
    /// Creates an empty batch for the given tick.
    ///
    /// An empty batch is valid input: it advances the tick and lets decay
    /// run with no new observations.
    #[must_use]
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            items: Vec::new(),
        }
    }

    /// Appends an observation.
    #[must_use]
    pub fn with_item(mut self, item: EvidenceItem) -> Self {
        self.items.push(item);
        self
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the batch carries no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_near_observation_has_full_weight() {
        assert_eq!(SensorMeta::clear_at(0).weight_ppm(), PPM_ONE);
        assert_eq!(SensorMeta::clear_at(NEAR_FIELD_MM).weight_ppm(), PPM_ONE);
    }

    #[test]
    fn weight_decreases_with_degraded_conditions() {
        let clear = SensorMeta::clear_at(1_000).weight_ppm();
        let occluded = SensorMeta {
            occluded: true,
            ..SensorMeta::clear_at(1_000)
        }
        .weight_ppm();
        let no_los = SensorMeta {
            has_line_of_sight: false,
            ..SensorMeta::clear_at(1_000)
        }
        .weight_ppm();
        assert!(occluded < clear);
        assert!(no_los < clear);
        assert_eq!(occluded, OCCLUDED_FACTOR_PPM);
    }

    #[test]
    fn weight_decreases_monotonically_with_distance() {
        let mut last = PPM_ONE + 1;
        for distance in [0u32, 2_000, 5_000, 10_000, 25_000, 50_000, 80_000] {
            let w = SensorMeta::clear_at(distance).weight_ppm();
            assert!(w <= last, "weight rose at distance {distance}");
            last = w;
        }
        assert_eq!(SensorMeta::clear_at(u32::MAX).weight_ppm(), FAR_FIELD_FLOOR_PPM);
    }

    #[test]
    fn entity_ref_reads_reserved_feature() {
        let item = EvidenceItem::new("e1", Tick::ZERO, Position::origin())
            .with_feature(ENTITY_REF_KEY, "ext-42");
        assert_eq!(
            item.entity_ref(),
            Some(&FeatureValue::Text("ext-42".to_string()))
        );
        let bare = EvidenceItem::new("e1", Tick::ZERO, Position::origin());
        assert!(bare.entity_ref().is_none());
    }
}

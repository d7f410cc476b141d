//! Belief state for one track: class distribution and kinematics.
//!
//! Both halves are pure integer machines. [`ClassBelief`] keeps a ppm
//! distribution over labels that always sums to exactly one unit via
//! largest-remainder renormalization; [`KinematicBelief`] blends positions
//! and velocities with ppm factors and carries a scalar uncertainty radius.
//! Identical inputs produce identical bits on every platform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sitrep_core::{ppm_lerp, ppm_mul, ppm_scale_u32, ClassLabel, Position, Ppm, Velocity, PPM_ONE};

use crate::config::{DecayConfig, FusionConfig};

/// Mass a full-trust hint still leaves on `unknown`: evidence is never taken
/// as certain.
const HINT_RESIDUAL_PPM: Ppm = 100_000;

/// Uncertainty radius assigned to a freshly spawned track, milli-units.
pub const INITIAL_UNCERTAINTY_MM: u32 = 1_000;

/// Distribution over class labels, including an explicit `unknown` mass.
///
/// Invariants: the `unknown` entry is always present, and the masses sum to
/// exactly [`PPM_ONE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBelief {
    masses: BTreeMap<ClassLabel, Ppm>,
}

impl ClassBelief {
    /// A belief carrying all mass on `unknown`.
    #[must_use]
    pub fn uninformed() -> Self {
        let mut masses = BTreeMap::new();
        masses.insert(ClassLabel::unknown(), PPM_ONE);
        Self { masses }
    }

    /// Mass currently on `unknown`.
    #[must_use]
    pub fn unknown_mass(&self) -> Ppm {
        self.masses
            .get(&ClassLabel::unknown())
            .copied()
            .unwrap_or(0)
    }

    /// Mass on an arbitrary label.
    #[must_use]
    pub fn mass(&self, label: &ClassLabel) -> Ppm {
        self.masses.get(label).copied().unwrap_or(0)
    }

    /// Label with the largest mass; ties resolve to the lexicographically
    /// smallest label.
    #[must_use]
    pub fn dominant(&self) -> (ClassLabel, Ppm) {
        self.masses
            .iter()
            .fold(None::<(&ClassLabel, Ppm)>, |best, (label, mass)| match best {
                Some((_, best_mass)) if *mass <= best_mass => best,
                _ => Some((label, *mass)),
            })
            .map(|(label, mass)| (label.clone(), mass))
            .unwrap_or_else(|| (ClassLabel::unknown(), 0))
    }

    /// Iterates labels and masses in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClassLabel, Ppm)> {
        self.masses.iter().map(|(label, mass)| (label, *mass))
    }

    /// Copies the distribution into a plain map for snapshots.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<ClassLabel, Ppm> {
        self.masses.clone()
    }

    /// Applies one observation's class hint.
    ///
    /// The update is a convex blend of the prior toward the hint's target
    /// distribution, with blend strength `hint_strength × weight`. The prior
    /// therefore decays geometrically and no label ever saturates past the
    /// hint target. A missing hint, or a hint of `unknown`, asserts nothing
    /// and leaves the distribution untouched.
    pub fn observe(&mut self, hint: Option<&ClassLabel>, weight: Ppm, config: &FusionConfig) {
        let Some(hint) = hint else { return };
        if hint.is_unknown() {
            return;
        }
        let alpha = ppm_mul(config.hint_strength_ppm, weight);
        if alpha == 0 {
            return;
        }
        let mut updated = BTreeMap::new();
        let hint_target = PPM_ONE - HINT_RESIDUAL_PPM;
        let mut saw_hint = false;
        for (label, mass) in &self.masses {
            let target = if label == hint {
                saw_hint = true;
                hint_target
            } else if label.is_unknown() {
                HINT_RESIDUAL_PPM
            } else {
                0
            };
            updated.insert(label.clone(), ppm_lerp(*mass, target, alpha));
        }
        if !saw_hint {
            updated.insert(hint.clone(), ppm_lerp(0, hint_target, alpha));
        }
        self.masses = updated;
        self.renormalize();
        self.enforce_label_cap(config.max_class_labels);
    }

    /// Shifts mass from every non-`unknown` label toward `unknown`.
    ///
    /// The moved amount rounds up, so any positive rate eventually drains a
    /// label completely; the distribution is bounded below at full-unknown
    /// and `unknown` never decreases here.
    pub fn decay_toward_unknown(&mut self, shift_ppm: Ppm) {
        if shift_ppm == 0 {
            return;
        }
        let mut moved_total: u64 = 0;
        let mut drained: Vec<ClassLabel> = Vec::new();
        for (label, mass) in self.masses.iter_mut() {
            if label.is_unknown() || *mass == 0 {
                continue;
            }
            let exact = u64::from(*mass) * u64::from(shift_ppm);
            let moved = (exact.div_ceil(u64::from(PPM_ONE))).min(u64::from(*mass));
            *mass -= moved as Ppm;
            moved_total += moved;
            if *mass == 0 {
                drained.push(label.clone());
            }
        }
        for label in drained {
            self.masses.remove(&label);
        }
        let unknown = self.masses.entry(ClassLabel::unknown()).or_insert(0);
        *unknown = (u64::from(*unknown) + moved_total).min(u64::from(PPM_ONE)) as Ppm;
    }

    /// Rescales the distribution to sum to exactly [`PPM_ONE`] using the
    /// largest-remainder method; remainder ties resolve in label order.
    fn renormalize(&mut self) {
        let total: u64 = self.masses.values().map(|m| u64::from(*m)).sum();
        if total == u64::from(PPM_ONE) {
            self.ensure_unknown();
            return;
        }
        if total == 0 {
            *self = Self::uninformed();
            return;
        }
        let mut scaled: Vec<(ClassLabel, u64, u64)> = self
            .masses
            .iter()
            .map(|(label, mass)| {
                let numerator = u64::from(*mass) * u64::from(PPM_ONE);
                (label.clone(), numerator / total, numerator % total)
            })
            .collect();
        let assigned: u64 = scaled.iter().map(|(_, floor, _)| *floor).sum();
        let mut deficit = u64::from(PPM_ONE).saturating_sub(assigned);
        // Stable sort: equal remainders keep label order.
        let mut order: Vec<usize> = (0..scaled.len()).collect();
        order.sort_by(|&a, &b| scaled[b].2.cmp(&scaled[a].2));
        for index in order {
            if deficit == 0 {
                break;
            }
            scaled[index].1 += 1;
            deficit -= 1;
        }
        self.masses = scaled
            .into_iter()
            .filter(|(label, mass, _)| *mass > 0 || label.is_unknown())
            .map(|(label, mass, _)| (label, mass as Ppm))
            .collect();
        self.ensure_unknown();
    }

    /// Folds the smallest non-`unknown` masses back into `unknown` until at
    /// most `cap` labels remain. Mass ties drop the lexicographically later
    /// label first.
    fn enforce_label_cap(&mut self, cap: usize) {
        if self.masses.len() <= cap {
            return;
        }
        let mut candidates: Vec<(Ppm, ClassLabel)> = self
            .masses
            .iter()
            .filter(|(label, _)| !label.is_unknown())
            .map(|(label, mass)| (*mass, label.clone()))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
        let excess = self.masses.len() - cap;
        let mut folded: u64 = 0;
        for (mass, label) in candidates.into_iter().take(excess) {
            self.masses.remove(&label);
            folded += u64::from(mass);
        }
        let unknown = self.masses.entry(ClassLabel::unknown()).or_insert(0);
        *unknown = (u64::from(*unknown) + folded).min(u64::from(PPM_ONE)) as Ppm;
    }

    fn ensure_unknown(&mut self) {
        self.masses.entry(ClassLabel::unknown()).or_insert(0);
    }
}

/// Position/velocity estimate with a scalar uncertainty radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KinematicBelief {
    /// Estimated position, milli-units.
    pub position: Position,
    /// Estimated velocity, milli-units per tick.
    pub velocity: Velocity,
    /// Scalar uncertainty radius, milli-units.
    pub uncertainty_mm: u32,
}

impl KinematicBelief {
    /// Seeds kinematics from a first observation.
    #[must_use]
    pub fn from_observation(position: Position) -> Self {
        Self {
            position,
            velocity: Velocity::zero(),
            uncertainty_mm: INITIAL_UNCERTAINTY_MM,
        }
    }

    /// Fuses one matched observation.
    ///
    /// The blend factor scales linearly with the item weight between the
    /// configured floor and ceiling; velocity is re-estimated from the
    /// observed displacement over the ticks since the last match; the
    /// uncertainty radius shrinks by the blend factor down to its floor.
    pub fn fuse(
        &mut self,
        observed: Position,
        ticks_since_seen: u64,
        weight: Ppm,
        config: &FusionConfig,
    ) {
        let blend =
            config.min_blend_ppm + ppm_mul(weight, config.max_blend_ppm - config.min_blend_ppm);
        let previous = self.position;
        self.position = previous.blend_toward(observed, blend);

        let dt = ticks_since_seen.max(1) as i64;
        let observed_velocity =
            Velocity::new((observed.x - previous.x) / dt, (observed.y - previous.y) / dt);
        self.velocity = self.velocity.blend_toward(observed_velocity, blend);

        let shrink = ppm_scale_u32(self.uncertainty_mm, blend);
        self.uncertainty_mm = self
            .uncertainty_mm
            .saturating_sub(shrink)
            .max(config.min_uncertainty_mm);
    }

    /// Ages the estimate one unmatched tick: extrapolate by velocity, grow
    /// uncertainty toward the saturation cap.
    pub fn drift(&mut self, config: &DecayConfig) {
        self.position = self.position.offset(self.velocity, 1);
        self.uncertainty_mm = self
            .uncertainty_mm
            .saturating_add(config.uncertainty_growth_mm)
            .min(config.uncertainty_cap_mm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> FusionConfig {
        FusionConfig::default()
    }

    fn label(name: &str) -> ClassLabel {
        ClassLabel::new(name)
    }

    fn total(belief: &ClassBelief) -> u64 {
        belief.iter().map(|(_, m)| u64::from(m)).sum()
    }

    #[test]
    fn uninformed_is_all_unknown() {
        let belief = ClassBelief::uninformed();
        assert_eq!(belief.unknown_mass(), PPM_ONE);
        assert_eq!(total(&belief), u64::from(PPM_ONE));
        let (dominant, mass) = belief.dominant();
        assert!(dominant.is_unknown());
        assert_eq!(mass, PPM_ONE);
    }

    #[test]
    fn observe_pulls_mass_toward_hint_and_keeps_sum_exact() {
        let mut belief = ClassBelief::uninformed();
        let hostile = label("hostile");
        belief.observe(Some(&hostile), PPM_ONE, &fusion());
        assert_eq!(total(&belief), u64::from(PPM_ONE));
        assert!(belief.mass(&hostile) > 0);
        assert!(belief.unknown_mass() < PPM_ONE);

        // Converges toward the hint target with repeated confirmation.
        for _ in 0..20 {
            belief.observe(Some(&hostile), PPM_ONE, &fusion());
            assert_eq!(total(&belief), u64::from(PPM_ONE));
        }
        let (dominant, mass) = belief.dominant();
        assert_eq!(dominant, hostile);
        assert!(mass > 800_000);
        assert!(belief.unknown_mass() < 200_000);
    }

    #[test]
    fn observe_without_hint_is_identity() {
        let mut belief = ClassBelief::uninformed();
        belief.observe(Some(&label("drone")), PPM_ONE, &fusion());
        let before = belief.clone();
        belief.observe(None, PPM_ONE, &fusion());
        belief.observe(Some(&ClassLabel::unknown()), PPM_ONE, &fusion());
        assert_eq!(belief, before);
    }

    #[test]
    fn decay_is_monotonic_and_reaches_full_unknown() {
        let mut belief = ClassBelief::uninformed();
        let hostile = label("hostile");
        for _ in 0..5 {
            belief.observe(Some(&hostile), PPM_ONE, &fusion());
        }
        let mut last_unknown = belief.unknown_mass();
        for _ in 0..2_000 {
            belief.decay_toward_unknown(40_000);
            let unknown = belief.unknown_mass();
            assert!(unknown >= last_unknown);
            assert_eq!(total(&belief), u64::from(PPM_ONE));
            last_unknown = unknown;
        }
        assert_eq!(belief.unknown_mass(), PPM_ONE);
        assert_eq!(belief.mass(&hostile), 0);
    }

    #[test]
    fn dominant_ties_resolve_lexicographically() {
        let mut belief = ClassBelief::uninformed();
        // Two hints with identical trajectories produce identical masses.
        belief.observe(Some(&label("bravo")), PPM_ONE, &fusion());
        belief.observe(Some(&label("alpha")), PPM_ONE, &fusion());
        let alpha_mass = belief.mass(&label("alpha"));
        let bravo_mass = belief.mass(&label("bravo"));
        if alpha_mass == bravo_mass {
            assert_eq!(belief.dominant().0, label("alpha"));
        }
    }

    #[test]
    fn label_cap_folds_smallest_into_unknown() {
        let mut config = fusion();
        config.max_class_labels = 3;
        let mut belief = ClassBelief::uninformed();
        for name in ["a", "b", "c", "d", "e"] {
            belief.observe(Some(&label(name)), PPM_ONE, &config);
            assert!(belief.iter().count() <= 3);
            assert_eq!(total(&belief), u64::from(PPM_ONE));
        }
    }

    #[test]
    fn fuse_moves_position_and_shrinks_uncertainty() {
        let mut kin = KinematicBelief::from_observation(Position::new(0, 0));
        kin.fuse(Position::new(1_000, 0), 1, PPM_ONE, &fusion());
        assert!(kin.position.x > 0 && kin.position.x <= 1_000);
        assert!(kin.velocity.dx > 0);
        assert!(kin.uncertainty_mm >= FusionConfig::default().min_uncertainty_mm);
        assert!(kin.uncertainty_mm < INITIAL_UNCERTAINTY_MM);
    }

    #[test]
    fn drift_extrapolates_and_grows_uncertainty_to_cap() {
        let decay = DecayConfig::default();
        let mut kin = KinematicBelief::from_observation(Position::new(0, 0));
        kin.velocity = Velocity::new(10, -10);
        let mut last_uncertainty = kin.uncertainty_mm;
        for step in 1..=200u32 {
            kin.drift(&decay);
            assert_eq!(kin.position.x, i64::from(step) * 10);
            assert!(kin.uncertainty_mm >= last_uncertainty);
            assert!(kin.uncertainty_mm <= decay.uncertainty_cap_mm);
            last_uncertainty = kin.uncertainty_mm;
        }
        assert_eq!(kin.uncertainty_mm, decay.uncertainty_cap_mm);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whatever history built the distribution, decay never lowers
            /// the `unknown` mass and the sum never leaves one unit.
            #[test]
            fn decay_never_lowers_unknown_and_keeps_the_sum_exact(
                hints in proptest::collection::vec((0usize..4, 1u32..=PPM_ONE), 0..12),
                shift in 0u32..=PPM_ONE,
                steps in 1usize..50,
            ) {
                let names = ["alpha", "bravo", "charlie", "delta"];
                let config = FusionConfig::default();
                let mut belief = ClassBelief::uninformed();
                for (index, weight) in hints {
                    belief.observe(Some(&label(names[index])), weight, &config);
                    prop_assert_eq!(total(&belief), u64::from(PPM_ONE));
                }

                let mut last_unknown = belief.unknown_mass();
                for _ in 0..steps {
                    belief.decay_toward_unknown(shift);
                    prop_assert!(belief.unknown_mass() >= last_unknown);
                    prop_assert_eq!(total(&belief), u64::from(PPM_ONE));
                    last_unknown = belief.unknown_mass();
                }
            }
        }
    }
}

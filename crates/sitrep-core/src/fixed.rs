//! Fixed-point scalar types used throughout the belief substrate.
//!
//! Every quantity the engine computes on is an integer: probability-like
//! masses and weights are parts-per-million ([`Ppm`]), spatial quantities are
//! signed milli-units ([`Milli`], millimeters in practice), and squared
//! distances widen to `i128` so the gate math cannot overflow. Floating point
//! appears only inside opaque feature payloads, which the engine never
//! computes on. This keeps every state transition bit-identical across
//! platforms and replays.

use serde::{Deserialize, Serialize};

/// Parts-per-million scalar: `1_000_000` represents `1.0`.
pub type Ppm = u32;

/// The ppm representation of `1.0`.
pub const PPM_ONE: Ppm = 1_000_000;

/// Signed milli-unit coordinate (millimeters for spatial axes).
pub type Milli = i64;

/// Multiplies two ppm scalars, flooring toward zero.
#[must_use]
pub fn ppm_mul(a: Ppm, b: Ppm) -> Ppm {
    ((u64::from(a) * u64::from(b)) / u64::from(PPM_ONE)) as Ppm
}

/// Scales an unsigned magnitude by a ppm weight, flooring toward zero.
#[must_use]
pub fn ppm_scale_u32(value: u32, weight: Ppm) -> u32 {
    ((u64::from(value) * u64::from(weight)) / u64::from(PPM_ONE)) as u32
}

/// Clamps an arbitrary unsigned value into the valid ppm range.
#[must_use]
pub fn ppm_clamp(value: u64) -> Ppm {
    value.min(u64::from(PPM_ONE)) as Ppm
}

/// Linear interpolation between two ppm scalars by a ppm factor.
///
/// `factor = 0` returns `from`; `factor = PPM_ONE` returns `to`.
#[must_use]
pub fn ppm_lerp(from: Ppm, to: Ppm, factor: Ppm) -> Ppm {
    let from = i64::from(from);
    let to = i64::from(to);
    let factor = i64::from(factor);
    let blended = from + ((to - from) * factor) / i64::from(PPM_ONE);
    ppm_clamp(blended.max(0) as u64)
}

/// A 2-D position in milli-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// East axis, milli-units.
    pub x: Milli,
    /// North axis, milli-units.
    pub y: Milli,
}

impl Position {
    /// Creates a position from milli-unit coordinates.
    #[must_use]
    pub fn new(x: Milli, y: Milli) -> Self {
        Self { x, y }
    }

    /// The origin.
    #[must_use]
    pub fn origin() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Squared Euclidean distance, widened so no coordinate pair can overflow.
    #[must_use]
    pub fn distance_sq(&self, other: &Position) -> i128 {
        let dx = i128::from(self.x) - i128::from(other.x);
        let dy = i128::from(self.y) - i128::from(other.y);
        dx * dx + dy * dy
    }

    /// Moves each axis a ppm-weighted fraction of the way toward `target`.
    ///
    /// Pure integer arithmetic; truncation is toward zero, identically on
    /// every platform.
    #[must_use]
    pub fn blend_toward(&self, target: Position, factor: Ppm) -> Position {
        Position {
            x: blend_axis(self.x, target.x, factor),
            y: blend_axis(self.y, target.y, factor),
        }
    }

    /// Offsets by `velocity` applied over `ticks` ticks, saturating.
    #[must_use]
    pub fn offset(&self, velocity: Velocity, ticks: u64) -> Position {
        let ticks = i64::try_from(ticks).unwrap_or(i64::MAX);
        Position {
            x: self.x.saturating_add(velocity.dx.saturating_mul(ticks)),
            y: self.y.saturating_add(velocity.dy.saturating_mul(ticks)),
        }
    }
}

/// A 2-D velocity in milli-units per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Velocity {
    /// East axis, milli-units per tick.
    pub dx: Milli,
    /// North axis, milli-units per tick.
    pub dy: Milli,
}

impl Velocity {
    /// Creates a velocity from milli-unit-per-tick components.
    #[must_use]
    pub fn new(dx: Milli, dy: Milli) -> Self {
        Self { dx, dy }
    }

    /// Zero velocity.
    #[must_use]
    pub fn zero() -> Self {
        Self { dx: 0, dy: 0 }
    }

    /// Moves each component a ppm-weighted fraction toward `target`.
    #[must_use]
    pub fn blend_toward(&self, target: Velocity, factor: Ppm) -> Velocity {
        Velocity {
            dx: blend_axis(self.dx, target.dx, factor),
            dy: blend_axis(self.dy, target.dy, factor),
        }
    }
}

fn blend_axis(from: Milli, to: Milli, factor: Ppm) -> Milli {
    let delta = i128::from(to) - i128::from(from);
    let step = (delta * i128::from(factor)) / i128::from(PPM_ONE);
    (i128::from(from) + step) as Milli
}

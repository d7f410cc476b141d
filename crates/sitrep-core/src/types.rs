//! Identifier and enumeration types shared across the substrate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fixed::Position;

/// Logical tick counter. The engine has no wall clock; ticks advance only
/// when an evidence batch is accepted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(u64);

impl Tick {
    /// Tick zero.
    pub const ZERO: Tick = Tick(0);

    /// Wraps a raw tick number.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw tick number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Whole ticks elapsed since `earlier` (zero if `earlier` is later).
    #[must_use]
    pub fn ticks_since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an evidence source (a sensor, detector, or feed).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Wraps a source identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Content-addressed track identifier.
///
/// Derived from the spawning observation (creation tick, source, position)
/// via BLAKE3, so identical input histories always mint identical identifiers
/// and an identifier is never reused after eviction: ticks are monotonic and
/// a source contributes at most one spawn per tick.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(#[serde(with = "hex::serde")] [u8; 16]);

impl TrackId {
    /// Derives the identifier for a track spawned by the given observation.
    #[must_use]
    pub fn derive(created: Tick, source: &SourceId, position: Position) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sitrep.track.v1");
        hasher.update(&created.get().to_le_bytes());
        hasher.update(&(source.as_str().len() as u64).to_le_bytes());
        hasher.update(source.as_str().as_bytes());
        hasher.update(&position.x.to_le_bytes());
        hasher.update(&position.y.to_le_bytes());
        let digest = hasher.finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest.as_bytes()[..16]);
        Self(id)
    }

    /// Raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Full lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackId({})", self.to_hex())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for log correlation.
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// A class label in a track's belief distribution.
///
/// Labels are opaque to the engine apart from the reserved [`unknown`]
/// label, which carries the mass not attributable to any observed class.
///
/// [`unknown`]: ClassLabel::unknown
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

/// Reserved label name for unattributed belief mass.
pub const UNKNOWN_LABEL: &str = "unknown";

impl ClassLabel {
    /// Wraps a label string.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The reserved `unknown` label.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_LABEL.to_string())
    }

    /// The label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the reserved `unknown` label.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_LABEL
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClassLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An opaque feature value attached to evidence and tracks.
///
/// The engine validates finiteness at intake and otherwise only passes these
/// through to the classifier and to `new_threat` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric feature.
    Number(f64),
    /// Textual feature.
    Text(String),
}

impl FeatureValue {
    /// True when the value is a non-finite number.
    #[must_use]
    pub fn is_non_finite(&self) -> bool {
        matches!(self, FeatureValue::Number(n) if !n.is_finite())
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Declared policy for how uncertainty affects derived risk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeliefMode {
    /// Suppress classification risk while a track is too uncertain.
    #[default]
    Conservative,
    /// Let risk persist under uncertainty.
    Predictive,
}

impl fmt::Display for BeliefMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeliefMode::Conservative => write!(f, "conservative"),
            BeliefMode::Predictive => write!(f, "predictive"),
        }
    }
}

/// Track visibility lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Unconfirmed spawn; never exposed downstream.
    Provisional,
    /// Confirmed and recently observed.
    Visible,
    /// Unobserved recently; state extrapolated.
    Inferred,
    /// Unobserved long enough that the entity may be gone.
    Lost,
}

impl Visibility {
    /// True for every state except `provisional`.
    #[must_use]
    pub fn is_exposed(&self) -> bool {
        !matches!(self, Visibility::Provisional)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Provisional => write!(f, "provisional"),
            Visibility::Visible => write!(f, "visible"),
            Visibility::Inferred => write!(f, "inferred"),
            Visibility::Lost => write!(f, "lost"),
        }
    }
}

/// Discrete risk band derived from an overall risk score.
///
/// Ordering follows escalation: `Benign < Guarded < Elevated < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    /// No meaningful risk.
    Benign,
    /// Worth watching.
    Guarded,
    /// Actively concerning.
    Elevated,
    /// Requires immediate attention.
    Critical,
}

impl RiskBand {
    /// Numeric escalation rank, `0` for benign through `3` for critical.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            RiskBand::Benign => 0,
            RiskBand::Guarded => 1,
            RiskBand::Elevated => 2,
            RiskBand::Critical => 3,
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBand::Benign => write!(f, "benign"),
            RiskBand::Guarded => write!(f, "guarded"),
            RiskBand::Elevated => write!(f, "elevated"),
            RiskBand::Critical => write!(f, "critical"),
        }
    }
}

/// A 256-bit BLAKE3 content hash over canonical state bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHash(#[serde(with = "hex::serde")] [u8; 32]);

impl StateHash {
    /// The all-zero genesis hash.
    pub const ZERO: StateHash = StateHash([0u8; 32]);

    /// Wraps raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hashes arbitrary canonical bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True for the genesis hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateHash({})", self.to_hex())
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

//! Value types flowing through the pipeline.
//!
//! [`EntitySnapshot`] is produced by a source, [`Artifact`] by a
//! generator, and [`Delivery`] is what the broadcaster hands to
//! subscribers. All three are plain data: the pipeline replaces them
//! wholesale and never mutates one in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EntityStatus;
use crate::ids::EntityId;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A single scalar field on a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum FieldValue {
    /// Boolean flag (e.g. red zone).
    Bool(bool),
    /// Integer value (scores, down, distance).
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Free text (team abbreviations, clock display).
    Text(String),
}

impl FieldValue {
    /// The integer payload, if this is an integer field.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The text payload, if this is a text field.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// The latest known state of one entity at a point in time.
///
/// `observed_at` records when the source produced the snapshot. It is
/// not a tracked field: two snapshots that differ only in
/// `observed_at` are considered unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntitySnapshot {
    /// The entity this snapshot describes.
    pub id: EntityId,
    /// Lifecycle status at observation time.
    pub status: EntityStatus,
    /// Tracked scalar fields keyed by name (see [`crate::fields`]).
    pub fields: BTreeMap<String, FieldValue>,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Create a snapshot with no fields, observed now.
    pub fn new(id: EntityId, status: EntityStatus) -> Self {
        Self {
            id,
            status,
            fields: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Look up an integer field by name.
    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_int)
    }

    /// Look up a text field by name.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    /// Whether the status or any tracked field differs from `other`.
    pub fn differs_from(&self, other: &Self) -> bool {
        self.status != other.status || self.fields != other.fields
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Errors raised when constructing an [`Artifact`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    /// Confidence outside `[0, 1]` or NaN.
    #[error("confidence {0} is outside [0, 1]")]
    Confidence(f64),

    /// An alternative's probability outside `[0, 1]` or NaN.
    #[error("alternative {category} has probability {probability} outside [0, 1]")]
    Probability {
        /// Category of the offending alternative.
        category: String,
        /// The rejected probability.
        probability: f64,
    },

    /// The category label was blank.
    #[error("artifact category must not be empty")]
    EmptyCategory,
}

/// One ranked alternative in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Alternative {
    /// Category label.
    pub category: String,
    /// Independent probability estimate in `[0, 1]`.
    pub probability: f64,
}

impl Alternative {
    /// Create an alternative. Validation happens in [`Artifact::new`].
    pub fn new(category: impl Into<String>, probability: f64) -> Self {
        Self {
            category: category.into(),
            probability,
        }
    }
}

/// A prediction derived from one snapshot.
///
/// Alternatives are ranked highest probability first. Their
/// probabilities are independent top-k estimates and need not sum to 1.
///
/// Build one with [`Artifact::new`]. Deserialization applies the same
/// checks and keeps the recorded `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Artifact {
    /// Predicted category label (e.g. `run`).
    pub category: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable explanation.
    pub reasoning: String,
    /// Ranked alternatives, highest probability first.
    pub alternatives: Vec<Alternative>,
    /// When the artifact was generated.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Build a validated artifact stamped with the current time.
    ///
    /// Alternatives are sorted by descending probability; ties keep
    /// their given order.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the category is blank or any
    /// confidence/probability falls outside `[0, 1]`.
    pub fn new(
        category: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
        mut alternatives: Vec<Alternative>,
    ) -> Result<Self, ArtifactError> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(ArtifactError::EmptyCategory);
        }
        if !is_unit_interval(confidence) {
            return Err(ArtifactError::Confidence(confidence));
        }
        if let Some(bad) = alternatives
            .iter()
            .find(|alt| !is_unit_interval(alt.probability))
        {
            return Err(ArtifactError::Probability {
                category: bad.category.clone(),
                probability: bad.probability,
            });
        }
        alternatives.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        Ok(Self {
            category,
            confidence,
            reasoning: reasoning.into(),
            alternatives,
            created_at: Utc::now(),
        })
    }

    /// Whether `other` carries the same prediction, ignoring `created_at`.
    pub fn predicts_same_as(&self, other: &Self) -> bool {
        self.category == other.category
            && self.confidence.total_cmp(&other.confidence).is_eq()
            && self.reasoning == other.reasoning
            && self.alternatives == other.alternatives
    }
}

/// Wire form of [`Artifact`] before validation.
#[derive(Deserialize)]
struct UncheckedArtifact {
    category: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    alternatives: Vec<Alternative>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UncheckedArtifact> for Artifact {
    type Error = ArtifactError;

    fn try_from(raw: UncheckedArtifact) -> Result<Self, Self::Error> {
        let mut artifact = Self::new(raw.category, raw.confidence, raw.reasoning, raw.alternatives)?;
        artifact.created_at = raw.created_at;
        Ok(artifact)
    }
}

impl<'de> Deserialize<'de> for Artifact {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = UncheckedArtifact::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

fn is_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// One published update as seen by a subscriber.
///
/// `history` holds the most recent artifacts oldest first, trimmed to
/// the length the subscriber asked for (empty if it asked for none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Delivery {
    /// The entity this update concerns.
    pub entity_id: EntityId,
    /// Current snapshot.
    pub snapshot: EntitySnapshot,
    /// Most recent artifact, if one has been recorded.
    pub latest_artifact: Option<Artifact>,
    /// Requested history tail, oldest first.
    pub history: Vec<Artifact>,
    /// When the broadcaster published this update.
    pub published_at: DateTime<Utc>,
}

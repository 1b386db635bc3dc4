//! Artifact generator trait and the down-and-distance reference generator.
//!
//! For every live snapshot the poller asks an [`ArtifactGenerator`] for
//! an [`Artifact`]. Generators must be idempotent: calling one twice
//! with the same input may differ in latency or quality but never in
//! correctness. How a real model computes its prediction is outside
//! this crate; [`DownDistanceGenerator`] is a rule-based stand-in that
//! lets the pipeline run end-to-end.

use std::collections::BTreeMap;

use async_trait::async_trait;
use touchline_types::{fields, Alternative, Artifact, ArtifactError, EntityId, EntitySnapshot, PlayType};

/// Contextual hints passed alongside a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    /// Static context from configuration (e.g. `formation`).
    pub context: BTreeMap<String, String>,
    /// The entity's previous artifact, if one was recorded.
    pub previous: Option<Artifact>,
}

impl Hints {
    /// Look up a context value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

/// Errors that can occur while generating an artifact.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The snapshot lacks a field the generator needs.
    #[error("entity {entity} is missing field {field}")]
    MissingField {
        /// The entity whose snapshot was incomplete.
        entity: EntityId,
        /// The missing field name.
        field: &'static str,
    },

    /// The generator produced an out-of-range artifact.
    #[error("invalid artifact: {source}")]
    Invalid {
        /// The underlying validation error.
        #[from]
        source: ArtifactError,
    },

    /// The model backend failed.
    #[error("generator backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// A source of predictions for live snapshots.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Derive an artifact from `snapshot` and `hints`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] if no artifact can be produced for
    /// this snapshot. The failure is isolated to this entity.
    async fn generate(
        &self,
        snapshot: &EntitySnapshot,
        hints: &Hints,
    ) -> Result<Artifact, GenerationError>;
}

/// Fixed confidence reported by [`DownDistanceGenerator`].
const HEURISTIC_CONFIDENCE: f64 = 0.75;

/// Yards to go at or under which second and third down favour the run.
const SHORT_YARDAGE: i64 = 3;

/// Predicts run or pass from down and distance alone.
///
/// First down, and second or third down with three or fewer yards to
/// go, predict a run; everything else predicts a pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownDistanceGenerator;

impl DownDistanceGenerator {
    /// Create the generator.
    pub const fn new() -> Self {
        Self
    }

    fn predict(down: i64, distance: i64) -> PlayType {
        match down {
            1 => PlayType::Run,
            2 | 3 if distance <= SHORT_YARDAGE => PlayType::Run,
            _ => PlayType::Pass,
        }
    }

    fn reasoning(play: PlayType, down: i64, distance: i64) -> String {
        match play {
            PlayType::Run if down == 1 => {
                "First down - likely to run to establish the ground game".to_owned()
            }
            PlayType::Run => {
                format!("Short distance ({distance} yards) - high probability run play")
            }
            _ => format!(
                "Passing situation - {distance} yards needed on {} down",
                ordinal(down)
            ),
        }
    }
}

#[async_trait]
impl ArtifactGenerator for DownDistanceGenerator {
    async fn generate(
        &self,
        snapshot: &EntitySnapshot,
        hints: &Hints,
    ) -> Result<Artifact, GenerationError> {
        let down = require_int(snapshot, fields::DOWN)?;
        let distance = require_int(snapshot, fields::DISTANCE)?;

        let play = Self::predict(down, distance);
        let mut reasoning = Self::reasoning(play, down, distance);
        if let Some(formation) = hints.get("formation").filter(|f| *f != "unknown") {
            reasoning.push_str(&format!(" (formation: {formation})"));
        }

        let alternatives = vec![
            Alternative::new(PlayType::Run.as_str(), 0.6),
            Alternative::new(PlayType::Pass.as_str(), 0.3),
            Alternative::new(PlayType::Punt.as_str(), 0.1),
        ];

        Ok(Artifact::new(
            play.as_str(),
            HEURISTIC_CONFIDENCE,
            reasoning,
            alternatives,
        )?)
    }
}

fn require_int(snapshot: &EntitySnapshot, field: &'static str) -> Result<i64, GenerationError> {
    snapshot
        .int_field(field)
        .ok_or_else(|| GenerationError::MissingField {
            entity: snapshot.id.clone(),
            field,
        })
}

fn ordinal(n: i64) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use touchline_types::EntityStatus;

    use super::*;

    fn situation(down: i64, distance: i64) -> EntitySnapshot {
        EntitySnapshot::new(EntityId::from("G1"), EntityStatus::Live)
            .with_field(fields::DOWN, down)
            .with_field(fields::DISTANCE, distance)
    }

    async fn predict(down: i64, distance: i64) -> Artifact {
        DownDistanceGenerator::new()
            .generate(&situation(down, distance), &Hints::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_down_runs() {
        let artifact = predict(1, 10).await;
        assert_eq!(artifact.category, "run");
        assert!(artifact.reasoning.starts_with("First down"));
    }

    #[tokio::test]
    async fn short_yardage_runs_long_yardage_passes() {
        assert_eq!(predict(2, 3).await.category, "run");
        assert_eq!(predict(3, 1).await.category, "run");
        assert_eq!(predict(2, 8).await.category, "pass");
        assert_eq!(predict(4, 1).await.category, "pass");
    }

    #[tokio::test]
    async fn passing_reasoning_uses_correct_ordinal() {
        assert_eq!(
            predict(2, 8).await.reasoning,
            "Passing situation - 8 yards needed on 2nd down"
        );
        assert_eq!(
            predict(3, 12).await.reasoning,
            "Passing situation - 12 yards needed on 3rd down"
        );
    }

    #[tokio::test]
    async fn alternatives_are_ranked() {
        let artifact = predict(1, 10).await;
        let labels: Vec<&str> = artifact
            .alternatives
            .iter()
            .map(|a| a.category.as_str())
            .collect();
        assert_eq!(labels, ["run", "pass", "punt"]);
        assert!(artifact.confidence > 0.7 && artifact.confidence < 0.8);
    }

    #[tokio::test]
    async fn same_input_same_prediction() {
        let a = predict(3, 2).await;
        let b = predict(3, 2).await;
        assert!(a.predicts_same_as(&b));
    }

    #[tokio::test]
    async fn known_formation_hint_is_mentioned() {
        let hints = Hints {
            context: BTreeMap::from([("formation".to_owned(), "shotgun".to_owned())]),
            previous: None,
        };
        let artifact = DownDistanceGenerator::new()
            .generate(&situation(1, 10), &hints)
            .await
            .unwrap();
        assert!(artifact.reasoning.ends_with("(formation: shotgun)"));
    }

    #[tokio::test]
    async fn missing_down_is_an_error() {
        let snapshot = EntitySnapshot::new(EntityId::from("G1"), EntityStatus::Live);
        let result = DownDistanceGenerator::new()
            .generate(&snapshot, &Hints::default())
            .await;
        assert!(matches!(
            result,
            Err(GenerationError::MissingField { field: "down", .. })
        ));
    }
}

//! Enumeration types for the Touchline pipeline.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Entity lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a tracked entity as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum EntityStatus {
    /// Not started yet.
    Scheduled,
    /// In progress. Only live entities are polled for artifacts.
    Live,
    /// Completed normally.
    Finished,
    /// Called off before or during play.
    Cancelled,
}

impl EntityStatus {
    /// Whether the entity is currently in progress.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }

    /// Lowercase label used on the wire and in query strings.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EntityStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "live" => Ok(Self::Live),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownLabel(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Play categories
// ---------------------------------------------------------------------------

/// Category of the next play, used as the artifact label for football.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PlayType {
    /// Designed rushing play.
    Run,
    /// Forward pass attempt.
    Pass,
    /// Punt on fourth down.
    Punt,
    /// Field goal attempt.
    FieldGoal,
    /// Kickoff after a score or to open a half.
    Kickoff,
    /// Kick after a touchdown.
    ExtraPoint,
    /// Two-point try after a touchdown.
    TwoPointConversion,
    /// Team timeout.
    Timeout,
    /// Dead-ball penalty.
    Penalty,
}

impl PlayType {
    /// Snake-case label, identical to the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Pass => "pass",
            Self::Punt => "punt",
            Self::FieldGoal => "field_goal",
            Self::Kickoff => "kickoff",
            Self::ExtraPoint => "extra_point",
            Self::TwoPointConversion => "two_point_conversion",
            Self::Timeout => "timeout",
            Self::Penalty => "penalty",
        }
    }
}

impl core::fmt::Display for PlayType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("LIVE".parse::<EntityStatus>().ok(), Some(EntityStatus::Live));
        assert_eq!(
            " finished ".parse::<EntityStatus>().ok(),
            Some(EntityStatus::Finished)
        );
        assert!("halftime".parse::<EntityStatus>().is_err());
    }

    #[test]
    fn only_live_is_live() {
        assert!(EntityStatus::Live.is_live());
        assert!(!EntityStatus::Scheduled.is_live());
        assert!(!EntityStatus::Finished.is_live());
        assert!(!EntityStatus::Cancelled.is_live());
    }

    #[test]
    fn play_type_label_matches_serde() {
        let json = serde_json::to_string(&PlayType::FieldGoal).ok();
        assert_eq!(json.as_deref(), Some("\"field_goal\""));
        assert_eq!(PlayType::FieldGoal.as_str(), "field_goal");
    }
}

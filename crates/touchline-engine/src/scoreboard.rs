//! HTTP scoreboard source.
//!
//! Fetches a public scoreboard document (ESPN layout) and turns each
//! event into an [`EntitySnapshot`]. No API key is required. The source
//! never retries; a failed request becomes a [`SourceError`] and the
//! poller backs off.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use touchline_core::config::SourceConfig;
use touchline_core::source::{SnapshotSource, SourceError};
use touchline_types::{fields, EntityId, EntitySnapshot, EntityStatus};
use tracing::debug;

// ---------------------------------------------------------------------------
// Situation defaults
// ---------------------------------------------------------------------------

/// Down reported when the feed has no situation block.
const DEFAULT_DOWN: i64 = 1;
/// Yards to go reported when the feed has no situation block.
const DEFAULT_DISTANCE: i64 = 10;
/// Yard line reported when the feed has no situation block.
const DEFAULT_YARD_LINE: i64 = 20;
/// The feed never carries the play clock; this is a full one.
const DEFAULT_PLAY_CLOCK: i64 = 40;

// ---------------------------------------------------------------------------
// Scoreboard JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    // Decoded per event in `parse_scoreboard`.
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScoreboardEvent {
    id: Option<String>,
    status: Option<ScoreboardStatus>,
    #[serde(default)]
    competitions: Vec<Competition>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    #[serde(default)]
    competitors: Vec<Competitor>,
    status: Option<ScoreboardStatus>,
    situation: Option<Situation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Competitor {
    id: Option<String>,
    home_away: String,
    team: Team,
    score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Team {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreboardStatus {
    #[serde(default)]
    period: i64,
    display_clock: Option<String>,
    #[serde(default, rename = "type")]
    status_type: StatusType,
}

#[derive(Debug, Default, Deserialize)]
struct StatusType {
    #[serde(default)]
    state: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Situation {
    down: Option<i64>,
    distance: Option<i64>,
    yard_line: Option<i64>,
    possession: Option<String>,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Pulls snapshots from a scoreboard URL.
#[derive(Debug, Clone)]
pub struct ScoreboardSource {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ScoreboardSource {
    /// Build a source for `config.url` with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns the client builder's error if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("touchline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            timeout,
        })
    }

    fn request_error(&self, error: &reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            SourceError::Unreachable {
                message: format!("{}: {error}", self.url),
            }
        }
    }
}

#[async_trait]
impl SnapshotSource for ScoreboardSource {
    async fn fetch_snapshots(&self) -> Result<Vec<EntitySnapshot>, SourceError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.request_error(&e))?;

        let body = response.text().await.map_err(|e| self.request_error(&e))?;
        let snapshots = parse_scoreboard(&body)?;
        debug!(url = %self.url, events = snapshots.len(), "scoreboard fetched");
        Ok(snapshots)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a scoreboard document into snapshots.
///
/// Events that do not match the scoreboard layout, or that lack an id
/// or a home and an away competitor, are skipped. The remaining events
/// are still returned.
///
/// # Errors
///
/// Returns [`SourceError::Malformed`] if `body` is not a scoreboard
/// document.
pub fn parse_scoreboard(body: &str) -> Result<Vec<EntitySnapshot>, SourceError> {
    let response: ScoreboardResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed {
            message: e.to_string(),
        })?;
    Ok(response
        .events
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ScoreboardEvent>(raw) {
            Ok(event) => parse_event(&event),
            Err(e) => {
                debug!(error = %e, "skipping malformed scoreboard event");
                None
            }
        })
        .collect())
}

fn parse_event(event: &ScoreboardEvent) -> Option<EntitySnapshot> {
    let Some(id) = event.id.as_deref().and_then(EntityId::parse) else {
        debug!("skipping scoreboard event without id");
        return None;
    };
    let Some(competition) = event.competitions.first() else {
        debug!(entity = %id, "skipping scoreboard event without competition");
        return None;
    };
    let home = competition.competitors.iter().find(|c| c.home_away == "home");
    let away = competition.competitors.iter().find(|c| c.home_away == "away");
    let (Some(home), Some(away)) = (home, away) else {
        debug!(entity = %id, "skipping scoreboard event without both competitors");
        return None;
    };

    let status = event.status.as_ref().or(competition.status.as_ref());
    let situation = competition.situation.as_ref();

    let entity_status = status.map_or(EntityStatus::Scheduled, |s| map_status(&s.status_type));

    let mut snapshot = EntitySnapshot::new(id, entity_status)
        .with_field(fields::HOME_TEAM, home.team.abbreviation.as_str())
        .with_field(fields::AWAY_TEAM, away.team.abbreviation.as_str())
        .with_field(fields::HOME_SCORE, score(home))
        .with_field(fields::AWAY_SCORE, score(away))
        .with_field(fields::QUARTER, status.map_or(0, |s| s.period))
        .with_field(
            fields::CLOCK,
            status
                .and_then(|s| s.display_clock.as_deref())
                .unwrap_or("15:00"),
        )
        .with_field(
            fields::DOWN,
            situation.and_then(|s| s.down).filter(|d| *d > 0).unwrap_or(DEFAULT_DOWN),
        )
        .with_field(
            fields::DISTANCE,
            situation
                .and_then(|s| s.distance)
                .filter(|d| *d >= 0)
                .unwrap_or(DEFAULT_DISTANCE),
        )
        .with_field(
            fields::YARD_LINE,
            situation.and_then(|s| s.yard_line).unwrap_or(DEFAULT_YARD_LINE),
        )
        .with_field(fields::PLAY_CLOCK, DEFAULT_PLAY_CLOCK);

    // Possession is reported as a team id; store the abbreviation.
    if let Some(team_id) = situation.and_then(|s| s.possession.as_deref()) {
        let holder = [home, away]
            .into_iter()
            .find(|c| c.id.as_deref() == Some(team_id))
            .map_or(team_id, |c| c.team.abbreviation.as_str());
        snapshot = snapshot.with_field(fields::POSSESSION, holder);
    }

    Some(snapshot)
}

fn score(competitor: &Competitor) -> i64 {
    competitor
        .score
        .as_deref()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn map_status(status: &StatusType) -> EntityStatus {
    let name = status.name.to_ascii_uppercase();
    if name.contains("CANCEL") || name.contains("POSTPONE") {
        return EntityStatus::Cancelled;
    }
    match status.state.as_str() {
        "in" => EntityStatus::Live,
        "post" => EntityStatus::Finished,
        "pre" => EntityStatus::Scheduled,
        _ if name.contains("IN_PROGRESS") || name.contains("HALFTIME") => EntityStatus::Live,
        _ if name.contains("FINAL") => EntityStatus::Finished,
        _ => EntityStatus::Scheduled,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "events": [
            {
                "id": "401547001",
                "status": {
                    "period": 3,
                    "displayClock": "7:42",
                    "type": { "state": "in", "name": "STATUS_IN_PROGRESS" }
                },
                "competitions": [{
                    "competitors": [
                        { "id": "12", "homeAway": "home", "score": "17", "team": { "abbreviation": "KC" } },
                        { "id": "2", "homeAway": "away", "score": "14", "team": { "abbreviation": "BUF" } }
                    ],
                    "situation": { "down": 3, "distance": 2, "yardLine": 45, "possession": "2" }
                }]
            },
            {
                "id": "401547002",
                "status": {
                    "period": 4,
                    "displayClock": "0:00",
                    "type": { "state": "post", "name": "STATUS_FINAL" }
                },
                "competitions": [{
                    "competitors": [
                        { "homeAway": "home", "score": "24", "team": { "abbreviation": "PHI" } },
                        { "homeAway": "away", "score": "21", "team": { "abbreviation": "DAL" } }
                    ]
                }]
            },
            {
                "status": { "type": { "state": "in" } },
                "competitions": []
            },
            {
                "id": "401547004",
                "competitions": [{
                    "competitors": [
                        { "homeAway": "home", "team": { "abbreviation": "SF" } }
                    ]
                }]
            }
        ]
    }"#;

    #[test]
    fn parses_live_event_with_situation() {
        let snapshots = parse_scoreboard(SAMPLE).unwrap();
        assert_eq!(snapshots.len(), 2);

        let live = snapshots.first().unwrap();
        assert_eq!(live.id.as_str(), "401547001");
        assert_eq!(live.status, EntityStatus::Live);
        assert_eq!(live.text_field(fields::HOME_TEAM), Some("KC"));
        assert_eq!(live.int_field(fields::HOME_SCORE), Some(17));
        assert_eq!(live.int_field(fields::AWAY_SCORE), Some(14));
        assert_eq!(live.int_field(fields::QUARTER), Some(3));
        assert_eq!(live.text_field(fields::CLOCK), Some("7:42"));
        assert_eq!(live.int_field(fields::DOWN), Some(3));
        assert_eq!(live.int_field(fields::DISTANCE), Some(2));
        assert_eq!(live.int_field(fields::YARD_LINE), Some(45));
        assert_eq!(live.text_field(fields::POSSESSION), Some("BUF"));
    }

    #[test]
    fn finished_event_gets_situation_defaults() {
        let snapshots = parse_scoreboard(SAMPLE).unwrap();
        let finished = snapshots.get(1).unwrap();
        assert_eq!(finished.status, EntityStatus::Finished);
        assert_eq!(finished.int_field(fields::DOWN), Some(DEFAULT_DOWN));
        assert_eq!(finished.int_field(fields::DISTANCE), Some(DEFAULT_DISTANCE));
        assert_eq!(finished.int_field(fields::PLAY_CLOCK), Some(DEFAULT_PLAY_CLOCK));
        assert!(finished.field(fields::POSSESSION).is_none());
    }

    #[test]
    fn empty_document_has_no_events() {
        assert!(parse_scoreboard("{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_event_is_skipped_and_siblings_kept() {
        let body = r#"{
            "events": [
                {
                    "id": "401547010",
                    "status": { "period": 1, "type": { "state": "in" } },
                    "competitions": [{
                        "competitors": [
                            { "homeAway": "home", "team": { "abbreviation": "GB" } },
                            { "homeAway": "away", "team": { "abbreviation": "CHI" } }
                        ]
                    }]
                },
                {
                    "id": "401547011",
                    "competitions": [{
                        "competitors": [
                            { "homeAway": "home", "team": { "displayName": "TBD" } },
                            { "homeAway": "away", "team": { "abbreviation": "NYJ" } }
                        ]
                    }]
                }
            ]
        }"#;
        let snapshots = parse_scoreboard(body).unwrap();
        assert_eq!(snapshots.len(), 1);
        let kept = snapshots.first().unwrap();
        assert_eq!(kept.id.as_str(), "401547010");
        assert_eq!(kept.status, EntityStatus::Live);
        assert_eq!(kept.text_field(fields::HOME_TEAM), Some("GB"));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_scoreboard("<html>rate limited</html>"),
            Err(SourceError::Malformed { .. })
        ));
    }

    #[test]
    fn status_mapping() {
        let status = |state: &str, name: &str| StatusType {
            state: state.to_owned(),
            name: name.to_owned(),
        };
        assert_eq!(map_status(&status("in", "STATUS_HALFTIME")), EntityStatus::Live);
        assert_eq!(map_status(&status("pre", "STATUS_SCHEDULED")), EntityStatus::Scheduled);
        assert_eq!(map_status(&status("post", "STATUS_POSTPONED")), EntityStatus::Cancelled);
        assert_eq!(map_status(&status("", "STATUS_FINAL")), EntityStatus::Finished);
        assert_eq!(map_status(&status("", "")), EntityStatus::Scheduled);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_source_error() {
        let source = ScoreboardSource::new(&SourceConfig {
            url: "http://127.0.0.1:9/scoreboard".to_owned(),
            request_timeout_ms: 2_000,
        })
        .unwrap();
        let result = source.fetch_snapshots().await;
        assert!(matches!(
            result,
            Err(SourceError::Unreachable { .. } | SourceError::Timeout { .. })
        ));
    }
}

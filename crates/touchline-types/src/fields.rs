//! Well-known snapshot field names for football games.
//!
//! Sources are free to add other fields; these are the ones the
//! reference generator and the observer read.

/// Home team abbreviation (text).
pub const HOME_TEAM: &str = "home_team";
/// Away team abbreviation (text).
pub const AWAY_TEAM: &str = "away_team";
/// Home team score (integer).
pub const HOME_SCORE: &str = "home_score";
/// Away team score (integer).
pub const AWAY_SCORE: &str = "away_score";
/// Current quarter, 1-based (integer).
pub const QUARTER: &str = "quarter";
/// Game clock as displayed, e.g. `"12:41"` (text).
pub const CLOCK: &str = "clock";
/// Current down, 1-4 (integer).
pub const DOWN: &str = "down";
/// Yards to go for a first down (integer).
pub const DISTANCE: &str = "distance";
/// Line of scrimmage (integer).
pub const YARD_LINE: &str = "yard_line";
/// Team in possession (text).
pub const POSSESSION: &str = "possession";
/// Seconds left on the play clock (integer).
pub const PLAY_CLOCK: &str = "play_clock";

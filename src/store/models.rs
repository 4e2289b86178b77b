/// Persisted entities and request shapes
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::{BattingStats, BowlingStats};
use crate::error::EntityKind;

/// Anything stored in a keyed collection
pub trait Entity: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync {
    const KIND: EntityKind;
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerRole {
    Batsman,
    Bowler,
    AllRounder,
    WicketKeeper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub role: PlayerRole,
    pub team_id: Option<String>,
    pub batting_stats: BattingStats,
    pub bowling_stats: BowlingStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Player {
    const KIND: EntityKind = EntityKind::Player;
    const COLLECTION: &'static str = "players";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    /// Ordered, no duplicates
    pub player_ids: Vec<String>,
    pub match_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn has_player(&self, player_id: &str) -> bool {
        self.player_ids.iter().any(|p| p == player_id)
    }
}

impl Entity for Team {
    const KIND: EntityKind = EntityKind::Team;
    const COLLECTION: &'static str = "teams";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
}

impl Venue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: None,
        }
    }

    pub fn in_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl Default for Venue {
    fn default() -> Self {
        Self::new("Local Ground")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl MatchStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamSide {
    TeamA,
    TeamB,
}

impl TeamSide {
    pub fn other(&self) -> TeamSide {
        match self {
            TeamSide::TeamA => TeamSide::TeamB,
            TeamSide::TeamB => TeamSide::TeamA,
        }
    }
}

pub const DEFAULT_TOTAL_OVERS: u32 = 20;
pub const BALLS_PER_OVER: u32 = 6;
pub const WICKETS_PER_INNINGS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub team_a_id: String,
    pub team_b_id: String,
    pub venue: Venue,
    pub status: MatchStatus,
    pub current_innings: u8,
    pub batting_side: TeamSide,
    /// Side that batted in the first innings; decides runs vs wickets margins
    pub first_batting_side: TeamSide,
    pub current_over: u32,
    pub current_ball: u32,
    pub team_a_score: u32,
    pub team_a_wickets: u32,
    pub team_b_score: u32,
    pub team_b_wickets: u32,
    pub total_overs: u32,
    /// Set when a ball event was edited or deleted after logging; cleared by
    /// `MatchStore::recompute_match_score`
    #[serde(default)]
    pub score_stale: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn team_id(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::TeamA => &self.team_a_id,
            TeamSide::TeamB => &self.team_b_id,
        }
    }

    pub fn side_of(&self, team_id: &str) -> Option<TeamSide> {
        if self.team_a_id == team_id {
            Some(TeamSide::TeamA)
        } else if self.team_b_id == team_id {
            Some(TeamSide::TeamB)
        } else {
            None
        }
    }

    pub fn batting_team_id(&self) -> &str {
        self.team_id(self.batting_side)
    }

    pub fn bowling_team_id(&self) -> &str {
        self.team_id(self.batting_side.other())
    }

    pub fn score(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::TeamA => self.team_a_score,
            TeamSide::TeamB => self.team_b_score,
        }
    }

    pub fn wickets(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::TeamA => self.team_a_wickets,
            TeamSide::TeamB => self.team_b_wickets,
        }
    }

    pub(crate) fn add_to_side(&mut self, side: TeamSide, runs: u32, wickets: u32) {
        match side {
            TeamSide::TeamA => {
                self.team_a_score += runs;
                self.team_a_wickets += wickets;
            }
            TeamSide::TeamB => {
                self.team_b_score += runs;
                self.team_b_wickets += wickets;
            }
        }
    }

    /// Legal deliveries bowled in the current innings
    pub fn balls_bowled(&self) -> u32 {
        self.current_over * BALLS_PER_OVER + self.current_ball
    }

    /// "over.ball" notation, e.g. "12.3"
    pub fn overs_display(&self) -> String {
        format!("{}.{}", self.current_over, self.current_ball)
    }

    pub fn is_live(&self) -> bool {
        self.status == MatchStatus::InProgress
    }
}

impl Entity for Match {
    const KIND: EntityKind = EntityKind::Match;
    const COLLECTION: &'static str = "matches";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BallOutcome {
    Dot,
    Runs,
    Four,
    Six,
    Wide,
    NoBall,
    Bye,
    LegBye,
    Wicket,
}

impl BallOutcome {
    /// Wides and no-balls do not count towards the over
    pub fn is_legal(&self) -> bool {
        !matches!(self, BallOutcome::Wide | BallOutcome::NoBall)
    }

    /// Outcome implied by the raw numbers when the caller gives none
    pub fn infer(runs: u32, is_wicket: bool) -> Self {
        if is_wicket {
            return BallOutcome::Wicket;
        }
        match runs {
            0 => BallOutcome::Dot,
            4 => BallOutcome::Four,
            6 => BallOutcome::Six,
            _ => BallOutcome::Runs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WicketType {
    Bowled,
    Caught,
    Lbw,
    RunOut,
    Stumped,
    HitWicket,
}

impl WicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WicketType::Bowled => "bowled",
            WicketType::Caught => "caught",
            WicketType::Lbw => "lbw",
            WicketType::RunOut => "run out",
            WicketType::Stumped => "stumped",
            WicketType::HitWicket => "hit wicket",
        }
    }
}

impl From<crate::rules::DismissalType> for WicketType {
    fn from(value: crate::rules::DismissalType) -> Self {
        use crate::rules::DismissalType;
        match value {
            DismissalType::Bowled => WicketType::Bowled,
            DismissalType::Caught => WicketType::Caught,
            DismissalType::Lbw => WicketType::Lbw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    Camera,
    Manual,
}

/// Provenance details, one closed variant per source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EventMetadata {
    Camera(CameraMetadata),
    Manual(ManualMetadata),
}

impl EventMetadata {
    pub fn source(&self) -> EventSource {
        match self {
            EventMetadata::Camera(_) => EventSource::Camera,
            EventMetadata::Manual(_) => EventSource::Manual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMetadata {
    pub version: u32,
    pub confidence: f32,
    /// Rule that fired, e.g. "six" or "bowled"
    pub rule: String,
    #[serde(default)]
    pub frame_index: Option<u64>,
}

impl CameraMetadata {
    pub const VERSION: u32 = 1;

    pub fn new(rule: impl Into<String>, confidence: f32) -> Self {
        Self {
            version: Self::VERSION,
            confidence,
            rule: rule.into(),
            frame_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualMetadata {
    pub version: u32,
    #[serde(default)]
    pub entered_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ManualMetadata {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            entered_by: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Default for ManualMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallEvent {
    pub id: String,
    /// Store-assigned, strictly increasing in logging order
    pub sequence: u64,
    pub match_id: String,
    pub innings: u8,
    pub over: u32,
    pub ball: u32,
    pub batting_team_id: String,
    pub batsman_id: String,
    pub bowler_id: String,
    pub runs: u32,
    pub extras: u32,
    pub outcome: BallOutcome,
    pub is_wicket: bool,
    pub wicket_type: Option<WicketType>,
    pub dismissed_player_id: Option<String>,
    #[serde(default)]
    pub fielder_ids: Vec<String>,
    pub source: EventSource,
    pub metadata: Option<EventMetadata>,
    pub created_at: DateTime<Utc>,
}

impl BallEvent {
    pub fn total_runs(&self) -> u32 {
        self.runs + self.extras
    }

    /// Wicket that counts in the bowler's figures; run-outs do not
    pub fn is_bowler_wicket(&self) -> bool {
        self.is_wicket && self.wicket_type != Some(WicketType::RunOut)
    }

    /// Player out on this ball: the named player, else the striker
    pub fn dismissed_player(&self) -> Option<&str> {
        if !self.is_wicket {
            return None;
        }
        Some(
            self.dismissed_player_id
                .as_deref()
                .unwrap_or(self.batsman_id.as_str()),
        )
    }

    /// Short text for score feeds, e.g. "FOUR" or "WICKET (caught)"
    pub fn description(&self) -> String {
        if self.is_wicket {
            return match self.wicket_type {
                Some(kind) => format!("WICKET ({})", kind.as_str()),
                None => "WICKET".to_string(),
            };
        }
        match self.outcome {
            BallOutcome::Dot => "Dot ball".to_string(),
            BallOutcome::Four => "FOUR".to_string(),
            BallOutcome::Six => "SIX".to_string(),
            BallOutcome::Wide => format!("Wide (+{})", self.total_runs()),
            BallOutcome::NoBall => format!("No ball (+{})", self.total_runs()),
            BallOutcome::Bye | BallOutcome::LegBye => format!("{} bye(s)", self.total_runs()),
            BallOutcome::Runs | BallOutcome::Wicket => format!("{} run(s)", self.runs),
        }
    }
}

impl Entity for BallEvent {
    const KIND: EntityKind = EntityKind::BallEvent;
    const COLLECTION: &'static str = "ball_events";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePlayerRequest {
    pub name: String,
    pub role: PlayerRole,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl CreatePlayerRequest {
    pub fn new(name: impl Into<String>, role: PlayerRole) -> Self {
        Self {
            name: name.into(),
            role,
            team_id: None,
        }
    }

    pub fn in_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub player_ids: Vec<String>,
}

impl CreateTeamRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            player_ids: Vec::new(),
        }
    }

    pub fn with_players(mut self, player_ids: Vec<String>) -> Self {
        self.player_ids = player_ids;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    pub team_a_id: String,
    pub team_b_id: String,
    pub venue: Venue,
    #[serde(default)]
    pub total_overs: Option<u32>,
}

impl CreateMatchRequest {
    pub fn new(team_a_id: impl Into<String>, team_b_id: impl Into<String>) -> Self {
        Self {
            team_a_id: team_a_id.into(),
            team_b_id: team_b_id.into(),
            venue: Venue::default(),
            total_overs: None,
        }
    }

    pub fn at(mut self, venue: Venue) -> Self {
        self.venue = venue;
        self
    }

    pub fn overs(mut self, total_overs: u32) -> Self {
        self.total_overs = Some(total_overs);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBallEventRequest {
    pub match_id: String,
    pub batsman_id: String,
    pub bowler_id: String,
    pub runs: u32,
    #[serde(default)]
    pub extras: u32,
    #[serde(default)]
    pub outcome: Option<BallOutcome>,
    #[serde(default)]
    pub is_wicket: bool,
    #[serde(default)]
    pub wicket_type: Option<WicketType>,
    #[serde(default)]
    pub dismissed_player_id: Option<String>,
    #[serde(default)]
    pub fielder_ids: Vec<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

impl LogBallEventRequest {
    pub fn new(
        match_id: impl Into<String>,
        batsman_id: impl Into<String>,
        bowler_id: impl Into<String>,
        runs: u32,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            batsman_id: batsman_id.into(),
            bowler_id: bowler_id.into(),
            runs,
            extras: 0,
            outcome: None,
            is_wicket: false,
            wicket_type: None,
            dismissed_player_id: None,
            fielder_ids: Vec::new(),
            source: None,
            metadata: None,
        }
    }

    pub fn outcome(mut self, outcome: BallOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn extras(mut self, extras: u32) -> Self {
        self.extras = extras;
        self
    }

    pub fn wicket(mut self, wicket_type: WicketType) -> Self {
        self.is_wicket = true;
        self.wicket_type = Some(wicket_type);
        self
    }

    pub fn dismissed(mut self, player_id: impl Into<String>) -> Self {
        self.dismissed_player_id = Some(player_id.into());
        self
    }

    pub fn fielders(mut self, fielder_ids: Vec<String>) -> Self {
        self.fielder_ids = fielder_ids;
        self
    }

    pub fn metadata(mut self, metadata: EventMetadata) -> Self {
        self.source = Some(metadata.source());
        self.metadata = Some(metadata);
        self
    }

    /// Explicit outcome, else inferred from runs and wicket flag
    pub fn resolved_outcome(&self) -> BallOutcome {
        self.outcome
            .unwrap_or_else(|| BallOutcome::infer(self.runs, self.is_wicket))
    }

    /// Explicit source, else the metadata's, else manual
    pub fn resolved_source(&self) -> EventSource {
        self.source
            .or_else(|| self.metadata.as_ref().map(EventMetadata::source))
            .unwrap_or(EventSource::Manual)
    }
}

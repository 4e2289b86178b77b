/// Live scoring
///
/// ```text
/// CricketEvent / ManualDelivery
///        │
///        ▼
/// LiveScoringEngine ──log_ball_event──> MatchStore
///        │  innings end? switch_innings / end_match
///        ├──> EventBus<LiveScore>    (snapshot after every mutation)
///        └──> EventBus<ScoreUpdate>  (RUNS, WICKET, OVER_COMPLETE, ...)
/// ```

pub mod engine;
pub mod live_score;

pub use engine::{
    AppliedBall, EnginePhase, InningsEnd, LiveScoringEngine, ManualDelivery, ScoringOptions,
};
pub use live_score::LiveScore;

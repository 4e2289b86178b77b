/// Match data store
///
/// Durable entity store for players, teams, matches and ball-by-ball events,
/// plus the statistics derived from them.
///
/// ```text
/// MatchStore
///   ├── Collection<Player | Team | Match | BallEvent>   write-through image
///   ├── KeyValueStore   current_match / preferences / live_score
///   └── StorageBackend  MemoryBackend | FileBackend (<key>.json)
/// ```
///
/// Player stats are recomputed only by `update_player_stats`; match totals
/// are kept live by `log_ball_event` and rebuilt by `recompute_match_score`
/// after a manual correction.

pub mod backend;
pub mod collection;
pub mod kv;
pub mod models;
pub mod repository;
pub mod stats;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use collection::Collection;
pub use kv::{KeyValueStore, CAREER_KEY, CURRENT_MATCH_KEY, LIVE_SCORE_KEY, PREFERENCES_KEY};
pub use models::*;
pub use repository::{MatchStore, StoreCounts};
pub use stats::{
    overs_from_balls, BattingStats, BowlingFigures, BowlingStats, MatchSummary, Winner,
};

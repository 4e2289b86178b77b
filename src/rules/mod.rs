/// Rule engine module
///
/// Converts per-frame detection snapshots into debounced cricket events.
///
/// ```text
/// AllDetections ──> RuleEngine
///                     ├── cooldown gate
///                     ├── TrajectoryBuffer (ball samples, ground flag)
///                     ├── dismissal rules: bowled → caught → lbw
///                     └── scoring rules: six / four
///                   ──> Option<CricketEvent>
/// ```

pub mod config;
pub mod engine;
pub mod trajectory;

pub use config::{RuleConfidence, RuleConfig};
pub use engine::{BoundaryType, CricketEvent, DismissalType, RuleEngine, RuleStats};
pub use trajectory::{TrajectoryBuffer, TrajectorySample};

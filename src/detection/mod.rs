/// Detection module
///
/// Turns camera frames into typed, confidence-scored cricket detections.
///
/// ## Architecture
///
/// ```text
/// DetectionEngine
///   ├── ObjectModel (black box: frame → labelled boxes)
///   ├── LabelMap (model vocabulary → cricket classes)
///   ├── PositionClassifier (batsman heuristic)
///   └── Detectors (run concurrently by detect_all)
///       ├── detect_ball
///       ├── detect_bat
///       ├── detect_players
///       ├── detect_stumps
///       └── detect_boundary
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use cricket_live::detection::{DetectionEngine, DetectionThresholds, ScriptedModel};
///
/// let mut engine = DetectionEngine::new(Box::new(model), DetectionThresholds::default());
/// engine.initialize()?;
///
/// let snapshot = engine.detect_all(&frame)?;
/// if let Some(ball) = snapshot.ball {
///     println!("Ball at {:?} ({:.2})", ball.center, ball.confidence);
/// }
/// ```

pub mod classifier;
pub mod engine;
pub mod model;
pub mod types;

// Re-export commonly used types
pub use classifier::{PositionClassifier, ThirdsClassifier};
pub use engine::{DetectionEngine, DetectionStats, DetectionThresholds};
pub use model::{LabelMap, ObjectModel, RawDetection, ScriptedModel};
pub use types::{AllDetections, BoundingBox, Detection, DetectionClass, PlayerDetection, Point};

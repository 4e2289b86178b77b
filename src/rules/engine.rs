/// Rule engine
///
/// Interprets a stream of detection snapshots as discrete cricket events.
/// At most one event comes out of any call, and none within the cooldown
/// window of the previous one.
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::config::RuleConfig;
use super::trajectory::{TrajectoryBuffer, TrajectorySample};
use crate::detection::{AllDetections, Detection, Point};
use crate::utils::Cooldown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryType {
    Four,
    Six,
}

impl BoundaryType {
    pub fn runs(&self) -> u32 {
        match self {
            BoundaryType::Four => 4,
            BoundaryType::Six => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DismissalType {
    Bowled,
    Caught,
    Lbw,
}

impl DismissalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissalType::Bowled => "bowled",
            DismissalType::Caught => "caught",
            DismissalType::Lbw => "lbw",
        }
    }
}

/// Discrete event emitted by the rule engine
#[derive(Debug, Clone, PartialEq)]
pub enum CricketEvent {
    Scoring {
        runs: u32,
        boundary_type: BoundaryType,
        confidence: f32,
        timestamp: Instant,
    },
    Dismissal {
        dismissal_type: DismissalType,
        /// Camera detections carry no player identity, so this is empty
        /// unless a caller fills it in
        fielder_ids: Vec<String>,
        confidence: f32,
        timestamp: Instant,
    },
}

impl CricketEvent {
    pub fn confidence(&self) -> f32 {
        match self {
            CricketEvent::Scoring { confidence, .. } => *confidence,
            CricketEvent::Dismissal { confidence, .. } => *confidence,
        }
    }

    pub fn timestamp(&self) -> Instant {
        match self {
            CricketEvent::Scoring { timestamp, .. } => *timestamp,
            CricketEvent::Dismissal { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_dismissal(&self) -> bool {
        matches!(self, CricketEvent::Dismissal { .. })
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CricketEvent::Scoring {
                boundary_type: BoundaryType::Six,
                ..
            } => "SIX! Cleared the rope".to_string(),
            CricketEvent::Scoring {
                boundary_type: BoundaryType::Four,
                ..
            } => "FOUR! Raced to the boundary".to_string(),
            CricketEvent::Dismissal { dismissal_type, .. } => match dismissal_type {
                DismissalType::Bowled => "WICKET! Bowled".to_string(),
                DismissalType::Caught => "WICKET! Caught".to_string(),
                DismissalType::Lbw => "WICKET! LBW".to_string(),
            },
        }
    }
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleStats {
    pub snapshots_processed: u64,
    pub rejected_by_cooldown: u64,
    pub events_emitted: u64,
}

pub struct RuleEngine {
    config: RuleConfig,
    trajectory: TrajectoryBuffer,
    cooldown: Cooldown,
    last_event: Option<CricketEvent>,
    stats: RuleStats,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self {
            trajectory: TrajectoryBuffer::new(config.max_trajectory),
            cooldown: Cooldown::new(config.cooldown_ms),
            config,
            last_event: None,
            stats: RuleStats::default(),
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn trajectory(&self) -> &TrajectoryBuffer {
        &self.trajectory
    }

    pub fn last_event(&self) -> Option<&CricketEvent> {
        self.last_event.as_ref()
    }

    pub fn stats(&self) -> RuleStats {
        self.stats
    }

    /// Forget trajectory, cooldown and last event (new delivery/new match)
    pub fn reset(&mut self) {
        self.trajectory.clear();
        self.cooldown.reset();
        self.last_event = None;
    }

    /// Evaluate one snapshot; returns the single event it produced, if any
    pub fn process_detections(&mut self, snapshot: &AllDetections) -> Option<CricketEvent> {
        self.stats.snapshots_processed += 1;
        let now = snapshot.timestamp;

        if self.cooldown.is_cooling(now) {
            self.stats.rejected_by_cooldown += 1;
            return None;
        }

        if let Some(ball) = &snapshot.ball {
            let sample = self.sample_for(ball, snapshot);
            self.trajectory.push(sample);
        }

        let event = self
            .check_dismissal(snapshot, now)
            .or_else(|| self.check_scoring(now))?;

        self.emit(event, now)
    }

    fn emit(&mut self, event: CricketEvent, now: Instant) -> Option<CricketEvent> {
        info!(
            "Rule engine event: {} (confidence {:.2}, {} trajectory samples)",
            event.description(),
            event.confidence(),
            self.trajectory.len()
        );
        self.trajectory.clear();
        self.cooldown.trigger(now);
        self.stats.events_emitted += 1;
        self.last_event = Some(event.clone());
        Some(event)
    }

    fn sample_for(&self, ball: &Detection, snapshot: &AllDetections) -> TrajectorySample {
        let width = snapshot.frame_width as f32;
        let height = snapshot.frame_height as f32;
        let position = ball.center;

        let on_ground = position.y >= self.config.ground_line * height;
        let in_boundary_zone = position.y <= self.config.boundary_top * height
            || position.x <= self.config.boundary_side * width
            || position.x >= (1.0 - self.config.boundary_side) * width;

        TrajectorySample {
            position,
            on_ground,
            in_boundary_zone,
            timestamp: snapshot.timestamp,
        }
    }

    /// Bowled, then caught, then LBW
    fn check_dismissal(&self, snapshot: &AllDetections, now: Instant) -> Option<CricketEvent> {
        let ball = snapshot.ball.as_ref()?;
        let confidence = &self.config.confidence;

        let dismissal = |dismissal_type, confidence| CricketEvent::Dismissal {
            dismissal_type,
            fielder_ids: Vec::new(),
            confidence,
            timestamp: now,
        };

        if snapshot.stumps.iter().any(|s| ball.bbox.intersects(&s.bbox)) {
            return Some(dismissal(DismissalType::Bowled, confidence.bowled));
        }

        if !self.trajectory.has_ground_contact() {
            let near_fielder = snapshot.fielders().any(|f| {
                ball.center.distance_to(&f.detection.center) <= self.config.catch_distance_px
            });
            if near_fielder {
                return Some(dismissal(DismissalType::Caught, confidence.caught));
            }
        }

        if let Some(batsman) = snapshot.batsman() {
            let near_batsman = ball.center.distance_to(&batsman.detection.center)
                <= self.config.hit_distance_px;
            if near_batsman && self.projection_hits_stumps(snapshot) {
                return Some(dismissal(DismissalType::Lbw, confidence.lbw));
            }
        }

        None
    }

    fn projection_hits_stumps(&self, snapshot: &AllDetections) -> bool {
        let projected: Vec<Point> = self.trajectory.project(self.config.lbw_projection_steps);
        debug!(points = projected.len(), "lbw projection");
        projected
            .iter()
            .any(|p| snapshot.stumps.iter().any(|s| s.bbox.contains(p)))
    }

    fn check_scoring(&self, now: Instant) -> Option<CricketEvent> {
        let boundary_idx = self.trajectory.first_boundary_index()?;

        let (boundary_type, confidence) = if self.trajectory.grounded_before(boundary_idx) {
            (BoundaryType::Four, self.config.confidence.four)
        } else {
            (BoundaryType::Six, self.config.confidence.six)
        };

        Some(CricketEvent::Scoring {
            runs: boundary_type.runs(),
            boundary_type,
            confidence,
            timestamp: now,
        })
    }
}

/// Detection engine
///
/// Runs the object model on a frame and turns raw labelled boxes into typed
/// cricket detections, one detector per class.
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use super::classifier::{PositionClassifier, ThirdsClassifier};
use super::model::{LabelMap, ObjectModel, RawDetection};
use super::types::{AllDetections, Detection, DetectionClass, PlayerDetection};
use crate::capture::Frame;
use crate::error::DetectionError;

/// Per-class confidence thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    pub ball: f32,
    pub bat: f32,
    pub player: f32,
    pub stumps: f32,
    pub boundary: f32,
    /// Bats are long and thin: height / width must exceed this
    pub bat_min_aspect_ratio: f32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            ball: 0.6,
            bat: 0.5,
            player: 0.6,
            stumps: 0.5,
            boundary: 0.5,
            bat_min_aspect_ratio: 1.5,
        }
    }
}

impl DetectionThresholds {
    pub fn for_class(&self, class: DetectionClass) -> f32 {
        match class {
            DetectionClass::Ball => self.ball,
            DetectionClass::Bat => self.bat,
            DetectionClass::Player => self.player,
            DetectionClass::Stumps => self.stumps,
            DetectionClass::Boundary => self.boundary,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for class in DetectionClass::ALL {
            let value = self.for_class(class);
            if !(0.0..=1.0).contains(&value) {
                return Err(format!(
                    "{} threshold {} must be within 0.0-1.0",
                    class.as_str(),
                    value
                ));
            }
        }
        if self.bat_min_aspect_ratio <= 0.0 {
            return Err("bat_min_aspect_ratio must be positive".to_string());
        }
        Ok(())
    }
}

/// Accumulated observability counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionStats {
    pub inference_calls: u64,
    pub snapshots: u64,
    pub total_inference_ms: f64,
    pub last_inference_ms: f64,
    pub detections_by_class: HashMap<DetectionClass, u64>,
    confidence_sum: f64,
    confidence_count: u64,
}

impl DetectionStats {
    pub fn average_inference_ms(&self) -> f64 {
        if self.inference_calls == 0 {
            0.0
        } else {
            self.total_inference_ms / self.inference_calls as f64
        }
    }

    pub fn average_confidence(&self) -> f64 {
        if self.confidence_count == 0 {
            0.0
        } else {
            self.confidence_sum / self.confidence_count as f64
        }
    }

    pub fn total_detections(&self) -> u64 {
        self.detections_by_class.values().sum()
    }

    fn record_inference(&mut self, elapsed_ms: f64) {
        self.inference_calls += 1;
        self.total_inference_ms += elapsed_ms;
        self.last_inference_ms = elapsed_ms;
    }

    fn record_detection(&mut self, detection: &Detection) {
        *self.detections_by_class.entry(detection.class).or_insert(0) += 1;
        self.confidence_sum += f64::from(detection.confidence);
        self.confidence_count += 1;
    }
}

pub struct DetectionEngine {
    model: Box<dyn ObjectModel>,
    classifier: Box<dyn PositionClassifier>,
    labels: LabelMap,
    thresholds: DetectionThresholds,
    initialized: bool,
    stats: Mutex<DetectionStats>,
}

impl DetectionEngine {
    /// Create an engine around a model; call [`DetectionEngine::initialize`] before detecting
    pub fn new(model: Box<dyn ObjectModel>, thresholds: DetectionThresholds) -> Self {
        Self {
            model,
            classifier: Box::new(ThirdsClassifier),
            labels: LabelMap::default(),
            thresholds,
            initialized: false,
            stats: Mutex::new(DetectionStats::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn PositionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_labels(mut self, labels: LabelMap) -> Self {
        self.labels = labels;
        self
    }

    /// Load the model. Must succeed before any detect call.
    pub fn initialize(&mut self) -> Result<(), DetectionError> {
        if self.initialized {
            return Ok(());
        }
        let started = Instant::now();
        self.model.load()?;
        self.initialized = true;
        info!(
            "✓ Detection model '{}' loaded in {:.1} ms (classifier: {})",
            self.model.name(),
            started.elapsed().as_secs_f64() * 1000.0,
            self.classifier.name()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: DetectionThresholds) {
        self.thresholds = thresholds;
    }

    pub fn get_stats(&self) -> DetectionStats {
        self.stats.lock().clone()
    }

    /// Highest-confidence ball above threshold
    pub fn detect_ball(&self, frame: &Frame) -> Result<Option<Detection>, DetectionError> {
        let candidates = self.candidates(frame, DetectionClass::Ball)?;
        Ok(self.best(candidates))
    }

    /// Highest-confidence bat that is also tall and thin
    pub fn detect_bat(&self, frame: &Frame) -> Result<Option<Detection>, DetectionError> {
        let min_ratio = self.thresholds.bat_min_aspect_ratio;
        let candidates = self
            .candidates(frame, DetectionClass::Bat)?
            .into_iter()
            .filter(|d| d.bbox.aspect_ratio() > min_ratio)
            .collect();
        Ok(self.best(candidates))
    }

    /// All players above threshold, tagged with the batsman heuristic
    pub fn detect_players(&self, frame: &Frame) -> Result<Vec<PlayerDetection>, DetectionError> {
        let players: Vec<PlayerDetection> = self
            .candidates(frame, DetectionClass::Player)?
            .into_iter()
            .map(|detection| PlayerDetection {
                is_batsman: self.classifier.is_batsman(
                    &detection.bbox,
                    frame.width(),
                    frame.height(),
                ),
                detection,
            })
            .collect();

        let mut stats = self.stats.lock();
        for player in &players {
            stats.record_detection(&player.detection);
        }
        Ok(players)
    }

    /// All stump sets above threshold
    pub fn detect_stumps(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let stumps = self.candidates(frame, DetectionClass::Stumps)?;
        let mut stats = self.stats.lock();
        for detection in &stumps {
            stats.record_detection(detection);
        }
        Ok(stumps)
    }

    /// Highest-confidence boundary marker above threshold
    pub fn detect_boundary(&self, frame: &Frame) -> Result<Option<Detection>, DetectionError> {
        let candidates = self.candidates(frame, DetectionClass::Boundary)?;
        Ok(self.best(candidates))
    }

    /// Run all five detectors concurrently and merge into one snapshot
    pub fn detect_all(&self, frame: &Frame) -> Result<AllDetections, DetectionError> {
        self.ensure_initialized()?;

        let ((ball, bat), ((players, stumps), boundary)) = rayon::join(
            || rayon::join(|| self.detect_ball(frame), || self.detect_bat(frame)),
            || {
                rayon::join(
                    || rayon::join(|| self.detect_players(frame), || self.detect_stumps(frame)),
                    || self.detect_boundary(frame),
                )
            },
        );

        let snapshot = AllDetections {
            ball: ball?,
            bat: bat?,
            players: players?,
            stumps: stumps?,
            boundary: boundary?,
            frame_index: frame.index,
            frame_width: frame.width(),
            frame_height: frame.height(),
            timestamp: frame.captured_at,
        };

        self.stats.lock().snapshots += 1;
        debug!(
            frame = frame.index,
            ball = snapshot.ball.is_some(),
            players = snapshot.players.len(),
            stumps = snapshot.stumps.len(),
            "detection snapshot"
        );

        Ok(snapshot)
    }

    fn ensure_initialized(&self) -> Result<(), DetectionError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DetectionError::NotInitialized)
        }
    }

    /// Run inference and keep the detections of one class above its threshold
    fn candidates(
        &self,
        frame: &Frame,
        class: DetectionClass,
    ) -> Result<Vec<Detection>, DetectionError> {
        self.ensure_initialized()?;

        let started = Instant::now();
        let raw = self.model.infer(frame)?;
        self.stats
            .lock()
            .record_inference(started.elapsed().as_secs_f64() * 1000.0);

        let threshold = self.thresholds.for_class(class);
        Ok(raw
            .iter()
            .filter(|r| r.score >= threshold)
            .filter(|r| self.labels.classify(&r.label) == Some(class))
            .map(|r: &RawDetection| Detection::new(class, r.score, r.bbox))
            .collect())
    }

    fn best(&self, candidates: Vec<Detection>) -> Option<Detection> {
        let best = candidates
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
        self.stats.lock().record_detection(&best);
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::model::ScriptedModel;
    use crate::detection::types::BoundingBox;
    use image::RgbaImage;

    fn frame() -> Frame {
        Frame::new(RgbaImage::new(640, 480), 1)
    }

    fn engine_with(detections: Vec<RawDetection>) -> DetectionEngine {
        let model = ScriptedModel::new(vec![detections]);
        let mut engine = DetectionEngine::new(Box::new(model), DetectionThresholds::default());
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn test_not_initialized_fails_loudly() {
        let engine = DetectionEngine::new(
            Box::new(ScriptedModel::new(vec![])),
            DetectionThresholds::default(),
        );
        assert!(matches!(
            engine.detect_ball(&frame()),
            Err(DetectionError::NotInitialized)
        ));
        assert!(matches!(
            engine.detect_all(&frame()),
            Err(DetectionError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_propagates_load_failure() {
        let mut engine =
            DetectionEngine::new(Box::new(ScriptedModel::broken()), DetectionThresholds::default());
        assert!(engine.initialize().is_err());
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_ball_threshold_and_best_pick() {
        let engine = engine_with(vec![
            RawDetection::new("sports ball", 0.55, BoundingBox::new(0.0, 0.0, 8.0, 8.0)),
            RawDetection::new("sports ball", 0.7, BoundingBox::new(10.0, 10.0, 8.0, 8.0)),
            RawDetection::new("sports ball", 0.9, BoundingBox::new(20.0, 20.0, 8.0, 8.0)),
        ]);

        let ball = engine.detect_ball(&frame()).unwrap().unwrap();
        assert_eq!(ball.confidence, 0.9);
        assert_eq!(ball.bbox.x, 20.0);
    }

    #[test]
    fn test_ball_below_threshold_is_none() {
        let engine = engine_with(vec![RawDetection::new(
            "sports ball",
            0.59,
            BoundingBox::new(0.0, 0.0, 8.0, 8.0),
        )]);
        assert!(engine.detect_ball(&frame()).unwrap().is_none());
    }

    #[test]
    fn test_bat_aspect_ratio_filter() {
        let engine = engine_with(vec![
            // Wide object (e.g. a bench) with higher score
            RawDetection::new("baseball bat", 0.95, BoundingBox::new(0.0, 0.0, 100.0, 20.0)),
            RawDetection::new("baseball bat", 0.6, BoundingBox::new(50.0, 50.0, 10.0, 60.0)),
        ]);

        let bat = engine.detect_bat(&frame()).unwrap().unwrap();
        assert_eq!(bat.confidence, 0.6);
    }

    #[test]
    fn test_players_batsman_heuristic() {
        let engine = engine_with(vec![
            RawDetection::new("person", 0.9, BoundingBox::new(300.0, 330.0, 40.0, 100.0)),
            RawDetection::new("person", 0.8, BoundingBox::new(40.0, 40.0, 40.0, 100.0)),
            RawDetection::new("person", 0.3, BoundingBox::new(500.0, 40.0, 40.0, 100.0)),
        ]);

        let players = engine.detect_players(&frame()).unwrap();
        assert_eq!(players.len(), 2);
        assert!(players[0].is_batsman);
        assert!(!players[1].is_batsman);
    }

    #[test]
    fn test_detect_all_snapshot() {
        let engine = engine_with(vec![
            RawDetection::new("sports ball", 0.8, BoundingBox::new(310.0, 200.0, 10.0, 10.0)),
            RawDetection::new("person", 0.9, BoundingBox::new(300.0, 330.0, 40.0, 100.0)),
            RawDetection::new("stumps", 0.7, BoundingBox::new(315.0, 420.0, 12.0, 40.0)),
            RawDetection::new("boundary", 0.6, BoundingBox::new(0.0, 0.0, 640.0, 20.0)),
        ]);

        let snapshot = engine.detect_all(&frame()).unwrap();
        assert!(snapshot.ball.is_some());
        assert!(snapshot.bat.is_none());
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.stumps.len(), 1);
        assert!(snapshot.boundary.is_some());
        assert_eq!(snapshot.frame_index, 1);
        assert_eq!((snapshot.frame_width, snapshot.frame_height), (640, 480));

        let stats = engine.get_stats();
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.inference_calls, 5);
        assert_eq!(stats.total_detections(), 4);
        assert!(stats.average_confidence() > 0.7);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let mut model = ScriptedModel::new(vec![vec![]]).failing_inference();
        model.load().unwrap();
        let mut engine = DetectionEngine::new(Box::new(model), DetectionThresholds::default());
        engine.initialize().unwrap();

        assert!(matches!(
            engine.detect_all(&frame()),
            Err(DetectionError::InferenceFailed { .. })
        ));
    }

    #[test]
    fn test_threshold_validation() {
        let mut thresholds = DetectionThresholds::default();
        assert!(thresholds.validate().is_ok());
        thresholds.ball = 1.5;
        assert!(thresholds.validate().is_err());
    }
}

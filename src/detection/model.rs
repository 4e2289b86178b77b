/// Object model boundary
///
/// The classifier behind detection is a black box: a frame goes in and
/// labelled, scored boxes come out. Everything cricket-specific happens
/// after this point.
use serde::{Deserialize, Serialize};

use super::types::{BoundingBox, DetectionClass};
use crate::capture::Frame;
use crate::error::DetectionError;

/// Raw model output before class mapping and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }
}

/// Frame → labelled boxes oracle
pub trait ObjectModel: Send + Sync {
    /// Load weights/resources. Called once by `DetectionEngine::initialize`.
    fn load(&mut self) -> Result<(), DetectionError>;

    fn infer(&self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError>;

    /// Get model name (for logging)
    fn name(&self) -> &str;
}

/// Maps model label vocabularies onto cricket classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMap {
    pub ball: Vec<String>,
    pub bat: Vec<String>,
    pub player: Vec<String>,
    pub stumps: Vec<String>,
    pub boundary: Vec<String>,
}

impl Default for LabelMap {
    fn default() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(|s| s.to_string()).collect();
        Self {
            ball: owned(&["sports ball", "ball", "cricket ball"]),
            bat: owned(&["baseball bat", "bat", "cricket bat"]),
            player: owned(&["person", "player"]),
            stumps: owned(&["stumps", "wicket"]),
            boundary: owned(&["boundary", "boundary rope"]),
        }
    }
}

impl LabelMap {
    pub fn classify(&self, label: &str) -> Option<DetectionClass> {
        let label = label.trim().to_lowercase();
        let matches = |labels: &[String]| labels.iter().any(|l| *l == label);

        if matches(&self.ball) {
            Some(DetectionClass::Ball)
        } else if matches(&self.bat) {
            Some(DetectionClass::Bat)
        } else if matches(&self.player) {
            Some(DetectionClass::Player)
        } else if matches(&self.stumps) {
            Some(DetectionClass::Stumps)
        } else if matches(&self.boundary) {
            Some(DetectionClass::Boundary)
        } else {
            None
        }
    }
}

/// Model that replays a fixed sequence of outputs
///
/// Frame `n` (1-based index from the frame source) receives script entry
/// `(n - 1) % len`. Used by the demo binary and tests in place of a real
/// network.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    script: Vec<Vec<RawDetection>>,
    loaded: bool,
    fail_load: bool,
    fail_inference: bool,
}

impl ScriptedModel {
    pub fn new(script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// A model whose `load` always fails
    pub fn broken() -> Self {
        Self {
            fail_load: true,
            ..Default::default()
        }
    }

    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }
}

impl ObjectModel for ScriptedModel {
    fn load(&mut self) -> Result<(), DetectionError> {
        if self.fail_load {
            return Err(DetectionError::ModelLoadFailed(
                "scripted model configured to fail".into(),
            ));
        }
        self.loaded = true;
        Ok(())
    }

    fn infer(&self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError> {
        if !self.loaded {
            return Err(DetectionError::NotInitialized);
        }
        if self.fail_inference {
            return Err(DetectionError::InferenceFailed {
                frame_index: frame.index,
                source: "scripted inference failure".into(),
            });
        }
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let slot = (frame.index.saturating_sub(1) as usize) % self.script.len();
        Ok(self.script[slot].clone())
    }

    fn name(&self) -> &str {
        "ScriptedModel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_label_map_classification() {
        let labels = LabelMap::default();
        assert_eq!(labels.classify("sports ball"), Some(DetectionClass::Ball));
        assert_eq!(labels.classify(" Baseball Bat "), Some(DetectionClass::Bat));
        assert_eq!(labels.classify("person"), Some(DetectionClass::Player));
        assert_eq!(labels.classify("stumps"), Some(DetectionClass::Stumps));
        assert_eq!(labels.classify("boundary rope"), Some(DetectionClass::Boundary));
        assert_eq!(labels.classify("dog"), None);
    }

    #[test]
    fn test_scripted_model_cycles() {
        let mut model = ScriptedModel::new(vec![
            vec![RawDetection::new("ball", 0.9, BoundingBox::default())],
            vec![],
        ]);
        model.load().unwrap();

        let frame = |index| Frame::new(RgbaImage::new(4, 4), index);
        assert_eq!(model.infer(&frame(1)).unwrap().len(), 1);
        assert_eq!(model.infer(&frame(2)).unwrap().len(), 0);
        assert_eq!(model.infer(&frame(3)).unwrap().len(), 1);
    }

    #[test]
    fn test_scripted_model_requires_load() {
        let model = ScriptedModel::new(vec![]);
        let frame = Frame::new(RgbaImage::new(4, 4), 1);
        assert!(matches!(
            model.infer(&frame),
            Err(DetectionError::NotInitialized)
        ));
    }

    #[test]
    fn test_broken_model_fails_to_load() {
        let mut model = ScriptedModel::broken();
        assert!(matches!(
            model.load(),
            Err(DetectionError::ModelLoadFailed(_))
        ));
    }
}

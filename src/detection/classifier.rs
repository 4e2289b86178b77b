/// Player role classification
///
/// Decides whether a detected player is the batsman. The default strategy is
/// purely positional; a tracker or pose model can replace it without touching
/// the rule engine.
use super::types::BoundingBox;

pub trait PositionClassifier: Send + Sync {
    fn is_batsman(&self, bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> bool;

    /// Get classifier name (for logging)
    fn name(&self) -> &'static str;
}

/// Batsman = player centred in the horizontal middle third and the bottom
/// half of the frame (broadcast end-on camera). An approximation only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThirdsClassifier;

impl PositionClassifier for ThirdsClassifier {
    fn is_batsman(&self, bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> bool {
        let center = bbox.center();
        let width = frame_width as f32;
        let height = frame_height as f32;

        let in_middle_third = center.x > width / 3.0 && center.x < width * 2.0 / 3.0;
        let in_bottom_half = center.y > height / 2.0;

        in_middle_third && in_bottom_half
    }

    fn name(&self) -> &'static str {
        "ThirdsClassifier"
    }
}

/// Detection types
///
/// Geometry is in frame pixels with the origin at the top-left corner and
/// y growing downwards.
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned box `[x, y, width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_array(arr: [f32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Box of the given size centred on `center`
    pub fn centered_at(center: Point, width: f32, height: f32) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Height over width; zero-width boxes report 0
    pub fn aspect_ratio(&self) -> f32 {
        if self.width <= 0.0 {
            0.0
        } else {
            self.height / self.width
        }
    }

    /// Overlap test; touching edges count as intersecting
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Ball,
    Bat,
    Player,
    Stumps,
    Boundary,
}

impl DetectionClass {
    pub const ALL: [DetectionClass; 5] = [
        DetectionClass::Ball,
        DetectionClass::Bat,
        DetectionClass::Player,
        DetectionClass::Stumps,
        DetectionClass::Boundary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::Ball => "ball",
            DetectionClass::Bat => "bat",
            DetectionClass::Player => "player",
            DetectionClass::Stumps => "stumps",
            DetectionClass::Boundary => "boundary",
        }
    }
}

/// One confidence-scored, positioned detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: DetectionClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub center: Point,
}

impl Detection {
    pub fn new(class: DetectionClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class,
            confidence,
            bbox,
            center: bbox.center(),
        }
    }
}

/// Player detection with the heuristic batsman flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerDetection {
    pub detection: Detection,
    pub is_batsman: bool,
}

/// Everything detected in one frame
#[derive(Debug, Clone)]
pub struct AllDetections {
    pub ball: Option<Detection>,
    pub bat: Option<Detection>,
    pub players: Vec<PlayerDetection>,
    pub stumps: Vec<Detection>,
    pub boundary: Option<Detection>,
    pub frame_index: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub timestamp: Instant,
}

impl AllDetections {
    /// Snapshot with nothing detected
    pub fn empty(frame_width: u32, frame_height: u32, timestamp: Instant) -> Self {
        Self {
            ball: None,
            bat: None,
            players: Vec::new(),
            stumps: Vec::new(),
            boundary: None,
            frame_index: 0,
            frame_width,
            frame_height,
            timestamp,
        }
    }

    pub fn with_ball_at(mut self, center: Point, confidence: f32) -> Self {
        self.ball = Some(Detection::new(
            DetectionClass::Ball,
            confidence,
            BoundingBox::centered_at(center, 10.0, 10.0),
        ));
        self
    }

    pub fn with_player(mut self, bbox: BoundingBox, is_batsman: bool) -> Self {
        self.players.push(PlayerDetection {
            detection: Detection::new(DetectionClass::Player, 0.9, bbox),
            is_batsman,
        });
        self
    }

    pub fn with_stumps(mut self, bbox: BoundingBox) -> Self {
        self.stumps
            .push(Detection::new(DetectionClass::Stumps, 0.9, bbox));
        self
    }

    pub fn batsman(&self) -> Option<&PlayerDetection> {
        self.players.iter().find(|p| p.is_batsman)
    }

    pub fn fielders(&self) -> impl Iterator<Item = &PlayerDetection> {
        self.players.iter().filter(|p| !p.is_batsman)
    }

    pub fn is_empty(&self) -> bool {
        self.ball.is_none()
            && self.bat.is_none()
            && self.players.is_empty()
            && self.stumps.is_empty()
            && self.boundary.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center_and_array() {
        let bbox = BoundingBox::from_array([10.0, 20.0, 30.0, 40.0]);
        assert_eq!(bbox.center(), Point::new(25.0, 40.0));
        assert_eq!(bbox.as_array(), [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(bbox.aspect_ratio(), 40.0 / 30.0);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        let c = BoundingBox::new(20.0, 20.0, 5.0, 5.0);
        let touching = BoundingBox::new(10.0, 0.0, 5.0, 5.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&touching));
    }

    #[test]
    fn test_zero_width_aspect_ratio() {
        assert_eq!(BoundingBox::new(0.0, 0.0, 0.0, 10.0).aspect_ratio(), 0.0);
    }

    #[test]
    fn test_point_distance() {
        assert_eq!(Point::new(0.0, 0.0).distance_to(&Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_snapshot_roles() {
        let snapshot = AllDetections::empty(640, 480, Instant::now())
            .with_player(BoundingBox::new(300.0, 300.0, 40.0, 100.0), true)
            .with_player(BoundingBox::new(50.0, 50.0, 40.0, 100.0), false);

        assert!(snapshot.batsman().is_some());
        assert_eq!(snapshot.fielders().count(), 1);
        assert!(!snapshot.is_empty());
        assert!(AllDetections::empty(640, 480, Instant::now()).is_empty());
    }
}

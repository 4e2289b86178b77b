use std::collections::VecDeque;
use std::time::Instant;

use crate::detection::Point;

/// One ball position sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub position: Point,
    pub on_ground: bool,
    pub in_boundary_zone: bool,
    pub timestamp: Instant,
}

/// Bounded history of recent ball positions, oldest first
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    samples: VecDeque<TrajectorySample>,
    capacity: usize,
}

impl TrajectoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once over capacity
    pub fn push(&mut self, sample: TrajectorySample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectorySample> {
        self.samples.iter()
    }

    pub fn last(&self) -> Option<&TrajectorySample> {
        self.samples.back()
    }

    pub fn has_ground_contact(&self) -> bool {
        self.samples.iter().any(|s| s.on_ground)
    }

    /// Index of the first sample inside the boundary zone
    pub fn first_boundary_index(&self) -> Option<usize> {
        self.samples.iter().position(|s| s.in_boundary_zone)
    }

    /// Whether the ball touched the ground at or before sample `index`
    pub fn grounded_before(&self, index: usize) -> bool {
        self.samples.iter().take(index + 1).any(|s| s.on_ground)
    }

    /// Linear extrapolation from the last two samples, `steps` points ahead
    pub fn project(&self, steps: u32) -> Vec<Point> {
        let n = self.samples.len();
        if n < 2 {
            return Vec::new();
        }
        let prev = self.samples[n - 2].position;
        let last = self.samples[n - 1].position;
        let dx = last.x - prev.x;
        let dy = last.y - prev.y;

        (1..=steps)
            .map(|k| Point::new(last.x + dx * k as f32, last.y + dy * k as f32))
            .collect()
    }
}

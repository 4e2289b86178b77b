use serde::{Deserialize, Serialize};

/// Rule engine tuning
///
/// Zone thresholds are fractions of the frame size; distances are pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Minimum gap between two emitted events
    pub cooldown_ms: u64,

    /// Ball samples kept in the trajectory buffer
    pub max_trajectory: usize,

    /// Samples at or below this fraction of frame height are on the ground
    pub ground_line: f32,

    /// Samples above this fraction of frame height are in the boundary zone
    pub boundary_top: f32,

    /// Samples within this fraction of either side edge are in the boundary zone
    pub boundary_side: f32,

    /// Ball-to-fielder distance for a catch
    pub catch_distance_px: f32,

    /// Ball-to-batsman distance for a pad impact
    pub hit_distance_px: f32,

    /// Steps the LBW projection is extrapolated from the last two samples
    pub lbw_projection_steps: u32,

    pub confidence: RuleConfidence,
}

/// Confidence reported for each event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfidence {
    pub bowled: f32,
    pub caught: f32,
    pub lbw: f32,
    pub six: f32,
    pub four: f32,
}

impl Default for RuleConfidence {
    fn default() -> Self {
        Self {
            bowled: 0.9,
            caught: 0.75,
            // Projection-based, weakest evidence of all
            lbw: 0.5,
            six: 0.85,
            four: 0.8,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 500,
            max_trajectory: 30,
            ground_line: 0.8,
            boundary_top: 0.1,
            boundary_side: 0.05,
            catch_distance_px: 50.0,
            hit_distance_px: 60.0,
            lbw_projection_steps: 5,
            confidence: RuleConfidence::default(),
        }
    }
}

impl RuleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.cooldown_ms == 0 {
            return Err("cooldown_ms must be greater than 0".to_string());
        }
        if self.max_trajectory < 2 {
            return Err("max_trajectory must hold at least 2 samples".to_string());
        }
        if !(0.0..=1.0).contains(&self.ground_line) {
            return Err(format!("ground_line {} must be within 0.0-1.0", self.ground_line));
        }
        if !(0.0..=1.0).contains(&self.boundary_top) || self.boundary_top >= self.ground_line {
            return Err(format!(
                "boundary_top {} must be within 0.0-1.0 and above the ground line",
                self.boundary_top
            ));
        }
        if !(0.0..0.5).contains(&self.boundary_side) {
            return Err(format!(
                "boundary_side {} must be within 0.0-0.5",
                self.boundary_side
            ));
        }
        if self.catch_distance_px <= 0.0 || self.hit_distance_px <= 0.0 {
            return Err("catch/hit distances must be positive".to_string());
        }
        Ok(())
    }
}

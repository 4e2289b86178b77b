use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Duration, Instant};

/// Cooldown helper to prevent rapid repeated triggers
///
/// Time is passed in by the caller so the window follows the timestamps of
/// the frames being processed rather than the wall clock.
#[derive(Debug, Clone)]
pub struct Cooldown {
    last_trigger: Option<Instant>,
    window: Duration,
}

impl Cooldown {
    /// Create a new cooldown with specified window in milliseconds
    pub fn new(window_ms: u64) -> Self {
        Self {
            last_trigger: None,
            window: Duration::from_millis(window_ms),
        }
    }

    /// True while `now` is still inside the window opened by the last trigger
    pub fn is_cooling(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => false,
            Some(last) => now.saturating_duration_since(last) < self.window,
        }
    }

    /// Open a new window starting at `now`
    pub fn trigger(&mut self, now: Instant) {
        self.last_trigger = Some(now);
    }

    /// Check-and-trigger in one step
    /// Returns true if we should trigger, false if still in the cooldown window
    pub fn should_trigger(&mut self, now: Instant) -> bool {
        if self.is_cooling(now) {
            return false;
        }
        self.trigger(now);
        true
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reset the cooldown
    pub fn reset(&mut self) {
        self.last_trigger = None;
    }
}

/// Generate an entity id: `<prefix>_<epoch millis>_<9 random alphanumerics>`
pub fn generate_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("{}_{}_{}", prefix, millis, suffix)
}

/// Timing measurements for a single frame-loop iteration
#[derive(Debug, Clone, Copy)]
pub struct IterationTiming {
    pub capture_us: f64,
    pub detect_us: f64,
    pub rules_us: f64,
    pub scoring_us: f64,
    pub total_us: f64,
}

impl IterationTiming {
    pub fn new() -> Self {
        Self {
            capture_us: 0.0,
            detect_us: 0.0,
            rules_us: 0.0,
            scoring_us: 0.0,
            total_us: 0.0,
        }
    }

    pub fn total_ms(&self) -> f64 {
        self.total_us / 1000.0
    }
}

impl Default for IterationTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one stage: (mean, p50, p95, p99) in microseconds
pub type StageStats = (f64, f64, f64, f64);

/// Statistics collector for latency measurements
#[derive(Debug, Default)]
pub struct LatencyStats {
    timings: Vec<IterationTiming>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            timings: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timings: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, timing: IterationTiming) {
        self.timings.push(timing);
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx]
    }

    /// Calculate statistics for a specific stage
    pub fn stage_stats(&self, extract: impl Fn(&IterationTiming) -> f64) -> StageStats {
        if self.timings.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut values: Vec<f64> = self.timings.iter().map(&extract).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let p50 = Self::percentile(&values, 50.0);
        let p95 = Self::percentile(&values, 95.0);
        let p99 = Self::percentile(&values, 99.0);

        (mean, p50, p95, p99)
    }

    /// Log a per-stage latency report
    pub fn log_report(&self) {
        if self.timings.is_empty() {
            tracing::info!("No timing data collected");
            return;
        }

        tracing::info!("Frame loop latency over {} iterations", self.timings.len());

        let stages: [(&str, StageStats); 5] = [
            ("capture", self.stage_stats(|t| t.capture_us)),
            ("detect", self.stage_stats(|t| t.detect_us)),
            ("rules", self.stage_stats(|t| t.rules_us)),
            ("scoring", self.stage_stats(|t| t.scoring_us)),
            ("total", self.stage_stats(|t| t.total_us)),
        ];

        for (name, stats) in &stages {
            tracing::info!(
                "  {:<8} mean {:>8.0} µs | p50 {:>8.0} µs | p95 {:>8.0} µs | p99 {:>8.0} µs",
                name,
                stats.0,
                stats.1,
                stats.2,
                stats.3
            );
        }

        if let Some((name, stats)) = stages[..4]
            .iter()
            .max_by(|a, b| a.1 .2.total_cmp(&b.1 .2))
        {
            tracing::info!("  bottleneck: {} ({:.0} µs p95)", name, stats.2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(100);

        // First trigger should succeed
        assert!(cooldown.should_trigger(start));

        // Immediate second trigger should fail
        assert!(!cooldown.should_trigger(start + Duration::from_millis(10)));

        // After the window
        assert!(cooldown.should_trigger(start + Duration::from_millis(110)));
    }

    #[test]
    fn test_cooldown_reset() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(100);

        assert!(cooldown.should_trigger(start));
        assert!(cooldown.is_cooling(start));

        cooldown.reset();

        assert!(!cooldown.is_cooling(start));
        assert!(cooldown.should_trigger(start));
    }

    #[test]
    fn test_cooldown_ignores_earlier_timestamps() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut cooldown = Cooldown::new(100);
        cooldown.trigger(start);

        // Out-of-order timestamp saturates to zero elapsed
        assert!(cooldown.is_cooling(start - Duration::from_millis(500)));
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("player");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "player");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);

        assert_ne!(generate_id("player"), generate_id("player"));
    }

    #[test]
    fn test_iteration_timing_total_ms() {
        let mut timing = IterationTiming::new();
        timing.total_us = 50000.0;

        assert_eq!(timing.total_ms(), 50.0);
    }

    #[test]
    fn test_latency_stats_percentiles() {
        let mut stats = LatencyStats::with_capacity(10);
        assert!(stats.is_empty());

        for i in 1..=10 {
            let mut timing = IterationTiming::new();
            timing.total_us = i as f64 * 1000.0;
            stats.add(timing);
        }

        assert_eq!(stats.len(), 10);
        let (mean, p50, _, p99) = stats.stage_stats(|t| t.total_us);
        assert_eq!(mean, 5500.0);
        assert_eq!(p50, 6000.0);
        assert_eq!(p99, 10000.0);
    }
}

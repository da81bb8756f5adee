//! Tick budget monitoring
//!
//! Tracks how much of the fixed tick budget the simulation uses. The status is
//! reported by the headless binary and exported as a metric gauge.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Performance status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    /// Comfortably inside the budget
    Good,
    /// Above 70% of the budget
    Warning,
    /// At or over the budget; ticks start running late
    Critical,
}

impl PerformanceStatus {
    /// Numeric code for the metrics gauge
    pub fn code(self) -> u64 {
        match self {
            PerformanceStatus::Good => 0,
            PerformanceStatus::Warning => 1,
            PerformanceStatus::Critical => 2,
        }
    }
}

/// Rolling window of tick durations
pub struct PerformanceMonitor {
    tick_durations: VecDeque<Duration>,
    max_samples: usize,
    target_tick_duration: Duration,
    warning_threshold: f32,
    critical_threshold: f32,
    status: PerformanceStatus,
    tick_start: Option<Instant>,
    last_entity_count: usize,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        let target_tick_duration = Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32);
        // ~2 seconds of samples
        let max_samples = (tick_rate.max(1) * 2) as usize;

        Self {
            tick_durations: VecDeque::with_capacity(max_samples),
            max_samples,
            target_tick_duration,
            warning_threshold: 0.7,
            critical_threshold: 1.0,
            status: PerformanceStatus::Good,
            tick_start: None,
            last_entity_count: 0,
        }
    }

    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Close the timing window; returns the measured duration
    pub fn tick_end(&mut self, entity_count: usize) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let duration = start.elapsed();
        self.record_tick(duration);
        self.last_entity_count = entity_count;
        Some(duration)
    }

    pub fn record_tick(&mut self, duration: Duration) {
        self.tick_durations.push_back(duration);
        while self.tick_durations.len() > self.max_samples {
            self.tick_durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        // Not enough data yet
        if self.tick_durations.len() < 10 {
            return;
        }

        let ratio = self.budget_usage_percent() / 100.0;
        self.status = if ratio < self.warning_threshold {
            PerformanceStatus::Good
        } else if ratio < self.critical_threshold {
            PerformanceStatus::Warning
        } else {
            PerformanceStatus::Critical
        };
    }

    pub fn average_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.tick_durations.iter().sum();
        sum / self.tick_durations.len() as u32
    }

    #[inline]
    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    /// Average tick time as a percentage of the budget (may exceed 100)
    pub fn budget_usage_percent(&self) -> f32 {
        let avg = self.average_tick_duration();
        (avg.as_secs_f32() / self.target_tick_duration.as_secs_f32()) * 100.0
    }

    #[inline]
    pub fn last_entity_count(&self) -> usize {
        self.last_entity_count
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, {} characters",
            self.status,
            self.budget_usage_percent(),
            self.last_entity_count
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(crate::game::constants::physics::TICK_RATE)
    }
}

//! Auto-scaling policy.
//!
//! The controller samples queue depth and processing latency on its own
//! cadence, never per event. Decisions are rate-limited by a cooldown so
//! the pool does not oscillate around a watermark.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Grow,
    Shrink,
    Hold,
}

/// Watermark-and-cooldown scaling policy.
pub struct ScaleController {
    high_water: f64,
    low_water: f64,
    latency_target: Duration,
    cooldown: Duration,
    min_workers: usize,
    max_workers: usize,
    last_action: Option<Instant>,
}

impl ScaleController {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            high_water: config.scale_high_water,
            low_water: config.scale_low_water,
            latency_target: config.latency_target,
            cooldown: config.scale_cooldown,
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            last_action: None,
        }
    }

    /// Decide from the current samples. `Grow`/`Shrink` arm the cooldown;
    /// `Hold` leaves it untouched.
    pub fn decide(
        &mut self,
        now: Instant,
        workers: usize,
        depth_ratio: f64,
        mean_latency: Duration,
    ) -> ScaleDecision {
        if let Some(last) = self.last_action
            && now.duration_since(last) < self.cooldown
        {
            return ScaleDecision::Hold;
        }

        let pressured = depth_ratio > self.high_water || mean_latency > self.latency_target;
        let idle = depth_ratio < self.low_water;

        let decision = if pressured && workers < self.max_workers {
            ScaleDecision::Grow
        } else if idle && workers > self.min_workers {
            ScaleDecision::Shrink
        } else {
            ScaleDecision::Hold
        };

        if decision != ScaleDecision::Hold {
            debug!(
                ?decision,
                workers,
                depth_ratio,
                mean_latency_us = mean_latency.as_micros() as u64,
                "scaling decision"
            );
            self.last_action = Some(now);
        }
        decision
    }
}

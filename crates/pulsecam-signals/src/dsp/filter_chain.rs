//! Adaptive filter chain
//!
//! baseline removal -> adaptive Kalman -> Savitzky-Golay -> baseline re-added

use super::kalman::{AdaptiveKalman, KalmanState};
use super::savgol::SavitzkyGolay;
use crate::config::FilterConfig;
use crate::error::ConfigError;

pub struct AdaptiveFilterChain {
    baseline_factor: f32,
    baseline: Option<f32>,
    kalman: AdaptiveKalman,
    smoother: SavitzkyGolay,
    last_ac: f32,
}

impl AdaptiveFilterChain {
    /// Fails on an even or out-of-range smoothing window
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        if !(0.9..=0.999).contains(&config.baseline_factor) {
            return Err(ConfigError::invalid("baseline_factor must be in [0.9, 0.999]"));
        }
        Ok(Self {
            baseline_factor: config.baseline_factor,
            baseline: None,
            kalman: AdaptiveKalman::new(config),
            smoother: SavitzkyGolay::new(config.sg_window_size)?,
            last_ac: 0.0,
        })
    }

    /// Filter one raw sample (red level). Returns smoothed AC + baseline.
    pub fn filter(&mut self, raw: f32) -> f32 {
        if !raw.is_finite() {
            return self.baseline.unwrap_or(0.0) + self.last_ac;
        }

        let f = self.baseline_factor;
        let baseline = match self.baseline {
            Some(b) => b * f + raw * (1.0 - f),
            None => raw,
        };
        self.baseline = Some(baseline);

        let estimate = self.kalman.update(raw - baseline);
        self.last_ac = self.smoother.push(estimate);
        self.last_ac + baseline
    }

    /// Smoothed AC component of the last sample
    pub fn last_ac(&self) -> f32 {
        self.last_ac
    }

    pub fn baseline(&self) -> f32 {
        self.baseline.unwrap_or(0.0)
    }

    pub fn state(&self) -> KalmanState {
        self.kalman.state()
    }

    pub fn reset(&mut self) {
        self.baseline = None;
        self.kalman.reset();
        self.smoother.reset();
        self.last_ac = 0.0;
    }
}

//! Scalar Kalman filter with adaptive noise estimation.
//!
//! Random-walk model on the baseline-removed PPG sample. R and Q are
//! periodically re-estimated from the recent input:
//! - R = var(second differences) / 6 (white noise contributes 6σ² there)
//! - Q = var(first differences) - 2R

use std::collections::VecDeque;

use serde::Serialize;

use super::stats;
use crate::config::FilterConfig;

const P_EPSILON: f32 = 1e-9;

/// Snapshot of the filter state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KalmanState {
    /// Estimate
    pub x: f32,
    /// Error covariance, always > 0
    pub p: f32,
    /// Measurement variance
    pub r: f32,
    /// Process variance
    pub q: f32,
}

#[derive(Debug, Clone)]
pub struct AdaptiveKalman {
    state: KalmanState,
    initial_r: f32,
    initial_q: f32,
    adaptive: bool,
    adapt_interval: usize,
    adapt_min_samples: usize,
    r_bounds: [f32; 2],
    q_bounds: [f32; 2],
    recent: VecDeque<f32>,
    capacity: usize,
    since_adapt: usize,
}

impl AdaptiveKalman {
    pub fn new(config: &FilterConfig) -> Self {
        let capacity = (config.adapt_min_samples * 2).max(config.adapt_interval);
        Self {
            state: KalmanState {
                x: 0.0,
                p: 1.0,
                r: config.kalman_r,
                q: config.kalman_q,
            },
            initial_r: config.kalman_r,
            initial_q: config.kalman_q,
            adaptive: config.adaptive,
            adapt_interval: config.adapt_interval.max(1),
            adapt_min_samples: config.adapt_min_samples,
            r_bounds: config.r_bounds,
            q_bounds: config.q_bounds,
            recent: VecDeque::with_capacity(capacity),
            capacity,
            since_adapt: 0,
        }
    }

    pub fn state(&self) -> KalmanState {
        self.state
    }

    /// Filter one measurement and return the new estimate
    pub fn update(&mut self, z: f32) -> f32 {
        if !z.is_finite() {
            return self.state.x;
        }

        self.track(z);

        let s = &mut self.state;
        s.p += s.q;
        let k = s.p / (s.p + s.r);
        s.x += k * (z - s.x);
        s.p *= 1.0 - k;

        if !s.p.is_finite() || s.p <= P_EPSILON {
            log::warn!("Kalman covariance drifted to {}, resetting", s.p);
            s.p = 1.0;
        }
        if !s.x.is_finite() {
            s.x = z;
        }
        s.x
    }

    pub fn reset(&mut self) {
        self.state = KalmanState {
            x: 0.0,
            p: 1.0,
            r: self.initial_r,
            q: self.initial_q,
        };
        self.recent.clear();
        self.since_adapt = 0;
    }

    fn track(&mut self, z: f32) {
        if self.recent.len() >= self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(z);

        if !self.adaptive {
            return;
        }
        self.since_adapt += 1;
        if self.since_adapt >= self.adapt_interval && self.recent.len() >= self.adapt_min_samples
        {
            self.since_adapt = 0;
            self.adapt_noise();
        }
    }

    fn adapt_noise(&mut self) {
        let samples: Vec<f32> = self.recent.iter().copied().collect();
        let d1 = stats::diff(&samples);
        let d2 = stats::diff(&d1);

        let r = (stats::variance(&d2) / 6.0).clamp(self.r_bounds[0], self.r_bounds[1]);
        let q = (stats::variance(&d1) - 2.0 * r).clamp(self.q_bounds[0], self.q_bounds[1]);

        log::debug!("Kalman noise adapted: R {:.5} -> {:.5}, Q {:.5} -> {:.5}", self.state.r, r, self.state.q, q);
        self.state.r = r;
        self.state.q = q;
    }
}

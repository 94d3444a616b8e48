//! Dynamic amplification of the AC component toward a target amplitude.

use std::collections::VecDeque;

use super::stats;
use crate::config::AmplifierConfig;

const EPSILON: f32 = 1e-6;

pub struct DynamicAmplifier {
    window_size: usize,
    target_amplitude: f32,
    base_min: f32,
    base_max: f32,
    min_factor: f32,
    max_factor: f32,
    window: VecDeque<f32>,
    factor: f32,
}

impl DynamicAmplifier {
    pub fn new(config: &AmplifierConfig) -> Self {
        let window_size = config.window_size.max(20);
        Self {
            window_size,
            target_amplitude: config.target_amplitude,
            base_min: config.min_factor,
            base_max: config.max_factor,
            min_factor: config.min_factor,
            max_factor: config.max_factor,
            window: VecDeque::with_capacity(window_size),
            factor: config.max_factor,
        }
    }

    pub fn amplify(&mut self, ac: f32) -> f32 {
        let ac = if ac.is_finite() { ac } else { 0.0 };
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(ac);

        let (lo, hi) = stats::min_max(&self.window);
        let amplitude = hi - lo;
        self.factor = if amplitude <= EPSILON {
            self.max_factor
        } else {
            (self.target_amplitude / amplitude).clamp(self.min_factor, self.max_factor)
        };
        ac * self.factor
    }

    /// Current gain
    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min_factor, self.max_factor)
    }

    /// Scale the configured gain bounds by a calibrated factor
    pub fn apply_gain_factor(&mut self, gain: f32) {
        if !gain.is_finite() || gain <= 0.0 {
            log::warn!("Ignoring invalid gain factor {}", gain);
            return;
        }
        self.min_factor = self.base_min * gain;
        self.max_factor = self.base_max * gain;
        log::info!(
            "Amplifier bounds scaled by {:.2} to [{:.1}, {:.1}]",
            gain,
            self.min_factor,
            self.max_factor
        );
    }

    /// Clear the window; calibrated bounds are kept
    pub fn reset(&mut self) {
        self.window.clear();
        self.factor = self.max_factor;
    }
}

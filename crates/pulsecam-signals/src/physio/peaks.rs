//! Heartbeat peak detection
//!
//! Values are normalised against a trailing window, then scored on three
//! weighted criteria:
//! - (A) an armed derivative crossing below the derivative threshold with the
//!   value above the signal threshold
//! - (B) the value above `signal_threshold * amplitude_multiplier`
//! - (C) a three-point local maximum
//!
//! A candidate is confirmed once it is the interior maximum of the trailing
//! confirmation window, its confidence passes the validation threshold and
//! the refractory period has elapsed. Thresholds adapt to recent peaks.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::PeakConfig;
use crate::dsp::stats;

const W_DERIVATIVE: f32 = 0.5;
const W_AMPLITUDE: f32 = 0.3;
const W_SHAPE: f32 = 0.2;
const EPSILON: f32 = 1e-6;

/// A confirmed heartbeat, never mutated after creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakEvent {
    pub timestamp_ms: i64,
    /// Amplified signal value at the peak
    pub value: f32,
    pub confidence: f32,
}

/// Derivative-crossing arming state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArmState {
    /// Waiting for a rising slope
    Disarmed,
    /// Rising slope seen; the next crossing below the threshold fires
    Armed,
}

impl ArmState {
    /// Returns the next state and whether a crossing fired
    fn step(self, derivative: f32, threshold: f32) -> (ArmState, bool) {
        match self {
            ArmState::Armed if derivative < threshold => (ArmState::Disarmed, true),
            _ if derivative > 0.0 => (ArmState::Armed, false),
            s => (s, false),
        }
    }
}

/// Current adaptive thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakThresholds {
    pub signal: f32,
    pub derivative: f32,
    pub min_confidence: f32,
}

/// Outcome of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PeakDecision {
    /// A raw candidate passed `min_confidence` this frame
    pub candidate: bool,
    /// Confidence of the evaluated candidate
    pub confidence: f32,
    /// Candidate value normalised to [0, 1]
    pub normalized: f32,
    /// Still inside the warmup period
    pub warming_up: bool,
    /// Confirmed peak, if any
    pub peak: Option<PeakEvent>,
}

impl PeakDecision {
    pub fn is_peak(&self) -> bool {
        self.peak.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct ConfirmedStats {
    normalized: f32,
    derivative: f32,
    confidence: f32,
}

pub struct PeakDetector {
    config: PeakConfig,
    thresholds: PeakThresholds,
    arm: ArmState,
    values: VecDeque<f32>,
    timestamps: VecDeque<i64>,
    start_ms: Option<i64>,
    samples_seen: usize,
    last_peak_ms: Option<i64>,
    recent: VecDeque<ConfirmedStats>,
    since_adapt: usize,
}

impl PeakDetector {
    pub fn new(config: PeakConfig) -> Self {
        let thresholds = PeakThresholds {
            signal: config.signal_threshold,
            derivative: config.derivative_threshold,
            min_confidence: config.min_confidence,
        };
        let window = config.normalization_window;
        let history = config.adapt_history;
        Self {
            config,
            thresholds,
            arm: ArmState::Disarmed,
            values: VecDeque::with_capacity(window),
            timestamps: VecDeque::with_capacity(window),
            start_ms: None,
            samples_seen: 0,
            last_peak_ms: None,
            recent: VecDeque::with_capacity(history),
            since_adapt: 0,
        }
    }

    pub fn thresholds(&self) -> PeakThresholds {
        self.thresholds
    }

    pub fn arm_state(&self) -> ArmState {
        self.arm
    }

    pub fn last_peak_ms(&self) -> Option<i64> {
        self.last_peak_ms
    }

    /// Confidences of the most recent confirmed peaks
    pub fn recent_confidences(&self) -> Vec<f32> {
        self.recent.iter().map(|s| s.confidence).collect()
    }

    /// Restart detection: clears history, warmup and adapted thresholds
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Process one amplified sample and its first difference
    pub fn process(&mut self, value: f32, derivative: f32, timestamp_ms: i64) -> PeakDecision {
        if !value.is_finite() || !derivative.is_finite() {
            return PeakDecision {
                warming_up: self.in_warmup(timestamp_ms),
                ..PeakDecision::default()
            };
        }

        self.start_ms.get_or_insert(timestamp_ms);
        self.samples_seen += 1;
        if self.values.len() >= self.config.normalization_window {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
        self.values.push_back(value);
        self.timestamps.push_back(timestamp_ms);

        let warming_up = self.in_warmup(timestamp_ms);
        let mut decision = PeakDecision {
            warming_up,
            ..PeakDecision::default()
        };

        let n = self.values.len();
        if n < 3 {
            return decision;
        }
        let (lo, hi) = stats::min_max(&self.values);
        let range = hi - lo;
        if range <= EPSILON {
            return decision;
        }
        let norm = |v: f32| (v - lo) / range;
        let d_norm = derivative / range;

        let (arm, crossing) = self.arm.step(d_norm, self.thresholds.derivative);
        self.arm = arm;

        let i = n - 1;
        let window_start = n.saturating_sub(self.config.confirm_window);
        let k = if crossing {
            self.argmax(window_start, i)
        } else {
            i - 1
        };

        let vk = norm(self.values[k]);
        let mut confidence = 0.0;
        if crossing && vk > self.thresholds.signal {
            confidence += W_DERIVATIVE;
        }
        if vk > self.thresholds.signal * self.config.amplitude_multiplier {
            confidence += W_AMPLITUDE;
        }
        if k >= 1 && k < i && self.values[k - 1] < self.values[k] && self.values[k] > self.values[k + 1]
        {
            confidence += W_SHAPE;
        }

        decision.confidence = confidence;
        decision.normalized = vk;
        decision.candidate = confidence >= self.thresholds.min_confidence;
        if !decision.candidate || warming_up {
            return decision;
        }

        // interior maximum of the confirmation window
        let full_window = n >= self.config.confirm_window;
        if !full_window || k <= window_start || k >= i || self.argmax(window_start, i) != k {
            return decision;
        }
        if confidence < self.config.validation_threshold {
            return decision;
        }
        let peak_ms = self.timestamps[k];
        if let Some(last) = self.last_peak_ms {
            if peak_ms - last < self.config.min_peak_interval_ms {
                return decision;
            }
        }

        let event = PeakEvent {
            timestamp_ms: peak_ms,
            value: self.values[k],
            confidence,
        };
        self.last_peak_ms = Some(peak_ms);
        self.record(ConfirmedStats {
            normalized: vk,
            derivative: d_norm,
            confidence,
        });
        decision.peak = Some(event);
        decision
    }

    fn in_warmup(&self, now_ms: i64) -> bool {
        let elapsed = self.start_ms.map(|s| now_ms - s).unwrap_or(0);
        self.samples_seen < self.config.warmup_samples || elapsed < self.config.warmup_ms
    }

    /// Index of the largest value in `from..=to`, earliest on ties
    fn argmax(&self, from: usize, to: usize) -> usize {
        let mut best = from;
        for j in from..=to {
            if self.values[j] > self.values[best] {
                best = j;
            }
        }
        best
    }

    fn record(&mut self, stats: ConfirmedStats) {
        if self.recent.len() >= self.config.adapt_history {
            self.recent.pop_front();
        }
        self.recent.push_back(stats);
        self.since_adapt += 1;

        let every = (self.config.adapt_history / 2).max(1);
        if self.since_adapt >= every && self.recent.len() >= every {
            self.since_adapt = 0;
            self.adapt();
        }
    }

    fn adapt(&mut self) {
        let n = self.recent.len() as f32;
        let amp = self.recent.iter().map(|s| s.normalized).sum::<f32>() / n;
        let slope = self.recent.iter().map(|s| s.derivative.abs()).sum::<f32>() / n;
        let conf = self.recent.iter().map(|s| s.confidence).sum::<f32>() / n;

        let c = &self.config;
        let rate = c.adapt_rate;
        let t = &mut self.thresholds;

        let target = (amp * 0.7).clamp(c.signal_threshold_bounds[0], c.signal_threshold_bounds[1]);
        t.signal = (t.signal + rate * (target - t.signal))
            .clamp(c.signal_threshold_bounds[0], c.signal_threshold_bounds[1]);

        let target = (-slope * 0.3).clamp(
            c.derivative_threshold_bounds[0],
            c.derivative_threshold_bounds[1],
        );
        t.derivative = (t.derivative + rate * (target - t.derivative)).clamp(
            c.derivative_threshold_bounds[0],
            c.derivative_threshold_bounds[1],
        );

        let target = (conf * 0.6).clamp(c.min_confidence_bounds[0], c.min_confidence_bounds[1]);
        t.min_confidence = (t.min_confidence + rate * (target - t.min_confidence))
            .clamp(c.min_confidence_bounds[0], c.min_confidence_bounds[1]);

        log::debug!(
            "Peak thresholds adapted: signal {:.3}, derivative {:.4}, min_confidence {:.3}",
            t.signal,
            t.derivative,
            t.min_confidence
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn ts(i: usize) -> i64 {
        (i as f64 * 1000.0 / 30.0) as i64
    }

    /// Feed a sinusoid and collect confirmed peaks
    fn run_sine(freq_hz: f32, seconds: f32) -> Vec<PeakEvent> {
        let mut detector = PeakDetector::new(PeakConfig::default());
        let mut prev = 0.0;
        let mut peaks = Vec::new();
        for i in 0..(seconds * 30.0) as usize {
            let t = i as f32 / 30.0;
            let v = 10.0 * (2.0 * PI * freq_hz * t).sin();
            if let Some(p) = detector.process(v, v - prev, ts(i)).peak {
                peaks.push(p);
            }
            prev = v;
        }
        peaks
    }

    #[test]
    fn test_arm_state_transitions() {
        let (s, fired) = ArmState::Disarmed.step(-1.0, -0.005);
        assert_eq!((s, fired), (ArmState::Disarmed, false));
        let (s, fired) = ArmState::Disarmed.step(0.1, -0.005);
        assert_eq!((s, fired), (ArmState::Armed, false));
        let (s, fired) = ArmState::Armed.step(-0.001, -0.005);
        assert_eq!((s, fired), (ArmState::Armed, false));
        let (s, fired) = ArmState::Armed.step(-0.01, -0.005);
        assert_eq!((s, fired), (ArmState::Disarmed, true));
    }

    #[test]
    fn test_sine_peaks_at_heart_rate() {
        let peaks = run_sine(1.2, 10.0);
        assert!(peaks.len() >= 9, "found {}", peaks.len());
        for w in peaks.windows(2) {
            let dt = w[1].timestamp_ms - w[0].timestamp_ms;
            assert!((820..=850).contains(&dt), "interval {dt}");
        }
        assert!(peaks.iter().all(|p| p.confidence >= 0.45));
    }

    #[test]
    fn test_no_peaks_during_warmup() {
        let peaks = run_sine(1.2, 10.0);
        assert!(peaks[0].timestamp_ms >= 700);
    }

    #[test]
    fn test_refractory_enforced() {
        // 4 Hz has 250 ms between crests
        let peaks = run_sine(4.0, 6.0);
        assert!(!peaks.is_empty());
        for w in peaks.windows(2) {
            assert!(w[1].timestamp_ms - w[0].timestamp_ms >= 300);
        }
    }

    #[test]
    fn test_flat_signal_no_candidates() {
        let mut detector = PeakDetector::new(PeakConfig::default());
        for i in 0..100 {
            let d = detector.process(1.0, 0.0, ts(i));
            assert!(!d.candidate);
            assert!(!d.is_peak());
        }
    }

    #[test]
    fn test_adaptation_stays_within_bounds() {
        let config = PeakConfig::default();
        let mut detector = PeakDetector::new(config.clone());
        for _ in 0..80 {
            detector.record(ConfirmedStats {
                normalized: 1.0,
                derivative: -5.0,
                confidence: 1.0,
            });
        }
        let t = detector.thresholds();
        assert!(t.signal <= config.signal_threshold_bounds[1]);
        assert_relative_eq!(t.derivative, config.derivative_threshold_bounds[0], epsilon = 1e-3);
        assert!(t.min_confidence <= config.min_confidence_bounds[1]);
        assert!(t.min_confidence > config.min_confidence);

        for _ in 0..120 {
            detector.record(ConfirmedStats {
                normalized: 0.0,
                derivative: 0.0,
                confidence: 0.0,
            });
        }
        let t = detector.thresholds();
        assert_relative_eq!(t.signal, config.signal_threshold_bounds[0], epsilon = 1e-3);
        assert_relative_eq!(t.derivative, config.derivative_threshold_bounds[1], epsilon = 1e-3);
        assert_relative_eq!(t.min_confidence, config.min_confidence_bounds[0], epsilon = 1e-3);
    }

    #[test]
    fn test_reset_restores_thresholds() {
        let config = PeakConfig::default();
        let mut detector = PeakDetector::new(config.clone());
        for _ in 0..8 {
            detector.record(ConfirmedStats {
                normalized: 0.2,
                derivative: -0.5,
                confidence: 0.5,
            });
        }
        detector.reset();
        assert_eq!(detector.thresholds().signal, config.signal_threshold);
        assert_eq!(detector.last_peak_ms(), None);
        assert!(detector.recent_confidences().is_empty());
    }
}

//! Calibration session
//!
//! Strictly sequential phases, each with a target duration, a minimum sample
//! count and (for the finger and optimization phases) a quality gate:
//!
//! ```text
//! Baseline -> FingerDetection -> SignalOptimization -> Validation -> Complete
//! ```
//!
//! A phase whose gate is unmet at its deadline is extended a bounded number
//! of times, then forced forward and recorded as failed. Deadlines are
//! checked against frame timestamps only.

use serde::Serialize;

use crate::config::CalibrationConfig;

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationPhase {
    Baseline,
    FingerDetection,
    SignalOptimization,
    Validation,
    Complete,
}

impl CalibrationPhase {
    pub fn next(self) -> Self {
        match self {
            CalibrationPhase::Baseline => CalibrationPhase::FingerDetection,
            CalibrationPhase::FingerDetection => CalibrationPhase::SignalOptimization,
            CalibrationPhase::SignalOptimization => CalibrationPhase::Validation,
            CalibrationPhase::Validation | CalibrationPhase::Complete => CalibrationPhase::Complete,
        }
    }
}

/// One frame's worth of calibration input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub timestamp_ms: i64,
    pub rgb: [f32; 3],
    /// Debounced finger presence
    pub finger_detected: bool,
    pub detection_quality: f32,
    /// Signal quality score [0, 100]
    pub signal_quality: f32,
    /// Filtered AC component
    pub ac: f32,
}

/// Externally measured values handed over when calibration ends.
///
/// Kept for downstream consumers; the core filters never read them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceData {
    pub heart_rate_bpm: Option<f32>,
    pub spo2_pct: Option<f32>,
    pub systolic_mmhg: Option<f32>,
    pub diastolic_mmhg: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub success: bool,
    /// Validation accuracy [0, 1]
    pub accuracy: f32,
    pub baseline_rgb: [f32; 3],
    /// Derived red reflectance band, when the finger phase produced one
    pub red_thresholds: Option<(f32, f32)>,
    /// Multiplier for the amplifier gain bounds, [0.5, 2]
    pub gain_factor: f32,
    /// Phases that were forced forward with their gate unmet
    pub failed_phases: Vec<CalibrationPhase>,
    /// Remediation hints, empty on success
    pub recommendations: Vec<String>,
}

/// Progress report emitted for every calibration frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationUpdate {
    pub phase: CalibrationPhase,
    /// [0, 1], non-decreasing within a phase, 0 on the first frame of a phase
    pub progress: f32,
    pub phase_changed: bool,
    /// Extensions used by the current phase
    pub extensions: u32,
    /// Present once the session reaches `Complete`
    pub result: Option<CalibrationResult>,
}

pub struct CalibrationController {
    config: CalibrationConfig,
    target_amplitude: f32,
    /// (min, max) amplifier factors before calibration
    base_gain_bounds: (f32, f32),
    /// Red band used for validation when no thresholds were derived
    default_red_band: (f32, f32),
    phase: CalibrationPhase,
    phase_start_ms: Option<i64>,
    deadline_ms: i64,
    progress: f32,
    extensions: u32,
    samples: Vec<CalibrationSample>,
    baseline_rgb: [f32; 3],
    red_thresholds: Option<(f32, f32)>,
    gain_factor: f32,
    failed: Vec<CalibrationPhase>,
    result: Option<CalibrationResult>,
}

impl CalibrationController {
    pub fn new(
        config: CalibrationConfig,
        target_amplitude: f32,
        base_gain_bounds: (f32, f32),
        default_red_band: (f32, f32),
    ) -> Self {
        Self {
            config,
            target_amplitude,
            base_gain_bounds,
            default_red_band,
            phase: CalibrationPhase::Baseline,
            phase_start_ms: None,
            deadline_ms: 0,
            progress: 0.0,
            extensions: 0,
            samples: Vec::new(),
            baseline_rgb: [0.0; 3],
            red_thresholds: None,
            gain_factor: 1.0,
            failed: Vec::new(),
            result: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.phase == CalibrationPhase::Complete
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    /// Feed one frame
    pub fn push(&mut self, sample: CalibrationSample) -> CalibrationUpdate {
        if self.is_complete() {
            return self.update(false);
        }

        let start = match self.phase_start_ms {
            Some(s) => s,
            None => {
                self.phase_start_ms = Some(sample.timestamp_ms);
                self.deadline_ms = sample.timestamp_ms + self.duration(self.phase);
                sample.timestamp_ms
            }
        };
        self.samples.push(sample);

        let elapsed = (sample.timestamp_ms - start) as f32;
        let span = (self.deadline_ms - start).max(1) as f32;
        self.progress = self.progress.max((elapsed / span).clamp(0.0, 1.0));

        let due = sample.timestamp_ms >= self.deadline_ms
            && self.samples.len() >= self.min_samples(self.phase);
        if !due {
            return self.update(false);
        }

        if self.gate_met() {
            self.advance(sample.timestamp_ms);
            return self.update(true);
        }

        if self.extensions < self.config.max_extensions {
            self.extensions += 1;
            self.deadline_ms += self.config.extension_ms;
            log::warn!(
                "Calibration phase {:?} gate unmet, extending ({}/{})",
                self.phase,
                self.extensions,
                self.config.max_extensions
            );
            return self.update(false);
        }

        log::warn!("Calibration phase {:?} forced forward with gate unmet", self.phase);
        self.failed.push(self.phase);
        self.advance(sample.timestamp_ms);
        self.update(true)
    }

    fn update(&self, phase_changed: bool) -> CalibrationUpdate {
        CalibrationUpdate {
            phase: self.phase,
            progress: self.progress,
            phase_changed,
            extensions: self.extensions,
            result: self.result.clone(),
        }
    }

    fn duration(&self, phase: CalibrationPhase) -> i64 {
        let c = &self.config;
        match phase {
            CalibrationPhase::Baseline => c.baseline_ms,
            CalibrationPhase::FingerDetection => c.finger_ms,
            CalibrationPhase::SignalOptimization => c.optimization_ms,
            CalibrationPhase::Validation => c.validation_ms,
            CalibrationPhase::Complete => 0,
        }
    }

    fn min_samples(&self, phase: CalibrationPhase) -> usize {
        let c = &self.config;
        match phase {
            CalibrationPhase::Baseline => c.baseline_min_samples,
            CalibrationPhase::FingerDetection => c.finger_min_samples,
            CalibrationPhase::SignalOptimization => c.optimization_min_samples,
            CalibrationPhase::Validation => c.validation_min_samples,
            CalibrationPhase::Complete => 0,
        }
    }

    fn gate_met(&self) -> bool {
        let gate = self.config.gate_quality;
        match self.phase {
            CalibrationPhase::FingerDetection => {
                let hits = self
                    .samples
                    .iter()
                    .filter(|s| s.finger_detected && s.detection_quality > gate)
                    .count();
                hits as f32 >= self.config.finger_hit_ratio * self.samples.len() as f32
            }
            CalibrationPhase::SignalOptimization => {
                let mean = self.samples.iter().map(|s| s.signal_quality).sum::<f32>()
                    / self.samples.len().max(1) as f32;
                mean > gate
            }
            _ => true,
        }
    }

    /// Derive the exiting phase's artifact and enter the next phase
    fn advance(&mut self, now_ms: i64) {
        match self.phase {
            CalibrationPhase::Baseline => self.baseline_rgb = mean_rgb(&self.samples),
            CalibrationPhase::FingerDetection => self.red_thresholds = self.derive_red_thresholds(),
            CalibrationPhase::SignalOptimization => self.gain_factor = self.derive_gain(),
            CalibrationPhase::Validation => self.result = Some(self.finish()),
            CalibrationPhase::Complete => {}
        }

        let from = self.phase;
        self.phase = self.phase.next();
        log::info!("Calibration {:?} -> {:?}", from, self.phase);

        self.samples.clear();
        self.progress = 0.0;
        self.extensions = 0;
        self.phase_start_ms = Some(now_ms);
        self.deadline_ms = now_ms + self.duration(self.phase);
    }

    fn derive_red_thresholds(&self) -> Option<(f32, f32)> {
        let detected: Vec<&CalibrationSample> =
            self.samples.iter().filter(|s| s.finger_detected).collect();
        if detected.is_empty() {
            return None;
        }
        let avg = detected.iter().map(|s| s.rgb[0]).sum::<f32>() / detected.len() as f32;
        let c = &self.config;
        let lo = (avg * 0.6).clamp(c.red_min_bounds[0], c.red_min_bounds[1]);
        let hi = (avg * 1.4).clamp(c.red_max_bounds[0], c.red_max_bounds[1]);
        (lo < hi).then_some((lo, hi))
    }

    fn derive_gain(&self) -> f32 {
        let (lo, hi) = self
            .samples
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), s| (lo.min(s.ac), hi.max(s.ac)));
        let peak_to_peak = hi - lo;
        if !peak_to_peak.is_finite() || peak_to_peak <= EPSILON {
            return 1.0;
        }
        let desired = self.target_amplitude / peak_to_peak;
        let reference = (self.base_gain_bounds.0 * self.base_gain_bounds.1).sqrt().max(EPSILON);
        (desired / reference).clamp(0.5, 2.0)
    }

    fn finish(&self) -> CalibrationResult {
        let (lo, hi) = self.red_thresholds.unwrap_or(self.default_red_band);
        let n = self.samples.len().max(1) as f32;
        let in_range = self
            .samples
            .iter()
            .filter(|s| s.rgb[0] >= lo && s.rgb[0] <= hi)
            .count() as f32
            / n;
        let quality_hits = self
            .samples
            .iter()
            .filter(|s| s.signal_quality > self.config.validation_quality)
            .count() as f32
            / n;
        let accuracy = 0.5 * in_range + 0.5 * quality_hits;
        let success = accuracy >= self.config.pass_accuracy && self.failed.is_empty();

        let recommendations = if success {
            Vec::new()
        } else {
            self.recommendations(in_range, quality_hits)
        };

        CalibrationResult {
            success,
            accuracy,
            baseline_rgb: self.baseline_rgb,
            red_thresholds: self.red_thresholds,
            gain_factor: self.gain_factor,
            failed_phases: self.failed.clone(),
            recommendations,
        }
    }

    fn recommendations(&self, in_range: f32, quality_hits: f32) -> Vec<String> {
        let mut hints = Vec::new();
        let brightness = self.baseline_rgb.iter().sum::<f32>() / 3.0;
        if !(20.0..=235.0).contains(&brightness) {
            hints.push("Lighting is poor: move to a more evenly lit place and enable the flash".to_string());
        }
        if self.failed.contains(&CalibrationPhase::FingerDetection) || in_range < 0.7 {
            hints.push("Finger contact was inconsistent: cover the lens fully with your fingertip".to_string());
        }
        if self.failed.contains(&CalibrationPhase::SignalOptimization) || quality_hits < 0.7 {
            hints.push("Signal quality was low: hold still and keep gentle, steady pressure".to_string());
        }
        if hints.is_empty() {
            hints.push("Calibration did not pass: please try again".to_string());
        }
        hints
    }
}

fn mean_rgb(samples: &[CalibrationSample]) -> [f32; 3] {
    if samples.is_empty() {
        return [0.0; 3];
    }
    let n = samples.len() as f32;
    let mut acc = [0.0f32; 3];
    for s in samples {
        for (a, v) in acc.iter_mut().zip(s.rgb) {
            *a += v;
        }
    }
    acc.map(|v| v / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn controller() -> CalibrationController {
        CalibrationController::new(CalibrationConfig::default(), 20.0, (5.0, 40.0), (60.0, 245.0))
    }

    fn sample(i: usize, finger: bool) -> CalibrationSample {
        let ts = (i as f64 * 1000.0 / 30.0) as i64;
        CalibrationSample {
            timestamp_ms: ts,
            rgb: if finger { [150.0, 60.0, 45.0] } else { [90.0, 90.0, 90.0] },
            finger_detected: finger,
            detection_quality: if finger { 90.0 } else { 0.0 },
            signal_quality: if finger { 70.0 } else { 10.0 },
            ac: if finger { 2.0 * ((i as f32) * 0.25).sin() } else { 0.0 },
        }
    }

    #[test]
    fn test_phase_order() {
        let mut phase = CalibrationPhase::Baseline;
        let mut seen = vec![phase];
        while phase != CalibrationPhase::Complete {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(CalibrationPhase::Complete.next(), CalibrationPhase::Complete);
    }

    #[test]
    fn test_successful_session() {
        let mut ctl = controller();
        let mut i = 0;
        while !ctl.is_complete() && i < 1000 {
            // frame 60 closes the baseline phase
            ctl.push(sample(i, i > 60));
            i += 1;
        }
        let result = ctl.result().unwrap();
        assert!(result.success, "{result:?}");
        assert!(result.recommendations.is_empty());
        assert_relative_eq!(result.baseline_rgb[0], 90.0);
        let (lo, hi) = result.red_thresholds.unwrap();
        assert_relative_eq!(lo, 90.0, epsilon = 1e-3);
        assert_relative_eq!(hi, 210.0, epsilon = 1e-3);
        assert!((0.5..=2.0).contains(&result.gain_factor));
        assert_relative_eq!(result.accuracy, 1.0);
    }

    #[test]
    fn test_missing_finger_extends_then_fails() {
        let mut ctl = controller();
        let mut extensions_seen = 0;
        let mut i = 0;
        while ctl.phase() != CalibrationPhase::SignalOptimization && i < 1000 {
            let update = ctl.push(sample(i, false));
            extensions_seen = extensions_seen.max(update.extensions);
            i += 1;
        }
        assert_eq!(extensions_seen, 3);
        // 2 s baseline + 3 s finger + 3 x 1 s extensions
        assert!(i >= 240 && i <= 245, "frames {i}");

        while !ctl.is_complete() && i < 2000 {
            ctl.push(sample(i, false));
            i += 1;
        }
        let result = ctl.result().unwrap();
        assert!(!result.success);
        assert!(result.failed_phases.contains(&CalibrationPhase::FingerDetection));
        assert!(!result.recommendations.is_empty());
        assert_eq!(result.red_thresholds, None);
    }

    #[test]
    fn test_progress_monotonic_and_resets() {
        let mut ctl = controller();
        let mut last = (CalibrationPhase::Baseline, 0.0f32);
        for i in 0..600 {
            let update = ctl.push(sample(i, i > 60));
            if update.phase == last.0 {
                assert!(update.progress >= last.1);
            } else {
                assert!(update.phase_changed);
                assert_eq!(update.progress, 0.0);
            }
            assert!((0.0..=1.0).contains(&update.progress));
            last = (update.phase, update.progress);
        }
    }

    #[test]
    fn test_red_thresholds_clamped() {
        let mut ctl = controller();
        ctl.phase = CalibrationPhase::FingerDetection;
        for i in 0..40 {
            let mut s = sample(i, true);
            s.rgb[0] = 250.0;
            ctl.samples.push(s);
        }
        // 250 * 0.6 = 150, 250 * 1.4 = 350 -> 255
        let (lo, hi) = ctl.derive_red_thresholds().unwrap();
        assert_relative_eq!(lo, 150.0, epsilon = 1e-3);
        assert_relative_eq!(hi, 255.0);
    }

    #[test]
    fn test_flat_ac_keeps_unit_gain() {
        let mut ctl = controller();
        for i in 0..40 {
            ctl.samples.push(sample(i, false));
        }
        assert_eq!(ctl.derive_gain(), 1.0);
    }
}

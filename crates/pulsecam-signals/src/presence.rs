//! Finger Presence Detection
//!
//! Decides whether a fingertip covers the lens in three stages:
//! 1. Weighted spectral checks (majority vote plus a confidence floor)
//! 2. Rejection checks, any one of which vetoes the frame
//! 3. Asymmetric hysteresis so the state cannot flicker frame to frame
//!
//! # Usage
//!
//! ```ignore
//! let mut detector = FingerPresenceDetector::new(FingerConfig::default());
//! let result = detector.detect(&metrics);
//! if result.detected {
//!     // run peak detection
//! }
//! ```

use serde::Serialize;

use crate::config::FingerConfig;
use crate::vision::FrameMetrics;

const W_RED: f32 = 0.30;
const W_RATIO: f32 = 0.25;
const W_WARMTH: f32 = 0.15;
const W_TEXTURE: f32 = 0.15;
const W_AREA: f32 = 0.15;

/// Why a frame was vetoed or failed the spectral vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    /// Metrics could not be computed (empty ROI, NaN)
    Degenerate,
    /// Too few spectral checks passed or confidence too low
    InsufficientEvidence,
    Saturated,
    TooUniform,
    Specular,
    BlueDominant,
    GreenDominant,
}

/// Hysteresis state, mutated once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DetectionState {
    pub is_detected: bool,
    pub consecutive_on: u32,
    pub consecutive_off: u32,
}

/// Per-frame presence decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Debounced presence
    pub detected: bool,
    /// This frame alone qualified
    pub qualified: bool,
    /// Weighted spectral confidence [0, 1]
    pub confidence: f32,
    /// [0, 100], zero when the frame did not qualify
    pub quality: f32,
    pub checks_passed: usize,
    pub rejection_reasons: Vec<RejectionReason>,
    pub state: DetectionState,
}

pub struct FingerPresenceDetector {
    config: FingerConfig,
    state: DetectionState,
}

impl FingerPresenceDetector {
    pub fn new(config: FingerConfig) -> Self {
        Self {
            config,
            state: DetectionState::default(),
        }
    }

    pub fn config(&self) -> &FingerConfig {
        &self.config
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn is_detected(&self) -> bool {
        self.state.is_detected
    }

    /// Replace the red reflectance band with calibrated values
    pub fn apply_red_thresholds(&mut self, min: f32, max: f32) {
        if min.is_finite() && max.is_finite() && min < max {
            log::info!("Finger red thresholds set to [{:.1}, {:.1}]", min, max);
            self.config.min_red_reflectance = min;
            self.config.max_red_reflectance = max;
        } else {
            log::warn!("Ignoring invalid red thresholds [{}, {}]", min, max);
        }
    }

    pub fn reset(&mut self) {
        self.state = DetectionState::default();
    }

    pub fn detect(&mut self, metrics: &FrameMetrics) -> DetectionResult {
        if metrics.is_degenerate() {
            // advances the off counter, but this frame never reports presence
            self.update_state(false);
            return DetectionResult {
                detected: false,
                qualified: false,
                confidence: 0.0,
                quality: 0.0,
                checks_passed: 0,
                rejection_reasons: vec![RejectionReason::Degenerate],
                state: self.state,
            };
        }

        let (checks_passed, confidence) = self.spectral_checks(metrics);
        let mut reasons = self.rejection_checks(metrics);

        let candidate = checks_passed >= self.config.required_checks
            && confidence >= self.config.confidence_threshold;
        if !candidate {
            reasons.insert(0, RejectionReason::InsufficientEvidence);
        }
        let qualified = reasons.is_empty();

        self.update_state(qualified);

        let quality = if qualified {
            (confidence * 100.0 * (0.6 + 0.4 * metrics.roi_stability.clamp(0.0, 1.0)))
                .clamp(0.0, 100.0)
        } else {
            0.0
        };

        DetectionResult {
            detected: self.state.is_detected,
            qualified,
            confidence,
            quality,
            checks_passed,
            rejection_reasons: reasons,
            state: self.state,
        }
    }

    fn spectral_checks(&self, m: &FrameMetrics) -> (usize, f32) {
        let c = &self.config;
        let checks = [
            (
                (c.min_red_reflectance..=c.max_red_reflectance).contains(&m.avg_red),
                W_RED,
            ),
            (
                (c.min_rg_ratio..=c.max_rg_ratio).contains(&m.red_green_ratio),
                W_RATIO,
            ),
            ((c.min_warmth..=c.max_warmth).contains(&m.warmth), W_WARMTH),
            (
                (c.min_texture..=c.max_texture).contains(&m.texture_score),
                W_TEXTURE,
            ),
            (m.valid_area_pct >= c.min_area_pct, W_AREA),
        ];

        let passed = checks.iter().filter(|(ok, _)| *ok).count();
        let confidence: f32 = checks.iter().filter(|(ok, _)| *ok).map(|(_, w)| w).sum();
        (passed, confidence.clamp(0.0, 1.0))
    }

    fn rejection_checks(&self, m: &FrameMetrics) -> Vec<RejectionReason> {
        let c = &self.config;
        let mut reasons = Vec::new();
        if m.avg_red > c.saturation_red {
            reasons.push(RejectionReason::Saturated);
        }
        if m.intensity_variance < c.min_intensity_variance {
            reasons.push(RejectionReason::TooUniform);
        }
        if m.specular_ratio > c.max_specular_ratio {
            reasons.push(RejectionReason::Specular);
        }
        if m.avg_blue > m.avg_red {
            reasons.push(RejectionReason::BlueDominant);
        }
        if m.avg_green > m.avg_red {
            reasons.push(RejectionReason::GreenDominant);
        }
        reasons
    }

    fn update_state(&mut self, qualified: bool) {
        let s = &mut self.state;
        if qualified {
            s.consecutive_on = s.consecutive_on.saturating_add(1);
            s.consecutive_off = 0;
            if !s.is_detected && s.consecutive_on >= self.config.min_consecutive_detections {
                s.is_detected = true;
                log::debug!("Finger acquired after {} frames", s.consecutive_on);
            }
        } else {
            s.consecutive_off = s.consecutive_off.saturating_add(1);
            s.consecutive_on = 0;
            if s.is_detected && s.consecutive_off >= self.config.max_consecutive_no_detections {
                s.is_detected = false;
                log::debug!("Finger lost after {} frames", s.consecutive_off);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finger_metrics() -> FrameMetrics {
        FrameMetrics {
            avg_red: 150.0,
            avg_green: 60.0,
            avg_blue: 45.0,
            median_red: 150.0,
            red_p10: 146.0,
            red_p90: 154.0,
            red_green_ratio: 2.5,
            red_blue_ratio: 3.33,
            warmth: 0.54,
            texture_score: 0.04,
            edge_score: 0.02,
            intensity_variance: 10.0,
            specular_ratio: 1.06,
            valid_area_pct: 100.0,
            valid_pixel_count: 400,
            pixel_count: 400,
            roi_stability: 1.0,
        }
    }

    fn gray_metrics() -> FrameMetrics {
        FrameMetrics {
            avg_red: 128.0,
            avg_green: 128.0,
            avg_blue: 128.0,
            median_red: 128.0,
            red_p10: 128.0,
            red_p90: 128.0,
            red_green_ratio: 1.0,
            red_blue_ratio: 1.0,
            warmth: 0.0,
            texture_score: 0.0,
            edge_score: 0.0,
            intensity_variance: 0.0,
            specular_ratio: 1.0,
            valid_area_pct: 100.0,
            valid_pixel_count: 400,
            pixel_count: 400,
            roi_stability: 1.0,
        }
    }

    #[test]
    fn test_finger_frame_qualifies() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        let result = detector.detect(&finger_metrics());
        assert!(result.qualified);
        assert!(!result.detected);
        assert_eq!(result.checks_passed, 5);
        assert_relative_eq!(result.confidence, 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.quality, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn test_switches_on_after_min_frames() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        for i in 1..=5 {
            let result = detector.detect(&finger_metrics());
            assert_eq!(result.detected, i >= 5, "frame {i}");
        }
    }

    #[test]
    fn test_switches_off_after_max_misses() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        for _ in 0..5 {
            detector.detect(&finger_metrics());
        }
        assert!(detector.is_detected());
        for i in 1..=8 {
            let result = detector.detect(&gray_metrics());
            assert_eq!(result.detected, i < 8, "miss {i}");
        }
    }

    #[test]
    fn test_gray_is_vetoed() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        let result = detector.detect(&gray_metrics());
        assert!(!result.qualified);
        assert_eq!(result.checks_passed, 2);
        assert_relative_eq!(result.confidence, 0.45, epsilon = 1e-6);
        assert_eq!(result.quality, 0.0);
        assert!(result.rejection_reasons.contains(&RejectionReason::TooUniform));
        assert!(result
            .rejection_reasons
            .contains(&RejectionReason::InsufficientEvidence));
    }

    #[test]
    fn test_single_veto_blocks_candidate() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        let mut m = finger_metrics();
        m.specular_ratio = 3.0;
        let result = detector.detect(&m);
        assert!(!result.qualified);
        assert_eq!(result.rejection_reasons, vec![RejectionReason::Specular]);
    }

    #[test]
    fn test_alternating_frames_never_flip() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        for i in 0..40 {
            let m = if i % 2 == 0 { finger_metrics() } else { gray_metrics() };
            assert!(!detector.detect(&m).detected);
        }
    }

    /// Ratio, warmth and texture pass: 3 checks, confidence 0.55
    fn just_above_threshold() -> FrameMetrics {
        FrameMetrics {
            avg_red: 55.0,
            avg_green: 20.0,
            avg_blue: 15.0,
            red_green_ratio: 2.75,
            red_blue_ratio: 3.67,
            valid_area_pct: 30.0,
            ..finger_metrics()
        }
    }

    /// Warmth, texture and area pass: 3 checks, confidence 0.45
    fn just_below_threshold() -> FrameMetrics {
        FrameMetrics {
            avg_red: 250.0,
            avg_green: 200.0,
            red_green_ratio: 1.25,
            red_blue_ratio: 5.56,
            ..finger_metrics()
        }
    }

    #[test]
    fn test_boundary_alternation_holds_state() {
        let config = FingerConfig::default();
        let threshold = config.confidence_threshold;
        let mut detector = FingerPresenceDetector::new(config);

        for _ in 0..5 {
            detector.detect(&finger_metrics());
        }
        assert!(detector.is_detected());

        for i in 0..40 {
            let above = i % 2 == 0;
            let m = if above {
                just_above_threshold()
            } else {
                just_below_threshold()
            };
            let result = detector.detect(&m);
            assert_eq!(result.checks_passed, 3, "frame {i}");
            assert_eq!(result.qualified, above, "frame {i}");
            assert_eq!(result.confidence >= threshold, above, "frame {i}");
            assert!(result.detected, "flipped off at frame {i}");
        }

        detector.reset();
        for i in 0..40 {
            let m = if i % 2 == 0 {
                just_above_threshold()
            } else {
                just_below_threshold()
            };
            assert!(!detector.detect(&m).detected, "flipped on at frame {i}");
        }
    }

    #[test]
    fn test_degenerate_counts_as_miss() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        let result = detector.detect(&FrameMetrics::no_signal());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.state.consecutive_off, 1);
        assert_eq!(result.rejection_reasons, vec![RejectionReason::Degenerate]);
    }

    #[test]
    fn test_degenerate_never_reports_detected() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        for _ in 0..5 {
            detector.detect(&finger_metrics());
        }
        assert!(detector.is_detected());

        let result = detector.detect(&FrameMetrics::no_signal());
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.state.consecutive_off, 1);
        // hysteresis state is kept, so one bad frame does not force a loss
        assert!(result.state.is_detected);

        assert!(detector.detect(&finger_metrics()).detected);
    }

    #[test]
    fn test_red_threshold_override() {
        let mut detector = FingerPresenceDetector::new(FingerConfig::default());
        detector.apply_red_thresholds(160.0, 220.0);
        let result = detector.detect(&finger_metrics());
        // red check now fails: 4 of 5 pass, confidence 0.7
        assert_eq!(result.checks_passed, 4);
        assert!(result.qualified);

        detector.apply_red_thresholds(200.0, 100.0);
        assert_eq!(detector.config().min_red_reflectance, 160.0);
    }
}

//! Pipeline configuration
//!
//! A flat set of named numeric options grouped per stage. Every section has
//! defaults, so a TOML file only needs the values it wants to change. The
//! documented option names (`kalmanR`, `sgWindowSize`, ...) are accepted as
//! aliases.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Top-level configuration for [`crate::PpgPipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal camera frame rate (Hz), used until enough timestamps are seen
    pub sample_rate_hz: f32,
    pub sampler: SamplerConfig,
    pub finger: FingerConfig,
    pub filter: FilterConfig,
    pub amplifier: AmplifierConfig,
    pub peaks: PeakConfig,
    pub rr: RrConfig,
    pub quality: QualityConfig,
    pub calibration: CalibrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30.0,
            sampler: SamplerConfig::default(),
            finger: FingerConfig::default(),
            filter: FilterConfig::default(),
            amplifier: AmplifierConfig::default(),
            peaks: PeakConfig::default(),
            rr: RrConfig::default(),
            quality: QualityConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

/// ROI placement and pixel plausibility band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// ROI side length as a fraction of the frame side (0, 1]
    pub roi_fraction: f32,
    /// Relocate the ROI to the reddest sub-window instead of the centre
    pub dynamic_roi: bool,
    /// Number of recent ROIs averaged to reduce jitter
    pub roi_smoothing_window: usize,
    /// Below this many in-band pixels the averages use every ROI pixel
    pub min_valid_pixels: usize,
    /// Inclusive plausible red range
    pub red_range: [u8; 2],
    /// Inclusive plausible green range
    pub green_range: [u8; 2],
    /// Inclusive plausible blue range
    pub blue_range: [u8; 2],
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            roi_fraction: 0.5,
            dynamic_roi: false,
            roi_smoothing_window: 5,
            min_valid_pixels: 16,
            red_range: [20, 250],
            green_range: [10, 220],
            blue_range: [8, 200],
        }
    }
}

/// Finger presence thresholds and hysteresis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerConfig {
    #[serde(alias = "minRedReflectance")]
    pub min_red_reflectance: f32,
    #[serde(alias = "maxRedReflectance")]
    pub max_red_reflectance: f32,
    pub min_rg_ratio: f32,
    pub max_rg_ratio: f32,
    /// Colour-temperature proxy band, (R - B) / (R + B)
    pub min_warmth: f32,
    pub max_warmth: f32,
    pub min_texture: f32,
    pub max_texture: f32,
    /// Minimum percentage of ROI pixels inside the skin band
    pub min_area_pct: f32,
    /// Spectral checks that must pass (out of 5)
    pub required_checks: usize,
    /// Minimum weighted spectral confidence
    pub confidence_threshold: f32,
    /// Red average above this is treated as a saturated/backlit surface
    pub saturation_red: f32,
    /// Luma variance below this is "too uniform" for skin
    pub min_intensity_variance: f32,
    /// Max-to-mean luma ratio above this indicates specular reflection
    pub max_specular_ratio: f32,
    pub min_consecutive_detections: u32,
    pub max_consecutive_no_detections: u32,
}

impl Default for FingerConfig {
    fn default() -> Self {
        Self {
            min_red_reflectance: 60.0,
            max_red_reflectance: 245.0,
            min_rg_ratio: 1.3,
            max_rg_ratio: 10.0,
            min_warmth: 0.2,
            max_warmth: 1.0,
            min_texture: 0.005,
            max_texture: 0.5,
            min_area_pct: 40.0,
            required_checks: 3,
            confidence_threshold: 0.5,
            saturation_red: 252.0,
            min_intensity_variance: 0.5,
            max_specular_ratio: 2.5,
            min_consecutive_detections: 5,
            max_consecutive_no_detections: 8,
        }
    }
}

/// Kalman + Savitzky-Golay filter chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Initial measurement variance
    #[serde(alias = "kalmanR")]
    pub kalman_r: f32,
    /// Initial process variance
    #[serde(alias = "kalmanQ")]
    pub kalman_q: f32,
    /// Re-estimate R and Q from recent samples
    pub adaptive: bool,
    pub adapt_interval: usize,
    pub adapt_min_samples: usize,
    pub r_bounds: [f32; 2],
    pub q_bounds: [f32; 2],
    /// Odd, 3..=9
    #[serde(alias = "sgWindowSize")]
    pub sg_window_size: usize,
    /// EMA factor for the DC baseline
    pub baseline_factor: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kalman_r: 0.05,
            kalman_q: 0.1,
            adaptive: true,
            adapt_interval: 10,
            adapt_min_samples: 20,
            r_bounds: [1e-4, 10.0],
            q_bounds: [1e-4, 10.0],
            sg_window_size: 5,
            baseline_factor: 0.97,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplifierConfig {
    /// Rolling window for min/max amplitude (samples, >= 20)
    pub window_size: usize,
    #[serde(alias = "targetAmplitude")]
    pub target_amplitude: f32,
    #[serde(alias = "minAmplificationFactor")]
    pub min_factor: f32,
    #[serde(alias = "maxAmplificationFactor")]
    pub max_factor: f32,
}

impl Default for AmplifierConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            target_amplitude: 20.0,
            min_factor: 5.0,
            max_factor: 40.0,
        }
    }
}

/// Heartbeat peak detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Trailing window used to normalise values to [0, 1]
    pub normalization_window: usize,
    /// Trailing window a candidate must be the maximum of
    pub confirm_window: usize,
    /// Initial normalised amplitude threshold
    pub signal_threshold: f32,
    /// Initial (negative) normalised derivative threshold
    pub derivative_threshold: f32,
    /// Initial minimum weighted confidence for a raw candidate
    pub min_confidence: f32,
    /// Confidence a candidate needs to be confirmed
    #[serde(alias = "PEAK_VALIDATION_THRESHOLD")]
    pub validation_threshold: f32,
    /// Multiple of the signal threshold for the amplitude fallback
    pub amplitude_multiplier: f32,
    /// Refractory lockout after a confirmed peak
    #[serde(alias = "MIN_PEAK_INTERVAL_MS")]
    pub min_peak_interval_ms: i64,
    pub warmup_samples: usize,
    pub warmup_ms: i64,
    /// Confirmed peaks remembered for threshold adaptation; adapts every half
    pub adapt_history: usize,
    /// Blend rate toward the recent-peak statistics
    pub adapt_rate: f32,
    pub signal_threshold_bounds: [f32; 2],
    pub derivative_threshold_bounds: [f32; 2],
    pub min_confidence_bounds: [f32; 2],
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            normalization_window: 45,
            confirm_window: 5,
            signal_threshold: 0.6,
            derivative_threshold: -0.005,
            min_confidence: 0.5,
            validation_threshold: 0.45,
            amplitude_multiplier: 1.4,
            min_peak_interval_ms: 300,
            warmup_samples: 15,
            warmup_ms: 800,
            adapt_history: 8,
            adapt_rate: 0.3,
            signal_threshold_bounds: [0.3, 0.8],
            derivative_threshold_bounds: [-0.05, -0.001],
            min_confidence_bounds: [0.3, 0.7],
        }
    }
}

/// RR interval bounds and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RrConfig {
    #[serde(alias = "RR_INTERVAL_MIN_MS")]
    pub rr_min_ms: i64,
    #[serde(alias = "RR_INTERVAL_MAX_MS")]
    pub rr_max_ms: i64,
    pub history_size: usize,
    /// Recent intervals used for the median BPM
    pub bpm_window: usize,
    /// Fraction trimmed from each end for the session BPM
    pub trim_fraction: f32,
}

impl Default for RrConfig {
    fn default() -> Self {
        Self {
            rr_min_ms: 300,
            rr_max_ms: 2000,
            history_size: 20,
            bpm_window: 8,
            trim_fraction: 0.2,
        }
    }
}

/// Component weights of the quality score (must sum to 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub snr: f32,
    pub stability: f32,
    pub spectral_purity: f32,
    pub pulsatility: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            snr: 0.35,
            stability: 0.25,
            spectral_purity: 0.20,
            pulsatility: 0.20,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f32 {
        self.snr + self.stability + self.spectral_purity + self.pulsatility
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Rolling buffer of raw / filtered samples (<= 128)
    pub buffer_size: usize,
    /// Samples needed before the FFT SNR estimate replaces the time-domain one (4..=buffer_size)
    pub fft_min_samples: usize,
    /// Heart-rate band (Hz)
    pub min_freq: f32,
    pub max_freq: f32,
    pub snr_floor_db: f32,
    pub snr_ceiling_db: f32,
    /// Short / medium / long stability windows (samples)
    pub stability_windows: [usize; 3],
    /// Coefficient of variation mapped to zero stability
    pub cv_ceiling: f32,
    /// A first difference above `jump_factor * median |diff|` counts as a jump
    pub jump_factor: f32,
    /// AC/DC ratio mapped to full perfusion
    pub perfusion_reference: f32,
    /// Lower edge of the no-finger band
    pub no_finger_floor: f32,
    /// Width of the no-finger band
    pub no_finger_span: f32,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            buffer_size: 128,
            fft_min_samples: 64,
            min_freq: 0.67,
            max_freq: 3.3,
            snr_floor_db: 0.0,
            snr_ceiling_db: 15.0,
            stability_windows: [15, 45, 90],
            cv_ceiling: 0.1,
            jump_factor: 3.0,
            perfusion_reference: 0.01,
            no_finger_floor: 5.0,
            no_finger_span: 10.0,
            weights: QualityWeights::default(),
        }
    }
}

/// Whether normal processing may run without a successful calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CalibrationPolicy {
    #[default]
    Optional,
    Required,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub policy: CalibrationPolicy,
    pub baseline_ms: i64,
    pub finger_ms: i64,
    pub optimization_ms: i64,
    pub validation_ms: i64,
    pub baseline_min_samples: usize,
    pub finger_min_samples: usize,
    pub optimization_min_samples: usize,
    pub validation_min_samples: usize,
    /// Quality a frame needs to count toward the finger / optimization gates
    pub gate_quality: f32,
    /// Fraction of finger-phase frames that must be detected above gate quality
    pub finger_hit_ratio: f32,
    /// Quality a validation frame needs to count as a hit
    pub validation_quality: f32,
    /// Validation accuracy needed for success
    pub pass_accuracy: f32,
    /// Time added to a phase whose gate is unmet at its deadline
    pub extension_ms: i64,
    pub max_extensions: u32,
    /// Absolute clamp for the derived lower red threshold
    pub red_min_bounds: [f32; 2],
    /// Absolute clamp for the derived upper red threshold
    pub red_max_bounds: [f32; 2],
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            policy: CalibrationPolicy::Optional,
            baseline_ms: 2000,
            finger_ms: 3000,
            optimization_ms: 3000,
            validation_ms: 2000,
            baseline_min_samples: 20,
            finger_min_samples: 30,
            optimization_min_samples: 30,
            validation_min_samples: 20,
            gate_quality: 30.0,
            finger_hit_ratio: 0.5,
            validation_quality: 40.0,
            pass_accuracy: 0.7,
            extension_ms: 1000,
            max_extensions: 3,
            red_min_bounds: [20.0, 200.0],
            red_max_bounds: [80.0, 255.0],
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from file, then apply `PULSECAM_*` environment overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment variable overrides.
    ///
    /// Example: `PULSECAM_KALMAN_R=0.02`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        env_override("PULSECAM_SAMPLE_RATE_HZ", &mut self.sample_rate_hz)?;
        env_override("PULSECAM_DYNAMIC_ROI", &mut self.sampler.dynamic_roi)?;
        env_override(
            "PULSECAM_MIN_RED_REFLECTANCE",
            &mut self.finger.min_red_reflectance,
        )?;
        env_override("PULSECAM_KALMAN_R", &mut self.filter.kalman_r)?;
        env_override("PULSECAM_KALMAN_Q", &mut self.filter.kalman_q)?;
        env_override("PULSECAM_SG_WINDOW_SIZE", &mut self.filter.sg_window_size)?;
        env_override(
            "PULSECAM_TARGET_AMPLITUDE",
            &mut self.amplifier.target_amplitude,
        )?;
        env_override(
            "PULSECAM_PEAK_VALIDATION_THRESHOLD",
            &mut self.peaks.validation_threshold,
        )?;
        env_override("PULSECAM_RR_MIN_MS", &mut self.rr.rr_min_ms)?;
        env_override("PULSECAM_RR_MAX_MS", &mut self.rr.rr_max_ms)?;
        Ok(())
    }

    /// Validate configuration values. Called before any pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0 && self.sample_rate_hz <= 240.0) {
            return Err(ConfigError::invalid("sample_rate_hz must be in (0, 240]"));
        }

        let s = &self.sampler;
        if !(s.roi_fraction > 0.0 && s.roi_fraction <= 1.0) {
            return Err(ConfigError::invalid("sampler.roi_fraction must be in (0, 1]"));
        }
        if s.roi_smoothing_window == 0 {
            return Err(ConfigError::invalid("sampler.roi_smoothing_window must be >= 1"));
        }
        for (name, range) in [
            ("red_range", s.red_range),
            ("green_range", s.green_range),
            ("blue_range", s.blue_range),
        ] {
            if range[0] > range[1] {
                return Err(ConfigError::invalid(format!(
                    "sampler.{name} lower bound exceeds upper bound"
                )));
            }
        }

        let f = &self.finger;
        if f.min_red_reflectance >= f.max_red_reflectance {
            return Err(ConfigError::invalid(
                "finger.min_red_reflectance must be below max_red_reflectance",
            ));
        }
        if f.min_rg_ratio >= f.max_rg_ratio {
            return Err(ConfigError::invalid("finger.min_rg_ratio must be below max_rg_ratio"));
        }
        if f.required_checks == 0 || f.required_checks > 5 {
            return Err(ConfigError::invalid("finger.required_checks must be in 1..=5"));
        }
        if f.min_consecutive_detections == 0 || f.max_consecutive_no_detections == 0 {
            return Err(ConfigError::invalid("finger hysteresis counts must be >= 1"));
        }

        let k = &self.filter;
        if k.sg_window_size % 2 == 0 || !(3..=9).contains(&k.sg_window_size) {
            return Err(ConfigError::invalid(format!(
                "filter.sg_window_size must be odd and in 3..=9, got {}",
                k.sg_window_size
            )));
        }
        if k.kalman_r <= 0.0 || k.kalman_q <= 0.0 {
            return Err(ConfigError::invalid("filter.kalman_r and kalman_q must be positive"));
        }
        if k.r_bounds[0] <= 0.0 || k.r_bounds[0] > k.r_bounds[1] {
            return Err(ConfigError::invalid("filter.r_bounds must be positive and ordered"));
        }
        if k.q_bounds[0] <= 0.0 || k.q_bounds[0] > k.q_bounds[1] {
            return Err(ConfigError::invalid("filter.q_bounds must be positive and ordered"));
        }
        if k.adapt_interval == 0 || k.adapt_min_samples < 3 {
            return Err(ConfigError::invalid(
                "filter.adapt_interval must be >= 1 and adapt_min_samples >= 3",
            ));
        }
        if !(0.9..=0.999).contains(&k.baseline_factor) {
            return Err(ConfigError::invalid("filter.baseline_factor must be in [0.9, 0.999]"));
        }

        let a = &self.amplifier;
        if a.window_size < 20 {
            return Err(ConfigError::invalid("amplifier.window_size must be >= 20"));
        }
        if a.target_amplitude <= 0.0 {
            return Err(ConfigError::invalid("amplifier.target_amplitude must be positive"));
        }
        if a.min_factor <= 0.0 || a.min_factor > a.max_factor {
            return Err(ConfigError::invalid(
                "amplifier.min_factor must be positive and <= max_factor",
            ));
        }

        let p = &self.peaks;
        if p.confirm_window < 3 || p.normalization_window < p.confirm_window {
            return Err(ConfigError::invalid(
                "peaks.confirm_window must be >= 3 and <= normalization_window",
            ));
        }
        if p.min_peak_interval_ms <= 0 {
            return Err(ConfigError::invalid("peaks.min_peak_interval_ms must be positive"));
        }
        if p.adapt_history < 2 {
            return Err(ConfigError::invalid("peaks.adapt_history must be >= 2"));
        }
        if !(0.0..=1.0).contains(&p.adapt_rate) {
            return Err(ConfigError::invalid("peaks.adapt_rate must be in [0, 1]"));
        }
        ordered_containing(
            "peaks.signal_threshold",
            p.signal_threshold_bounds,
            p.signal_threshold,
        )?;
        ordered_containing(
            "peaks.derivative_threshold",
            p.derivative_threshold_bounds,
            p.derivative_threshold,
        )?;
        if p.derivative_threshold_bounds[1] >= 0.0 {
            return Err(ConfigError::invalid("peaks.derivative_threshold must stay negative"));
        }
        ordered_containing("peaks.min_confidence", p.min_confidence_bounds, p.min_confidence)?;

        let r = &self.rr;
        if r.rr_min_ms <= 0 || r.rr_min_ms >= r.rr_max_ms {
            return Err(ConfigError::invalid("rr.rr_min_ms must be positive and below rr_max_ms"));
        }
        if r.history_size == 0 || r.bpm_window == 0 {
            return Err(ConfigError::invalid("rr.history_size and bpm_window must be >= 1"));
        }
        if !(0.0..0.5).contains(&r.trim_fraction) {
            return Err(ConfigError::invalid("rr.trim_fraction must be in [0, 0.5)"));
        }

        let q = &self.quality;
        if q.buffer_size < 16 || q.buffer_size > 128 {
            return Err(ConfigError::invalid("quality.buffer_size must be in 16..=128"));
        }
        if q.fft_min_samples < 4 || q.fft_min_samples > q.buffer_size {
            return Err(ConfigError::invalid(
                "quality.fft_min_samples must be in 4..=buffer_size",
            ));
        }
        if q.min_freq <= 0.0 || q.min_freq >= q.max_freq {
            return Err(ConfigError::invalid("quality.min_freq must be positive and below max_freq"));
        }
        if q.snr_floor_db >= q.snr_ceiling_db {
            return Err(ConfigError::invalid("quality.snr_floor_db must be below snr_ceiling_db"));
        }
        if (q.weights.sum() - 1.0).abs() > 1e-3 {
            return Err(ConfigError::invalid(format!(
                "quality.weights must sum to 1, got {:.3}",
                q.weights.sum()
            )));
        }
        if q.no_finger_floor < 0.0 || q.no_finger_floor + q.no_finger_span > 100.0 {
            return Err(ConfigError::invalid("quality no-finger band must lie in [0, 100]"));
        }

        let c = &self.calibration;
        if c.baseline_ms <= 0 || c.finger_ms <= 0 || c.optimization_ms <= 0 || c.validation_ms <= 0
        {
            return Err(ConfigError::invalid("calibration phase durations must be positive"));
        }
        if c.extension_ms <= 0 {
            return Err(ConfigError::invalid("calibration.extension_ms must be positive"));
        }
        if c.red_min_bounds[0] > c.red_min_bounds[1] || c.red_max_bounds[0] > c.red_max_bounds[1]
        {
            return Err(ConfigError::invalid("calibration red bounds must be ordered"));
        }

        Ok(())
    }
}

fn ordered_containing(name: &str, bounds: [f32; 2], value: f32) -> Result<(), ConfigError> {
    if bounds[0] > bounds[1] || value < bounds[0] || value > bounds[1] {
        return Err(ConfigError::invalid(format!(
            "{name} = {value} must lie within ordered bounds [{}, {}]",
            bounds[0], bounds[1]
        )));
    }
    Ok(())
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(key) {
        *slot = val
            .parse()
            .map_err(|_| ConfigError::invalid(format!("Invalid {key}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = include_str!("../../../config/pulsecam.toml");
        let config = PipelineConfig::from_toml_str(shipped).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_even_sg_window_rejected() {
        let mut config = PipelineConfig::default();
        config.filter.sg_window_size = 4;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("sg_window_size")));
    }

    #[test]
    fn test_fft_min_samples_bounds() {
        let mut config = PipelineConfig::default();
        config.quality.fft_min_samples = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("fft_min_samples")));

        config.quality.fft_min_samples = config.quality.buffer_size + 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("fft_min_samples")));

        config.quality.fft_min_samples = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_gain_bounds_rejected() {
        let mut config = PipelineConfig::default();
        config.amplifier.min_factor = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_with_aliases() {
        let toml = r#"
            sample_rate_hz = 60.0

            [filter]
            kalmanR = 0.2
            sgWindowSize = 7

            [amplifier]
            targetAmplitude = 12.0
            maxAmplificationFactor = 30.0

            [peaks]
            PEAK_VALIDATION_THRESHOLD = 0.5

            [rr]
            RR_INTERVAL_MIN_MS = 333
        "#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.sample_rate_hz, 60.0);
        assert_eq!(config.filter.kalman_r, 0.2);
        assert_eq!(config.filter.sg_window_size, 7);
        assert_eq!(config.amplifier.target_amplitude, 12.0);
        assert_eq!(config.amplifier.max_factor, 30.0);
        assert_eq!(config.peaks.validation_threshold, 0.5);
        assert_eq!(config.rr.rr_min_ms, 333);
        // untouched sections keep defaults
        assert_eq!(config.finger, FingerConfig::default());
    }

    #[test]
    fn test_invalid_toml_fails_fast() {
        let err = PipelineConfig::from_toml_str("[filter]\nsg_window_size = 6\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("PULSECAM_KALMAN_Q", "0.25");
        let mut config = PipelineConfig::default();
        let res = config.apply_env_overrides();
        std::env::remove_var("PULSECAM_KALMAN_Q");
        assert!(res.is_ok());
        assert_eq!(config.filter.kalman_q, 0.25);
    }
}

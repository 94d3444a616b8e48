//! Signal quality scoring
//!
//! Combines four components into a smoothed 0-100 score:
//! - SNR: heart-band FFT power ratio, or var(AC) / R before the buffer fills
//! - Stability: inverted CV of the raw red level over three window lengths
//! - Spectral purity: share of difference energy not caused by sudden jumps
//! - Pulsatility: recent peak confidence blended with a perfusion index

use std::collections::VecDeque;
use std::f32::consts::PI;

use ndarray::Array1;
use num_complex::Complex32;
use rustfft::FftPlanner;
use serde::Serialize;

use super::stats;
use crate::config::QualityConfig;

const EPSILON: f32 = 1e-9;
const STABILITY_WEIGHTS: [f32; 3] = [0.5, 0.3, 0.2];

/// Quality breakdown for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QualitySnapshot {
    pub snr_db: f32,
    pub stability: f32,
    pub spectral_purity: f32,
    pub pulsatility: f32,
    /// Smoothed overall score in [0, 100]
    pub score: f32,
}

/// Per-frame inputs gathered from the other stages
#[derive(Debug, Clone, Copy)]
pub struct QualityInputs<'a> {
    pub timestamp_ms: i64,
    /// Raw red level
    pub raw: f32,
    /// Filtered AC component
    pub ac: f32,
    pub finger_detected: bool,
    pub detection_confidence: f32,
    /// Current Kalman measurement variance
    pub measurement_variance: f32,
    /// Confidences of recently confirmed peaks
    pub peak_confidences: &'a [f32],
}

pub struct SignalQualityScorer {
    config: QualityConfig,
    nominal_rate_hz: f32,
    raw: VecDeque<f32>,
    ac: VecDeque<f32>,
    timestamps: VecDeque<i64>,
    previous: Option<f32>,
    fft_planner: FftPlanner<f32>,
}

impl SignalQualityScorer {
    pub fn new(config: QualityConfig, nominal_rate_hz: f32) -> Self {
        let cap = config.buffer_size;
        Self {
            config,
            nominal_rate_hz,
            raw: VecDeque::with_capacity(cap),
            ac: VecDeque::with_capacity(cap),
            timestamps: VecDeque::with_capacity(cap),
            previous: None,
            fft_planner: FftPlanner::new(),
        }
    }

    pub fn score(&mut self, inputs: &QualityInputs<'_>) -> QualitySnapshot {
        if !inputs.finger_detected {
            self.previous = None;
            let c = &self.config;
            let conf = finite_or(inputs.detection_confidence, 0.0).clamp(0.0, 1.0);
            return QualitySnapshot {
                score: (c.no_finger_floor + c.no_finger_span * conf).clamp(0.0, 100.0),
                ..QualitySnapshot::default()
            };
        }

        self.push(inputs);

        let snr_db = self.snr_db(inputs.measurement_variance);
        let c = &self.config;
        let snr = ((snr_db - c.snr_floor_db) / (c.snr_ceiling_db - c.snr_floor_db)).clamp(0.0, 1.0);
        let stability = self.stability();
        let spectral_purity = self.spectral_purity();
        let pulsatility = self.pulsatility(inputs.peak_confidences);

        let w = &self.config.weights;
        let raw_score = 100.0
            * (w.snr * snr
                + w.stability * stability
                + w.spectral_purity * spectral_purity
                + w.pulsatility * pulsatility);
        let raw_score = finite_or(raw_score, 0.0).clamp(0.0, 100.0);

        let score = match self.previous {
            Some(prev) => {
                let delta = (raw_score - prev).abs();
                let alpha = if delta < 5.0 {
                    0.15
                } else if delta < 20.0 {
                    0.35
                } else {
                    0.6
                };
                prev + alpha * (raw_score - prev)
            }
            None => raw_score,
        };
        let score = finite_or(score, 0.0).clamp(0.0, 100.0);
        self.previous = Some(score);

        QualitySnapshot {
            snr_db: finite_or(snr_db, c.snr_floor_db),
            stability,
            spectral_purity,
            pulsatility,
            score,
        }
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.ac.clear();
        self.timestamps.clear();
        self.previous = None;
    }

    pub fn buffered(&self) -> usize {
        self.ac.len()
    }

    fn push(&mut self, inputs: &QualityInputs<'_>) {
        if self.ac.len() >= self.config.buffer_size {
            self.raw.pop_front();
            self.ac.pop_front();
            self.timestamps.pop_front();
        }
        self.raw.push_back(finite_or(inputs.raw, 0.0));
        self.ac.push_back(finite_or(inputs.ac, 0.0));
        self.timestamps.push_back(inputs.timestamp_ms);
    }

    /// Sample rate from buffered timestamps, nominal rate as fallback
    fn sample_rate(&self) -> f32 {
        match (self.timestamps.front(), self.timestamps.back()) {
            (Some(&first), Some(&last)) if last > first && self.timestamps.len() > 1 => {
                (self.timestamps.len() - 1) as f32 * 1000.0 / (last - first) as f32
            }
            _ => self.nominal_rate_hz,
        }
    }

    fn snr_db(&mut self, measurement_variance: f32) -> f32 {
        let c = &self.config;
        if self.ac.len() >= c.fft_min_samples {
            let fs = self.sample_rate();
            return self.spectral_snr_db(fs);
        }

        let ac: Vec<f32> = self.ac.iter().copied().collect();
        let ratio = stats::variance(&ac) / measurement_variance.max(EPSILON);
        if ratio > EPSILON {
            10.0 * ratio.log10()
        } else {
            c.snr_floor_db
        }
    }

    /// Power in the dominant heart-band bin (+-1) against the rest of the band
    fn spectral_snr_db(&mut self, fs: f32) -> f32 {
        let signal = Array1::from_iter(self.ac.iter().copied());
        let n = signal.len();
        let mean = signal.mean().unwrap_or(0.0);

        let mut buffer: Vec<Complex32> = signal
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let window = 0.54 - 0.46 * (2.0 * PI * i as f32 / (n - 1) as f32).cos();
                Complex32::new((s - mean) * window, 0.0)
            })
            .collect();

        let fft = self.fft_planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let half_n = n / 2;
        let bin_res = fs / n as f32;
        let min_bin = ((self.config.min_freq / bin_res).ceil() as usize).max(1);
        let max_bin = ((self.config.max_freq / bin_res).floor() as usize).min(half_n - 1);
        if min_bin > max_bin {
            return self.config.snr_floor_db;
        }

        let powers: Vec<f32> = (min_bin..=max_bin).map(|i| buffer[i].norm_sqr()).collect();
        let peak_idx = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let lo = peak_idx.saturating_sub(1);
        let hi = (peak_idx + 1).min(powers.len() - 1);
        let signal_power: f32 = powers[lo..=hi].iter().sum();
        let total: f32 = powers.iter().sum();
        let noise_power = total - signal_power;

        if signal_power <= EPSILON {
            self.config.snr_floor_db
        } else if noise_power <= EPSILON {
            self.config.snr_ceiling_db
        } else {
            10.0 * (signal_power / noise_power).log10()
        }
    }

    fn stability(&self) -> f32 {
        let raw: Vec<f32> = self.raw.iter().copied().collect();
        let mut acc = 0.0;
        let mut weight = 0.0;
        for (&window, &w) in self.config.stability_windows.iter().zip(&STABILITY_WEIGHTS) {
            let len = window.min(raw.len());
            if len < 3 {
                continue;
            }
            let cv = stats::coefficient_of_variation(&raw[raw.len() - len..]);
            acc += w * (1.0 - cv / self.config.cv_ceiling).clamp(0.0, 1.0);
            weight += w;
        }
        if weight > 0.0 {
            acc / weight
        } else {
            0.0
        }
    }

    fn spectral_purity(&self) -> f32 {
        let ac: Vec<f32> = self.ac.iter().copied().collect();
        let d = stats::diff(&ac);
        if d.len() < 4 {
            return 0.5;
        }
        let total: f32 = d.iter().map(|v| v * v).sum();
        if total <= EPSILON {
            return 1.0;
        }
        let abs: Vec<f32> = d.iter().map(|v| v.abs()).collect();
        let threshold = self.config.jump_factor * stats::median(&abs);
        let jumps: f32 = d.iter().filter(|v| v.abs() > threshold).map(|v| v * v).sum();
        (1.0 - jumps / total).clamp(0.0, 1.0)
    }

    fn pulsatility(&self, peak_confidences: &[f32]) -> f32 {
        let confidence = stats::mean(peak_confidences).clamp(0.0, 1.0);
        let (lo, hi) = stats::min_max(&self.ac);
        let dc = stats::mean(&self.raw.iter().copied().collect::<Vec<_>>());
        let perfusion = if dc > 1.0 {
            ((hi - lo) / dc / self.config.perfusion_reference).clamp(0.0, 1.0)
        } else {
            0.0
        };
        finite_or(0.6 * confidence + 0.4 * perfusion, 0.0)
    }
}

#[inline]
fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

//! Frame Sampler
//!
//! Places the region of interest and reduces it to a [`FrameMetrics`] summary:
//! - Centred or dynamically placed ROI, smoothed over a short rolling window
//! - Per-channel averages over pixels inside the skin plausibility band
//! - Red median / p10 / p90 from a 256-bin histogram
//! - Luma texture, edge gradient, variance and specular ratio

use std::collections::VecDeque;

use serde::Serialize;

use super::frame::{luma, Frame};
use crate::config::SamplerConfig;

const EPSILON: f32 = 1e-6;

/// Region of interest, always inside the frame it was computed for
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// 1.0 for a stationary ROI, falling toward 0 as it jitters
    pub stability: f32,
}

impl Roi {
    #[inline]
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// Per-frame scalar summary of the ROI
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrameMetrics {
    pub avg_red: f32,
    pub avg_green: f32,
    pub avg_blue: f32,
    pub median_red: f32,
    pub red_p10: f32,
    pub red_p90: f32,
    pub red_green_ratio: f32,
    pub red_blue_ratio: f32,
    /// (R - B) / (R + B), a colour-temperature proxy in [-1, 1]
    pub warmth: f32,
    /// Coefficient of variation of luma, [0, 1]
    pub texture_score: f32,
    /// Mean absolute horizontal luma gradient / 255, [0, 1]
    pub edge_score: f32,
    /// Luma variance
    pub intensity_variance: f32,
    /// Max luma / mean luma
    pub specular_ratio: f32,
    /// Percentage of ROI pixels inside the skin band
    pub valid_area_pct: f32,
    pub valid_pixel_count: usize,
    /// Total ROI pixels examined
    pub pixel_count: usize,
    pub roi_stability: f32,
}

impl FrameMetrics {
    /// Metrics for a region with no usable pixels
    pub fn no_signal() -> Self {
        Self::default()
    }

    /// True when the metrics cannot describe a real surface
    pub fn is_degenerate(&self) -> bool {
        self.pixel_count == 0
            || ![
                self.avg_red,
                self.avg_green,
                self.avg_blue,
                self.texture_score,
                self.intensity_variance,
                self.specular_ratio,
            ]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Fixed-size red histogram
struct Histogram {
    bins: [u32; 256],
    total: u32,
}

impl Histogram {
    fn new() -> Self {
        Self {
            bins: [0; 256],
            total: 0,
        }
    }

    #[inline]
    fn add(&mut self, value: u8) {
        self.bins[value as usize] += 1;
        self.total += 1;
    }

    /// Smallest value whose cumulative count reaches `p` of the total
    fn percentile(&self, p: f32) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        let rank = ((p * self.total as f32).ceil() as u32).max(1);
        let mut cumulative = 0u32;
        for (value, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= rank {
                return value as f32;
            }
        }
        255.0
    }
}

#[derive(Default)]
struct ChannelSums {
    sum: [f64; 3],
    count: usize,
}

impl ChannelSums {
    #[inline]
    fn add(&mut self, px: [u8; 3]) {
        self.sum[0] += px[0] as f64;
        self.sum[1] += px[1] as f64;
        self.sum[2] += px[2] as f64;
        self.count += 1;
    }

    fn mean(&self) -> [f32; 3] {
        if self.count == 0 {
            return [0.0; 3];
        }
        let inv = 1.0 / self.count as f64;
        [
            (self.sum[0] * inv) as f32,
            (self.sum[1] * inv) as f32,
            (self.sum[2] * inv) as f32,
        ]
    }
}

pub struct FrameSampler {
    config: SamplerConfig,
    /// Recent unsmoothed ROIs
    history: VecDeque<Roi>,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        let capacity = config.roi_smoothing_window;
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Compute the ROI and its metrics for one frame.
    ///
    /// The frame is assumed to have passed [`Frame::validate`].
    pub fn sample(&mut self, frame: &Frame) -> (Roi, FrameMetrics) {
        let raw = self.place_roi(frame);
        if self.history.len() >= self.config.roi_smoothing_window {
            self.history.pop_front();
        }
        self.history.push_back(raw);

        let mut roi = self.smoothed_roi(frame);
        roi.stability = self.stability(frame);

        if roi.area() == 0 {
            let mut metrics = FrameMetrics::no_signal();
            metrics.roi_stability = roi.stability;
            return (roi, metrics);
        }

        let metrics = self.measure(frame, &roi);
        (roi, metrics)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn roi_size(&self, frame: &Frame) -> (u32, u32) {
        let w = (frame.width as f32 * self.config.roi_fraction) as u32;
        let h = (frame.height as f32 * self.config.roi_fraction) as u32;
        (w.min(frame.width), h.min(frame.height))
    }

    fn place_roi(&self, frame: &Frame) -> Roi {
        let (w, h) = self.roi_size(frame);
        let free_x = frame.width - w;
        let free_y = frame.height - h;

        if !self.config.dynamic_roi || w == 0 || h == 0 {
            return Roi {
                x: free_x / 2,
                y: free_y / 2,
                width: w,
                height: h,
                stability: 1.0,
            };
        }

        // 3x3 grid of candidate placements, keep the reddest
        let steps = [0, free_x / 2, free_x];
        let rows = [0, free_y / 2, free_y];
        let mut best = (f32::MIN, free_x / 2, free_y / 2);
        for &y in &rows {
            for &x in &steps {
                let red = frame.roi_mean_rgb(x, y, w, h)[0];
                if red > best.0 {
                    best = (red, x, y);
                }
            }
        }

        Roi {
            x: best.1,
            y: best.2,
            width: w,
            height: h,
            stability: 1.0,
        }
    }

    fn smoothed_roi(&self, frame: &Frame) -> Roi {
        let n = self.history.len().max(1) as f32;
        let mut acc = [0.0f32; 4];
        for r in &self.history {
            acc[0] += r.x as f32;
            acc[1] += r.y as f32;
            acc[2] += r.width as f32;
            acc[3] += r.height as f32;
        }

        let width = ((acc[2] / n).round() as u32).min(frame.width);
        let height = ((acc[3] / n).round() as u32).min(frame.height);
        let x = ((acc[0] / n).round() as u32).min(frame.width - width);
        let y = ((acc[1] / n).round() as u32).min(frame.height - height);

        Roi {
            x,
            y,
            width,
            height,
            stability: 1.0,
        }
    }

    fn stability(&self, frame: &Frame) -> f32 {
        if self.history.len() < 2 {
            return 1.0;
        }
        let diagonal = ((frame.width as f32).powi(2) + (frame.height as f32).powi(2)).sqrt();
        let reference = (0.1 * diagonal).max(EPSILON);

        let centers: Vec<(f32, f32)> = self.history.iter().map(Roi::center).collect();
        let total: f32 = centers
            .windows(2)
            .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
            .sum();
        let mean_displacement = total / (centers.len() - 1) as f32;

        (1.0 - mean_displacement / reference).clamp(0.0, 1.0)
    }

    #[inline]
    fn in_band(&self, px: [u8; 3]) -> bool {
        let c = &self.config;
        (c.red_range[0]..=c.red_range[1]).contains(&px[0])
            && (c.green_range[0]..=c.green_range[1]).contains(&px[1])
            && (c.blue_range[0]..=c.blue_range[1]).contains(&px[2])
    }

    fn measure(&self, frame: &Frame, roi: &Roi) -> FrameMetrics {
        let mut all = ChannelSums::default();
        let mut valid = ChannelSums::default();
        let mut all_hist = Histogram::new();
        let mut valid_hist = Histogram::new();

        let mut luma_sum = 0.0f64;
        let mut luma_sq = 0.0f64;
        let mut luma_max = 0.0f32;
        let mut grad_sum = 0.0f64;
        let mut grad_count = 0usize;

        for y in roi.y..roi.y + roi.height {
            let mut prev: Option<f32> = None;
            for x in roi.x..roi.x + roi.width {
                let px = frame.get_pixel(x, y);
                all.add(px);
                all_hist.add(px[0]);
                if self.in_band(px) {
                    valid.add(px);
                    valid_hist.add(px[0]);
                }

                let l = luma(px);
                luma_sum += l as f64;
                luma_sq += (l as f64) * (l as f64);
                luma_max = luma_max.max(l);
                if let Some(p) = prev {
                    grad_sum += (l - p).abs() as f64;
                    grad_count += 1;
                }
                prev = Some(l);
            }
        }

        let pixel_count = all.count;
        if pixel_count == 0 {
            return FrameMetrics::no_signal();
        }

        let use_valid = valid.count >= self.config.min_valid_pixels.max(1);
        let (rgb, hist) = if use_valid {
            (valid.mean(), &valid_hist)
        } else {
            (all.mean(), &all_hist)
        };
        let [r, g, b] = rgb;

        let n = pixel_count as f64;
        let luma_mean = (luma_sum / n) as f32;
        let luma_var = ((luma_sq / n) - (luma_sum / n).powi(2)).max(0.0) as f32;
        let texture = if luma_mean > EPSILON {
            (luma_var.sqrt() / luma_mean).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let edge = if grad_count > 0 {
            ((grad_sum / grad_count as f64) as f32 / 255.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        FrameMetrics {
            avg_red: r,
            avg_green: g,
            avg_blue: b,
            median_red: hist.percentile(0.5),
            red_p10: hist.percentile(0.1),
            red_p90: hist.percentile(0.9),
            red_green_ratio: r / g.max(1.0),
            red_blue_ratio: r / b.max(1.0),
            warmth: (r - b) / (r + b).max(1.0),
            texture_score: texture,
            edge_score: edge,
            intensity_variance: luma_var,
            specular_ratio: luma_max / luma_mean.max(1.0),
            valid_area_pct: 100.0 * valid.count as f32 / pixel_count as f32,
            valid_pixel_count: valid.count,
            pixel_count,
            roi_stability: roi.stability,
        }
    }
}

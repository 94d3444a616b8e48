//! Synthetic camera frames for tests, benchmarks and the CLI.
//!
//! `FingerSignal` produces a fingertip-over-flash image whose red channel
//! pulses at a chosen heart rate. A fixed per-pixel pattern gives the skin
//! some texture so presence checks behave as they would on a real finger.

use std::f32::consts::PI;

use crate::vision::{Frame, PixelFormat};

pub const DEFAULT_FPS: f32 = 30.0;

/// Capture timestamp of frame `index` at a fixed rate
pub fn timestamp_ms(index: usize, fps: f32) -> i64 {
    (index as f64 * 1000.0 / fps as f64) as i64
}

#[derive(Debug, Clone)]
pub struct FingerSignal {
    pub heart_rate_bpm: f32,
    /// Red pulse amplitude (peak, 0-255 scale)
    pub amplitude: f32,
    pub base_rgb: [f32; 3],
    pub fps: f32,
    /// Add the fixed per-pixel pattern (about +-5 levels)
    pub texture: bool,
}

impl Default for FingerSignal {
    fn default() -> Self {
        Self {
            heart_rate_bpm: 72.0,
            amplitude: 2.0,
            base_rgb: [150.0, 60.0, 45.0],
            fps: DEFAULT_FPS,
            texture: true,
        }
    }
}

impl FingerSignal {
    pub fn with_heart_rate(heart_rate_bpm: f32) -> Self {
        Self {
            heart_rate_bpm,
            ..Self::default()
        }
    }

    /// Red level at frame `index`, before texture
    pub fn red_at(&self, index: usize) -> f32 {
        let t = index as f32 / self.fps;
        let freq = self.heart_rate_bpm / 60.0;
        self.base_rgb[0] + self.amplitude * (2.0 * PI * freq * t).sin()
    }

    pub fn frame(&self, index: usize, width: u32, height: u32) -> Frame {
        let red = self.red_at(index);
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                // integer pattern plus a sub-level dither so the ROI mean is
                // not stuck on whole intensity steps
                let offset = if self.texture {
                    ((x * 7 + y * 13) % 11) as f32 - 5.0 + ((x * 3 + y * 5) % 8) as f32 / 8.0
                } else {
                    0.0
                };
                data.push(to_u8(red + offset));
                data.push(to_u8(self.base_rgb[1] + offset));
                data.push(to_u8(self.base_rgb[2] + offset));
            }
        }
        Frame::new(data, width, height, PixelFormat::Rgb8, timestamp_ms(index, self.fps))
    }
}

/// Default 72 BPM finger frame at 30 fps
pub fn finger_frame(index: usize, width: u32, height: u32) -> Frame {
    FingerSignal::default().frame(index, width, height)
}

/// Flat mid-gray frame: no finger, no pulse
pub fn ambient_frame(index: usize, width: u32, height: u32) -> Frame {
    Frame::filled(width, height, [128, 128, 128], timestamp_ms(index, DEFAULT_FPS))
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

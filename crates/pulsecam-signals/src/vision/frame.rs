//! Camera frame
//!
//! Row-major RGB8 or RGBA8 pixel data plus the capture timestamp. The
//! pipeline only borrows a frame for the duration of one call.

use crate::error::{ErrorCode, ProcessingError};

/// Pixel layout of [`Frame::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data (row-major)
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    pub format: PixelFormat,
    /// Capture timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, timestamp_ms: i64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_ms,
        }
    }

    /// RGB8 frame where every pixel has the same colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], timestamp_ms: i64) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 3);
        for _ in 0..count {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, PixelFormat::Rgb8, timestamp_ms)
    }

    /// Check dimensions and buffer length before any pixel is read.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.width == 0 || self.height == 0 {
            return Err(ProcessingError::new(
                ErrorCode::EmptyFrame,
                format!("frame has zero dimension ({}x{})", self.width, self.height),
                self.timestamp_ms,
            ));
        }
        let expected = self.width as usize * self.height as usize * self.format.channels();
        if self.data.len() != expected {
            return Err(ProcessingError::new(
                ErrorCode::BufferSizeMismatch,
                format!("expected {} bytes, got {}", expected, self.data.len()),
                self.timestamp_ms,
            ));
        }
        Ok(())
    }

    /// Pixel at (x, y) as [R, G, B]; black outside the frame or buffer
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.format.channels();
        match self.data.get(idx..idx + 3) {
            Some(px) => [px[0], px[1], px[2]],
            None => [0, 0, 0],
        }
    }

    /// Mean RGB of a rectangle, clipped to the frame
    pub fn roi_mean_rgb(&self, x: u32, y: u32, w: u32, h: u32) -> [f32; 3] {
        let mut sum = [0.0f64; 3];
        let mut count = 0u32;

        for py in y..y.saturating_add(h).min(self.height) {
            for px in x..x.saturating_add(w).min(self.width) {
                let p = self.get_pixel(px, py);
                sum[0] += p[0] as f64;
                sum[1] += p[1] as f64;
                sum[2] += p[2] as f64;
                count += 1;
            }
        }

        if count > 0 {
            let inv = 1.0 / count as f64;
            [(sum[0] * inv) as f32, (sum[1] * inv) as f32, (sum[2] * inv) as f32]
        } else {
            [0.0, 0.0, 0.0]
        }
    }
}

/// BT.601 luma
#[inline]
pub fn luma(rgb: [u8; 3]) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

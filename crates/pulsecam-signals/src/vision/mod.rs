//! Vision module for camera frames and ROI sampling
//!
//! This module provides:
//! - `Frame` for RGB8 / RGBA8 pixel buffers with a capture timestamp
//! - `FrameSampler` which places the region of interest and reduces it to
//!   `FrameMetrics`
//!
//! # Example
//!
//! ```ignore
//! use pulsecam_signals::vision::{Frame, FrameSampler, PixelFormat};
//! use pulsecam_signals::config::SamplerConfig;
//!
//! let mut sampler = FrameSampler::new(SamplerConfig::default());
//! let frame = Frame::new(bytes, 640, 480, PixelFormat::Rgba8, timestamp_ms);
//! frame.validate()?;
//! let (roi, metrics) = sampler.sample(&frame);
//! println!("red {:.1} over {} px", metrics.avg_red, roi.area());
//! ```

mod frame;
mod sampler;

pub use frame::{luma, Frame, PixelFormat};
pub use sampler::{FrameMetrics, FrameSampler, Roi};

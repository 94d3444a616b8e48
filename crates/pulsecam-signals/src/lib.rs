//! # pulsecam-signals
//!
//! Camera photoplethysmography (PPG) for a fingertip held over the lens.
//!
//! This crate provides:
//! - **Vision**: frame validation, ROI placement and per-frame metrics
//! - **Presence**: finger detection with veto checks and hysteresis
//! - **DSP**: adaptive Kalman / Savitzky-Golay filtering, amplification and
//!   signal quality scoring
//! - **Physio**: heartbeat peaks, RR intervals, BPM and HRV
//! - **Calibration**: a phased session that tunes thresholds and gain
//!
//! ## Example
//!
//! ```ignore
//! use pulsecam_signals::{PipelineConfig, PpgPipeline};
//!
//! let mut pipeline = PpgPipeline::new(PipelineConfig::default())?;
//! pipeline.start();
//!
//! for frame in camera_frames {
//!     match pipeline.process_frame(&frame) {
//!         Ok(signal) => {
//!             if let Some(bpm) = signal.heart_rate_bpm {
//!                 println!("Heart rate: {:.1} BPM (quality {:.0})", bpm, signal.quality);
//!             }
//!         }
//!         Err(err) => eprintln!("frame skipped: {err}"),
//!     }
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod dsp;
pub mod error;
pub mod observer;
pub mod physio;
pub mod pipeline;
pub mod presence;
pub mod synthetic;
pub mod vision;

pub use calibration::{
    CalibrationController, CalibrationPhase, CalibrationResult, CalibrationUpdate, ReferenceData,
};
pub use config::{CalibrationPolicy, PipelineConfig};
pub use error::{ConfigError, ErrorCode, ProcessingError};
pub use observer::{ChannelObserver, PipelineEvent, PipelineObserver};
pub use pipeline::{PipelineDiagnostics, PpgPipeline, ProcessedSignal};
pub use presence::{DetectionResult, FingerPresenceDetector};
pub use vision::{Frame, PixelFormat};

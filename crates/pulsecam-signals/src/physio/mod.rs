//! Beat-level estimators built on the amplified PPG waveform.
//!
//! Notes:
//! - Peaks are only meaningful while a finger is detected. The pipeline
//!   resets the peak detector on acquisition and loss; the RR tracker
//!   keeps its intervals and only forgets the last peak on loss.
//! - HRV from a phone camera is indicative only.

mod peaks;
mod rr;

pub use peaks::{ArmState, PeakDecision, PeakDetector, PeakEvent, PeakThresholds};
pub use rr::{HrvSummary, RrTracker};

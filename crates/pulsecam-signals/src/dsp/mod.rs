//! DSP (Digital Signal Processing) module
//!
//! Per-sample processing of the red PPG trace:
//! - `AdaptiveFilterChain` - baseline removal, adaptive Kalman, Savitzky-Golay
//! - `DynamicAmplifier` - sliding-window gain toward a target amplitude
//! - `SignalQualityScorer` - SNR / stability / purity / pulsatility score

mod amplifier;
mod filter_chain;
mod kalman;
mod quality;
mod savgol;
pub mod stats;

pub use amplifier::DynamicAmplifier;
pub use filter_chain::AdaptiveFilterChain;
pub use kalman::{AdaptiveKalman, KalmanState};
pub use quality::{QualityInputs, QualitySnapshot, SignalQualityScorer};
pub use savgol::{coefficients as savgol_coefficients, SavitzkyGolay};

//! Push notifications from the pipeline.
//!
//! Implement [`PipelineObserver`] for in-thread callbacks, or register a
//! [`ChannelObserver`] and poll its receiver from another thread.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;

use crate::calibration::CalibrationUpdate;
use crate::error::ProcessingError;
use crate::pipeline::ProcessedSignal;

/// Receives every pipeline output in frame order
pub trait PipelineObserver {
    fn on_signal(&mut self, _signal: &ProcessedSignal) {}

    /// A frame was skipped
    fn on_error(&mut self, _error: &ProcessingError) {}

    fn on_calibration_update(&mut self, _update: &CalibrationUpdate) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineEvent {
    Signal(ProcessedSignal),
    Error(ProcessingError),
    Calibration(CalibrationUpdate),
}

/// Forwards events over an mpsc channel
pub struct ChannelObserver {
    tx: Sender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end
    pub fn channel() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Pipeline event receiver dropped");
        }
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_signal(&mut self, signal: &ProcessedSignal) {
        self.send(PipelineEvent::Signal(signal.clone()));
    }

    fn on_error(&mut self, error: &ProcessingError) {
        self.send(PipelineEvent::Error(error.clone()));
    }

    fn on_calibration_update(&mut self, update: &CalibrationUpdate) {
        self.send(PipelineEvent::Calibration(update.clone()));
    }
}

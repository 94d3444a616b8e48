//! PPG Pipeline
//!
//! Orchestrates one camera stream from frame to heart rate:
//!
//! ```text
//! Frame -> FrameSampler -> FingerPresenceDetector
//!                       -> AdaptiveFilterChain -> DynamicAmplifier -> PeakDetector -> RrTracker
//!                                                   SignalQualityScorer <- (all of the above)
//! ```
//!
//! While a calibration session is active, frames feed the
//! `CalibrationController` instead of peak detection. On successful
//! completion the derived red thresholds and gain are applied.

use serde::Serialize;

use crate::calibration::{
    CalibrationController, CalibrationPhase, CalibrationResult, CalibrationSample,
    CalibrationUpdate, ReferenceData,
};
use crate::config::{CalibrationPolicy, PipelineConfig};
use crate::dsp::{
    AdaptiveFilterChain, DynamicAmplifier, KalmanState, QualityInputs, QualitySnapshot,
    SignalQualityScorer,
};
use crate::error::{ConfigError, ErrorCode, ProcessingError};
use crate::observer::PipelineObserver;
use crate::physio::{ArmState, HrvSummary, PeakDetector, PeakEvent, PeakThresholds, RrTracker};
use crate::presence::{DetectionResult, DetectionState, FingerPresenceDetector};
use crate::vision::{Frame, FrameMetrics, FrameSampler, Roi};

/// Per-frame output record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSignal {
    pub timestamp_ms: i64,
    /// ROI red average
    pub raw_value: f32,
    pub filtered_value: f32,
    pub amplified_value: f32,
    /// Signal quality [0, 100]
    pub quality: f32,
    pub quality_detail: QualitySnapshot,
    pub finger_detected: bool,
    pub roi: Roi,
    /// Stored RR intervals, oldest first
    pub rr_intervals: Vec<i64>,
    pub last_peak_time: Option<i64>,
    /// Set while a calibration session is running
    pub calibration_phase: Option<CalibrationPhase>,
    /// Median-based BPM, only while a finger is detected
    pub heart_rate_bpm: Option<f32>,
    /// Peak confirmed on this frame
    pub peak: Option<PeakEvent>,
    pub detection: DetectionResult,
}

/// Snapshot of internal state, for debugging and tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDiagnostics {
    pub running: bool,
    pub calibrating: bool,
    pub calibrated: bool,
    pub detection: DetectionState,
    pub kalman: KalmanState,
    pub filter_baseline: f32,
    pub filter_ac: f32,
    pub amplifier_factor: f32,
    pub amplifier_bounds: (f32, f32),
    pub peak_thresholds: PeakThresholds,
    pub arm_state: ArmState,
    pub rr_count: usize,
    pub last_peak_ms: Option<i64>,
    pub quality_buffered: usize,
    pub frames_processed: u64,
}

pub struct PpgPipeline {
    config: PipelineConfig,
    sampler: FrameSampler,
    detector: FingerPresenceDetector,
    filter: AdaptiveFilterChain,
    amplifier: DynamicAmplifier,
    peaks: PeakDetector,
    rr: RrTracker,
    quality: SignalQualityScorer,
    calibration: Option<CalibrationController>,
    last_calibration: Option<CalibrationResult>,
    reference: Option<ReferenceData>,
    running: bool,
    calibrated: bool,
    was_detected: bool,
    prev_amplified: Option<f32>,
    frames_processed: u64,
    observers: Vec<Box<dyn PipelineObserver>>,
}

impl PpgPipeline {
    /// Validate the configuration and build every stage
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let filter = AdaptiveFilterChain::new(&config.filter)?;
        Ok(Self {
            sampler: FrameSampler::new(config.sampler.clone()),
            detector: FingerPresenceDetector::new(config.finger.clone()),
            filter,
            amplifier: DynamicAmplifier::new(&config.amplifier),
            peaks: PeakDetector::new(config.peaks.clone()),
            rr: RrTracker::new(config.rr.clone()),
            quality: SignalQualityScorer::new(config.quality.clone(), config.sample_rate_hz),
            calibration: None,
            last_calibration: None,
            reference: None,
            running: false,
            calibrated: false,
            was_detected: false,
            prev_amplified: None,
            frames_processed: 0,
            observers: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Box<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn start(&mut self) {
        if !self.running {
            log::info!("PPG pipeline started");
        }
        self.running = true;
    }

    /// Disable processing and clear all filter state
    pub fn stop(&mut self) {
        if self.running {
            log::info!("PPG pipeline stopped after {} frames", self.frames_processed);
        }
        self.running = false;
        self.reset();
    }

    /// Clear buffers and abort any calibration in progress.
    ///
    /// Thresholds and gain from an earlier successful calibration are kept.
    pub fn reset(&mut self) {
        if self.calibration.take().is_some() {
            log::info!("Calibration aborted by reset");
        }
        self.clear_stages();
        self.frames_processed = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// Begin a calibration session; also starts processing
    pub fn start_calibration_mode(&mut self) {
        self.clear_stages();
        let amp = &self.config.amplifier;
        let finger = self.detector.config();
        self.calibration = Some(CalibrationController::new(
            self.config.calibration.clone(),
            amp.target_amplitude,
            (amp.min_factor, amp.max_factor),
            (finger.min_red_reflectance, finger.max_red_reflectance),
        ));
        self.running = true;
        log::info!("Calibration started");
    }

    /// Leave calibration mode.
    ///
    /// Returns the result of the session if it reached `Complete`; an
    /// unfinished session is aborted and yields `None`. Reference data is
    /// kept for downstream consumers.
    pub fn end_calibration_mode(
        &mut self,
        reference: Option<ReferenceData>,
    ) -> Option<CalibrationResult> {
        if reference.is_some() {
            self.reference = reference;
        }
        match self.calibration.take() {
            Some(ctl) => {
                log::info!("Calibration ended early in phase {:?}", ctl.phase());
                None
            }
            None => self.last_calibration.clone(),
        }
    }

    pub fn reference_data(&self) -> Option<&ReferenceData> {
        self.reference.as_ref()
    }

    pub fn last_calibration(&self) -> Option<&CalibrationResult> {
        self.last_calibration.as_ref()
    }

    pub fn session_bpm(&self) -> Option<f32> {
        self.rr.session_bpm()
    }

    pub fn hrv(&self) -> Option<HrvSummary> {
        self.rr.hrv()
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        PipelineDiagnostics {
            running: self.running,
            calibrating: self.calibration.is_some(),
            calibrated: self.calibrated,
            detection: self.detector.state(),
            kalman: self.filter.state(),
            filter_baseline: self.filter.baseline(),
            filter_ac: self.filter.last_ac(),
            amplifier_factor: self.amplifier.factor(),
            amplifier_bounds: self.amplifier.bounds(),
            peak_thresholds: self.peaks.thresholds(),
            arm_state: self.peaks.arm_state(),
            rr_count: self.rr.intervals().len(),
            last_peak_ms: self.rr.last_peak_ms(),
            quality_buffered: self.quality.buffered(),
            frames_processed: self.frames_processed,
        }
    }

    /// Run one frame through the pipeline.
    ///
    /// A malformed frame or a usage fault returns `ProcessingError` (also
    /// sent to observers) and leaves all state untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<ProcessedSignal, ProcessingError> {
        if let Err(err) = self.check_frame(frame) {
            log::debug!("Frame skipped: {}", err);
            for obs in self.observers.iter_mut() {
                obs.on_error(&err);
            }
            return Err(err);
        }

        self.frames_processed += 1;
        let (roi, metrics) = self.sampler.sample(frame);
        let detection = self.detector.detect(&metrics);

        let signal = if self.calibration.is_some() {
            self.process_calibration(frame.timestamp_ms, roi, &metrics, detection)
        } else {
            self.process_normal(frame.timestamp_ms, roi, &metrics, detection)
        };

        for obs in self.observers.iter_mut() {
            obs.on_signal(&signal);
        }
        Ok(signal)
    }

    fn check_frame(&self, frame: &Frame) -> Result<(), ProcessingError> {
        frame.validate()?;
        if !self.running {
            return Err(ProcessingError::new(
                ErrorCode::NotRunning,
                "pipeline is stopped",
                frame.timestamp_ms,
            ));
        }
        if self.calibration.is_none()
            && self.config.calibration.policy == CalibrationPolicy::Required
            && !self.calibrated
        {
            return Err(ProcessingError::new(
                ErrorCode::CalibrationRequired,
                "a successful calibration is required before processing",
                frame.timestamp_ms,
            ));
        }
        Ok(())
    }

    fn process_normal(
        &mut self,
        timestamp_ms: i64,
        roi: Roi,
        metrics: &FrameMetrics,
        detection: DetectionResult,
    ) -> ProcessedSignal {
        let detected = detection.detected;
        if detected && !self.was_detected {
            log::info!("Finger detected at {} ms", timestamp_ms);
            self.filter.reset();
            self.amplifier.reset();
            self.peaks.reset();
            self.quality.reset();
            self.prev_amplified = None;
        } else if !detected && self.was_detected {
            log::info!("Finger lost at {} ms", timestamp_ms);
            self.rr.clear_last_peak();
            self.peaks.reset();
        }
        self.was_detected = detected;

        let raw = metrics.avg_red;
        let filtered = self.filter.filter(raw);
        let ac = self.filter.last_ac();
        let amplified = self.amplifier.amplify(ac);
        let derivative = amplified - self.prev_amplified.unwrap_or(amplified);
        self.prev_amplified = Some(amplified);

        let mut peak = None;
        if detected {
            let decision = self.peaks.process(amplified, derivative, timestamp_ms);
            if let Some(event) = decision.peak {
                self.rr.record(event.timestamp_ms);
                peak = Some(event);
            }
        }

        let confidences = self.peaks.recent_confidences();
        let snapshot = self.quality.score(&QualityInputs {
            timestamp_ms,
            raw,
            ac,
            finger_detected: detected,
            detection_confidence: detection.confidence,
            measurement_variance: self.filter.state().r,
            peak_confidences: &confidences,
        });

        ProcessedSignal {
            timestamp_ms,
            raw_value: raw,
            filtered_value: filtered,
            amplified_value: amplified,
            quality: snapshot.score,
            quality_detail: snapshot,
            finger_detected: detected,
            roi,
            rr_intervals: self.rr.intervals().iter().copied().collect(),
            last_peak_time: self.rr.last_peak_ms(),
            calibration_phase: None,
            heart_rate_bpm: if detected { self.rr.bpm() } else { None },
            peak,
            detection,
        }
    }

    fn process_calibration(
        &mut self,
        timestamp_ms: i64,
        roi: Roi,
        metrics: &FrameMetrics,
        detection: DetectionResult,
    ) -> ProcessedSignal {
        let detected = detection.detected;
        self.was_detected = detected;

        let raw = metrics.avg_red;
        let filtered = self.filter.filter(raw);
        let ac = self.filter.last_ac();
        let amplified = self.amplifier.amplify(ac);
        self.prev_amplified = Some(amplified);

        let snapshot = self.quality.score(&QualityInputs {
            timestamp_ms,
            raw,
            ac,
            finger_detected: detected,
            detection_confidence: detection.confidence,
            measurement_variance: self.filter.state().r,
            peak_confidences: &[],
        });

        let sample = CalibrationSample {
            timestamp_ms,
            rgb: [metrics.avg_red, metrics.avg_green, metrics.avg_blue],
            finger_detected: detected,
            detection_quality: detection.quality,
            signal_quality: snapshot.score,
            ac,
        };
        let update = match self.calibration.as_mut() {
            Some(ctl) => ctl.push(sample),
            None => CalibrationUpdate {
                phase: CalibrationPhase::Complete,
                progress: 1.0,
                phase_changed: false,
                extensions: 0,
                result: None,
            },
        };

        for obs in self.observers.iter_mut() {
            obs.on_calibration_update(&update);
        }
        if let Some(result) = update.result.clone() {
            self.finish_calibration(result);
        }

        ProcessedSignal {
            timestamp_ms,
            raw_value: raw,
            filtered_value: filtered,
            amplified_value: amplified,
            quality: snapshot.score,
            quality_detail: snapshot,
            finger_detected: detected,
            roi,
            rr_intervals: self.rr.intervals().iter().copied().collect(),
            last_peak_time: self.rr.last_peak_ms(),
            calibration_phase: Some(update.phase),
            heart_rate_bpm: None,
            peak: None,
            detection,
        }
    }

    fn finish_calibration(&mut self, result: CalibrationResult) {
        self.calibration = None;
        if result.success {
            if let Some((lo, hi)) = result.red_thresholds {
                self.detector.apply_red_thresholds(lo, hi);
            }
            self.amplifier.apply_gain_factor(result.gain_factor);
            self.calibrated = true;
            log::info!("Calibration succeeded (accuracy {:.2})", result.accuracy);
        } else {
            log::warn!(
                "Calibration failed (accuracy {:.2}): {}",
                result.accuracy,
                result.recommendations.join("; ")
            );
        }
        self.last_calibration = Some(result);
    }

    fn clear_stages(&mut self) {
        self.sampler.reset();
        self.detector.reset();
        self.filter.reset();
        self.amplifier.reset();
        self.peaks.reset();
        self.rr.reset();
        self.quality.reset();
        self.was_detected = false;
        self.prev_amplified = None;
    }
}

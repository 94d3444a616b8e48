//! End-to-end scenarios driven by synthetic frames.

use pulsecam_signals::synthetic::{ambient_frame, finger_frame, timestamp_ms, FingerSignal};
use pulsecam_signals::{
    CalibrationPhase, ChannelObserver, ErrorCode, Frame, PipelineConfig, PipelineEvent,
    PixelFormat, PpgPipeline,
};
use pulsecam_signals::presence::RejectionReason;

const W: u32 = 32;
const H: u32 = 32;

fn pipeline() -> PpgPipeline {
    let mut p = PpgPipeline::new(PipelineConfig::default()).expect("default config is valid");
    p.start();
    p
}

#[test]
fn cold_start_flat_gray() {
    let mut p = pipeline();
    for i in 0..5 {
        let signal = p.process_frame(&ambient_frame(i, W, H)).unwrap();
        assert!(!signal.finger_detected);
        assert!(signal.peak.is_none());
        assert!(signal.heart_rate_bpm.is_none());
        assert!(
            (5.0..=15.0).contains(&signal.quality),
            "quality {}",
            signal.quality
        );
    }
}

#[test]
fn synthetic_72_bpm_converges() {
    let mut p = pipeline();
    let mut first_detected = None;
    let mut last = None;

    for i in 0..300 {
        let signal = p.process_frame(&finger_frame(i, W, H)).unwrap();
        if signal.finger_detected && first_detected.is_none() {
            first_detected = Some(signal.timestamp_ms);
        }
        last = Some(signal);
    }

    let detected_at = first_detected.expect("finger never detected");
    assert!(detected_at <= 1000, "detected at {detected_at} ms");

    let last = last.unwrap();
    let bpm = last.heart_rate_bpm.expect("no heart rate after 10 s");
    assert!((bpm - 72.0).abs() <= 5.0, "bpm {bpm}");
    assert!(last.rr_intervals.len() >= 5);
    assert!(last.quality > 30.0, "quality {}", last.quality);

    let session = p.session_bpm().unwrap();
    assert!((session - 72.0).abs() <= 5.0, "session bpm {session}");
    assert!(p.hrv().is_some());
}

#[test]
fn slower_heart_rate_tracks() {
    let mut p = pipeline();
    let source = FingerSignal::with_heart_rate(60.0);
    let mut bpm = None;
    for i in 0..360 {
        bpm = p.process_frame(&source.frame(i, W, H)).unwrap().heart_rate_bpm;
    }
    let bpm = bpm.expect("no heart rate");
    assert!((bpm - 60.0).abs() <= 5.0, "bpm {bpm}");
}

#[test]
fn finger_loss_clears_heart_rate() {
    let mut p = pipeline();
    for i in 0..240 {
        p.process_frame(&finger_frame(i, W, H)).unwrap();
    }
    let mut last = None;
    for i in 240..260 {
        last = Some(p.process_frame(&ambient_frame(i, W, H)).unwrap());
    }
    let last = last.unwrap();
    assert!(!last.finger_detected);
    assert!(last.heart_rate_bpm.is_none());
    assert!(last.quality <= 15.0);
}

#[test]
fn alternating_frames_never_detect() {
    let mut p = pipeline();
    for i in 0..60 {
        let frame = if i % 2 == 0 {
            finger_frame(i, W, H)
        } else {
            ambient_frame(i, W, H)
        };
        assert!(!p.process_frame(&frame).unwrap().finger_detected);
    }
}

#[test]
fn zero_area_frames_never_report_finger() {
    let mut p = pipeline();
    for i in 0..30 {
        p.process_frame(&finger_frame(i, W, H)).unwrap();
    }
    assert!(p.diagnostics().detection.is_detected);

    // a 1x1 frame yields a zero-size ROI once the smoothing history drains
    let mut degenerate = 0;
    for i in 30..40 {
        let signal = p.process_frame(&finger_frame(i, 1, 1)).unwrap();
        if signal
            .detection
            .rejection_reasons
            .contains(&RejectionReason::Degenerate)
        {
            degenerate += 1;
            assert!(!signal.finger_detected, "frame {i}");
            assert!(signal.peak.is_none(), "frame {i}");
            assert!(signal.heart_rate_bpm.is_none(), "frame {i}");
            assert_eq!(signal.detection.confidence, 0.0);
        }
    }
    assert!(degenerate >= 5, "only {degenerate} degenerate frames");
}

#[test]
fn malformed_frame_reported_and_skipped() {
    let mut p = pipeline();
    let (observer, rx) = ChannelObserver::channel();
    p.add_observer(Box::new(observer));

    for i in 0..10 {
        p.process_frame(&finger_frame(i, W, H)).unwrap();
    }
    let bad = Frame::new(Vec::new(), 0, H, PixelFormat::Rgb8, timestamp_ms(10, 30.0));
    let err = p.process_frame(&bad).unwrap_err();
    assert_eq!(err.code, ErrorCode::EmptyFrame);

    let next = p.process_frame(&finger_frame(11, W, H)).unwrap();
    assert!(next.finger_detected);

    let errors = rx
        .try_iter()
        .filter(|e| matches!(e, PipelineEvent::Error(_)))
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn rgba_frames_match_rgb() {
    let mut rgb = pipeline();
    let mut rgba = pipeline();
    for i in 0..30 {
        let frame = finger_frame(i, W, H);
        let mut data = Vec::with_capacity(frame.data.len() / 3 * 4);
        for px in frame.data.chunks(3) {
            data.extend_from_slice(px);
            data.push(255);
        }
        let frame_rgba = Frame::new(data, W, H, PixelFormat::Rgba8, frame.timestamp_ms);

        let a = rgb.process_frame(&frame).unwrap();
        let b = rgba.process_frame(&frame_rgba).unwrap();
        assert_eq!(a.raw_value, b.raw_value);
        assert_eq!(a.finger_detected, b.finger_detected);
    }
}

#[test]
fn calibration_success_sequence() {
    let mut p = pipeline();
    let (observer, rx) = ChannelObserver::channel();
    p.add_observer(Box::new(observer));

    p.start_calibration_mode();
    let mut i = 0;
    while p.is_calibrating() && i < 900 {
        // ambient light for the baseline, then a finger
        let frame = if i <= 60 {
            ambient_frame(i, W, H)
        } else {
            finger_frame(i, W, H)
        };
        let signal = p.process_frame(&frame).unwrap();
        assert!(signal.calibration_phase.is_some());
        i += 1;
    }
    assert!(!p.is_calibrating(), "calibration did not finish");

    let updates: Vec<_> = rx
        .try_iter()
        .filter_map(|e| match e {
            PipelineEvent::Calibration(u) => Some(u),
            _ => None,
        })
        .collect();

    let mut phases = vec![CalibrationPhase::Baseline];
    let mut last_progress = 0.0;
    for u in &updates {
        if u.phase != *phases.last().unwrap() {
            assert!(u.phase_changed);
            assert_eq!(u.progress, 0.0);
            phases.push(u.phase);
        } else {
            assert!(u.progress >= last_progress);
        }
        last_progress = u.progress;
    }
    assert_eq!(
        phases,
        vec![
            CalibrationPhase::Baseline,
            CalibrationPhase::FingerDetection,
            CalibrationPhase::SignalOptimization,
            CalibrationPhase::Validation,
            CalibrationPhase::Complete,
        ]
    );

    let result = p.end_calibration_mode(None).expect("completed session has a result");
    assert!(result.success, "{result:?}");
    assert!(result.recommendations.is_empty());
    let (lo, hi) = result.red_thresholds.unwrap();
    assert!(lo < 150.0 && hi > 150.0);

    let diag = p.diagnostics();
    assert!(diag.calibrated);
    let (min_f, max_f) = diag.amplifier_bounds;
    assert!((min_f - 5.0 * result.gain_factor).abs() < 1e-4);
    assert!((max_f - 40.0 * result.gain_factor).abs() < 1e-4);

    // normal processing resumes after calibration
    let signal = p.process_frame(&finger_frame(i, W, H)).unwrap();
    assert!(signal.calibration_phase.is_none());
}

#[test]
fn calibration_without_finger_fails_with_hints() {
    let mut p = pipeline();
    p.start_calibration_mode();
    let mut i = 0;
    while p.is_calibrating() && i < 2000 {
        p.process_frame(&ambient_frame(i, W, H)).unwrap();
        i += 1;
    }
    let result = p.last_calibration().expect("session completed").clone();
    assert!(!result.success);
    assert!(!result.recommendations.is_empty());
    assert!(result.failed_phases.contains(&CalibrationPhase::FingerDetection));
    assert!(!p.diagnostics().calibrated);
    // defaults untouched
    assert_eq!(p.diagnostics().amplifier_bounds, (5.0, 40.0));
}

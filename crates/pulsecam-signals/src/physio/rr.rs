//! RR interval tracking, BPM and a short-term HRV summary.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::RrConfig;
use crate::dsp::stats;

/// Time-domain HRV over the stored intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HrvSummary {
    pub mean_rr_ms: f32,
    pub sdnn_ms: f32,
    pub rmssd_ms: f32,
    pub interval_count: usize,
}

#[derive(Debug, Clone)]
pub struct RrTracker {
    config: RrConfig,
    intervals: VecDeque<i64>,
    last_peak_ms: Option<i64>,
    rejected: usize,
}

impl RrTracker {
    pub fn new(config: RrConfig) -> Self {
        let cap = config.history_size;
        Self {
            config,
            intervals: VecDeque::with_capacity(cap),
            last_peak_ms: None,
            rejected: 0,
        }
    }

    /// Record a confirmed peak.
    ///
    /// The interval to the previous peak is stored only when it lies within
    /// `[rr_min_ms, rr_max_ms]`; the peak itself always becomes the new
    /// reference.
    pub fn record(&mut self, peak_ms: i64) -> &VecDeque<i64> {
        if let Some(last) = self.last_peak_ms {
            let interval = peak_ms - last;
            if (self.config.rr_min_ms..=self.config.rr_max_ms).contains(&interval) {
                if self.intervals.len() >= self.config.history_size {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(interval);
            } else {
                self.rejected += 1;
                log::debug!("RR interval {} ms out of range, discarded", interval);
            }
        }
        self.last_peak_ms = Some(peak_ms);
        &self.intervals
    }

    pub fn intervals(&self) -> &VecDeque<i64> {
        &self.intervals
    }

    pub fn last_peak_ms(&self) -> Option<i64> {
        self.last_peak_ms
    }

    /// Intervals discarded as physiologically implausible
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Forget the reference peak so the next interval does not span a gap
    pub fn clear_last_peak(&mut self) {
        self.last_peak_ms = None;
    }

    /// 60000 / median of the most recent `bpm_window` intervals
    pub fn bpm(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let take = self.config.bpm_window.min(self.intervals.len());
        let recent: Vec<f32> = self
            .intervals
            .iter()
            .skip(self.intervals.len() - take)
            .map(|&v| v as f32)
            .collect();
        let median = stats::median(&recent);
        (median > 0.0).then(|| 60_000.0 / median)
    }

    /// BPM from the trimmed mean of the whole history
    pub fn session_bpm(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let mut sorted: Vec<f32> = self.intervals.iter().map(|&v| v as f32).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let trim = (sorted.len() as f32 * self.config.trim_fraction).floor() as usize;
        let kept = if sorted.len() > 2 * trim {
            &sorted[trim..sorted.len() - trim]
        } else {
            &sorted[..]
        };
        let mean = stats::mean(kept);
        (mean > 0.0).then(|| 60_000.0 / mean)
    }

    /// Needs at least two intervals
    pub fn hrv(&self) -> Option<HrvSummary> {
        if self.intervals.len() < 2 {
            return None;
        }
        let rr: Vec<f32> = self.intervals.iter().map(|&v| v as f32).collect();
        let successive = stats::diff(&rr);
        let rmssd = (successive.iter().map(|d| d * d).sum::<f32>() / successive.len() as f32).sqrt();

        Some(HrvSummary {
            mean_rr_ms: stats::mean(&rr),
            sdnn_ms: stats::variance(&rr).sqrt(),
            rmssd_ms: rmssd,
            interval_count: rr.len(),
        })
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_peak_ms = None;
        self.rejected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_out_of_range_discarded() {
        let mut rr = RrTracker::new(RrConfig::default());
        rr.record(0);
        rr.record(100); // 100 ms, too short
        rr.record(900); // 800 ms
        rr.record(4000); // 3100 ms, too long
        rr.record(4700); // 700 ms

        let stored: Vec<i64> = rr.intervals().iter().copied().collect();
        assert_eq!(stored, vec![800, 700]);
        assert_eq!(rr.rejected_count(), 2);
        assert_eq!(rr.last_peak_ms(), Some(4700));
    }

    #[test]
    fn test_history_bounded() {
        let mut rr = RrTracker::new(RrConfig::default());
        for i in 0..50 {
            rr.record(i * 800);
        }
        assert_eq!(rr.intervals().len(), 20);
    }

    #[test]
    fn test_bpm_median() {
        let mut rr = RrTracker::new(RrConfig::default());
        let mut t = 0;
        rr.record(t);
        for interval in [1000, 1000, 1000, 1900, 1000] {
            t += interval;
            rr.record(t);
        }
        assert_relative_eq!(rr.bpm().unwrap(), 60.0);
    }

    #[test]
    fn test_session_bpm_trims_outliers() {
        let mut rr = RrTracker::new(RrConfig::default());
        let mut t = 0;
        rr.record(t);
        for interval in [300, 1000, 1000, 1000, 2000] {
            t += interval;
            rr.record(t);
        }
        // one value trimmed from each end
        assert_relative_eq!(rr.session_bpm().unwrap(), 60.0);
    }

    #[test]
    fn test_hrv_summary() {
        let mut rr = RrTracker::new(RrConfig::default());
        let mut t = 0;
        rr.record(t);
        for interval in [800, 900, 800, 900] {
            t += interval;
            rr.record(t);
        }
        let hrv = rr.hrv().unwrap();
        assert_relative_eq!(hrv.mean_rr_ms, 850.0);
        assert_relative_eq!(hrv.sdnn_ms, 50.0);
        assert_relative_eq!(hrv.rmssd_ms, 100.0);
        assert_eq!(hrv.interval_count, 4);
    }

    #[test]
    fn test_clear_last_peak_skips_gap() {
        let mut rr = RrTracker::new(RrConfig::default());
        rr.record(0);
        rr.record(800);
        rr.clear_last_peak();
        rr.record(1500);
        assert_eq!(rr.intervals().len(), 1);
        assert!(rr.bpm().is_some());
        assert!(RrTracker::new(RrConfig::default()).bpm().is_none());
    }
}

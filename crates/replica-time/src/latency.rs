//! Passive latency model fed by the round trip the server reports

use std::collections::VecDeque;

/// Round trip samples kept for the median
pub const LATENCY_WINDOW: usize = 64;

/// Round trip and jitter estimate over a sliding window
#[derive(Clone, Debug)]
pub struct LatencyModel {
    /// Recent round trip samples in seconds
    samples: VecDeque<f64>,
    max_samples: usize,
    /// Median round trip in seconds
    median_rtt: f64,
    /// Jitter envelope (max deviation from the median)
    jitter_envelope: f64,
}

impl LatencyModel {
    pub fn new() -> Self {
        LatencyModel::with_window(LATENCY_WINDOW)
    }

    pub fn with_window(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        LatencyModel {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            median_rtt: 0.0,
            jitter_envelope: 0.0,
        }
    }

    /// Add a round trip sample in seconds; non-finite or negative samples are ignored
    pub fn update(&mut self, rtt_secs: f64) {
        if !rtt_secs.is_finite() || rtt_secs < 0.0 {
            return;
        }

        self.samples.push_back(rtt_secs);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        self.median_rtt = Self::median(&self.samples);
        let median = self.median_rtt;
        self.jitter_envelope = self
            .samples
            .iter()
            .map(|s| (s - median).abs())
            .fold(0.0, f64::max);
    }

    /// Median round trip in seconds; 0 before any sample
    #[inline]
    pub fn median_round_trip(&self) -> f64 {
        self.median_rtt
    }

    /// Estimated one-way latency in seconds
    #[inline]
    pub fn one_way_latency(&self) -> f64 {
        self.median_rtt / 2.0
    }

    /// Jitter envelope in seconds
    #[inline]
    pub fn jitter(&self) -> f64 {
        self.jitter_envelope
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn median(values: &VecDeque<f64>) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = values.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const DEFAULT_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyCategory {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

pub fn categorize(seconds: f64) -> LatencyCategory {
    if seconds <= 2.0 {
        LatencyCategory::Excellent
    } else if seconds <= 5.0 {
        LatencyCategory::Good
    } else if seconds <= 10.0 {
        LatencyCategory::Acceptable
    } else {
        LatencyCategory::Poor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub average_latency_recent: f64,
    pub median_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub category: LatencyCategory,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let average = sorted.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        Some(Self {
            count,
            average_latency_recent: average,
            median_latency: median,
            min_latency: sorted[0],
            max_latency: sorted[count - 1],
            category: categorize(average),
        })
    }
}

/// Sliding record of recent end-to-end request latencies, in seconds.
pub struct LatencyTracker {
    window: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl LatencyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            return;
        }
        let mut guard = self.samples.lock().await;
        guard.push_back(seconds);
        while guard.len() > self.window {
            guard.pop_front();
        }
    }

    pub async fn statistics(&self) -> Option<LatencyStats> {
        let guard = self.samples.lock().await;
        let samples = guard.iter().copied().collect::<Vec<_>>();
        LatencyStats::from_samples(&samples)
    }
}

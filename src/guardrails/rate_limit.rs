use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);

fn default_enabled() -> bool {
    true
}

fn default_max_requests_per_minute() -> usize {
    60
}

fn default_max_requests_per_hour() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: usize,
    #[serde(default = "default_max_requests_per_hour")]
    pub max_requests_per_hour: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: default_max_requests_per_minute(),
            max_requests_per_hour: default_max_requests_per_hour(),
        }
    }
}

#[derive(Default)]
struct UserWindows {
    minute: Vec<Instant>,
    hour: Vec<Instant>,
}

/// Per-user minute and hour windows with independent caps.
pub struct SlidingWindowRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, UserWindows>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, user_id: &str) -> bool {
        self.check_at(user_id, Instant::now()).await
    }

    /// Admits and records one request at `now`, or refuses it without recording.
    pub async fn check_at(&self, user_id: &str, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut guard = self.windows.lock().await;
        // Users with nothing left in the hour window carry no state.
        guard.retain(|_, windows| {
            windows
                .hour
                .last()
                .is_some_and(|&seen| now.duration_since(seen) < HOUR_WINDOW)
        });
        let windows = guard.entry(user_id.to_string()).or_default();
        windows
            .minute
            .retain(|&seen| now.duration_since(seen) < MINUTE_WINDOW);
        windows
            .hour
            .retain(|&seen| now.duration_since(seen) < HOUR_WINDOW);

        if windows.minute.len() >= self.config.max_requests_per_minute {
            tracing::warn!(
                target: "guardrails",
                user_id = %user_id,
                window = "minute",
                limit = self.config.max_requests_per_minute,
                "rate_limit_exceeded"
            );
            return false;
        }
        if windows.hour.len() >= self.config.max_requests_per_hour {
            tracing::warn!(
                target: "guardrails",
                user_id = %user_id,
                window = "hour",
                limit = self.config.max_requests_per_hour,
                "rate_limit_exceeded"
            );
            return false;
        }

        windows.minute.push(now);
        windows.hour.push(now);
        true
    }

    pub async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }
}

//! Plan annotations only; estimates never gate execution.

use std::fmt;

use crate::{evaluation::LatencyStats, planner::spec::ExecutionSpec};

const COST_PER_TOKEN: f64 = 0.00001;
const COST_PER_DATA_SOURCE: f64 = 0.001;
const COST_PER_TOOL: f64 = 0.005;
const FALLBACK_MAX_TOKENS: u32 = 2000;

const LATENCY_BASELINE_SECONDS: f64 = 0.5;
const LATENCY_PER_DATA_SOURCE: f64 = 0.3;
const LATENCY_PER_TOOL: f64 = 0.5;
const LATENCY_PROVIDER_OVERHEAD: f64 = 1.5;

pub const SAFE_DEFAULT_COST: f64 = 0.0;
pub const SAFE_DEFAULT_LATENCY: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EstimateError {
    pub estimator: &'static str,
    pub message: String,
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} estimate failed: {}", self.estimator, self.message)
    }
}

impl std::error::Error for EstimateError {}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn finite(estimator: &'static str, value: f64) -> Result<f64, EstimateError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EstimateError {
            estimator,
            message: format!("non-finite result {}", value),
        })
    }
}

pub struct CostEstimator;

impl CostEstimator {
    /// Estimated spend in USD.
    pub fn estimate(spec: &ExecutionSpec) -> Result<f64, EstimateError> {
        let mut cost = 0.0;
        if let Some(provider) = &spec.provider {
            let tokens = if provider.max_tokens == 0 {
                FALLBACK_MAX_TOKENS
            } else {
                provider.max_tokens
            };
            cost += f64::from(tokens) * COST_PER_TOKEN;
        }
        cost += spec.enabled_data_sources().count() as f64 * COST_PER_DATA_SOURCE;
        cost += spec.enabled_tools().count() as f64 * COST_PER_TOOL;
        finite("cost", round_to(cost, 4))
    }
}

pub struct LatencyEstimator;

impl LatencyEstimator {
    /// Estimated wall time in seconds.
    ///
    /// With history the provider's latency is assumed to be part of the
    /// recent average, so the fixed provider overhead is only added without it.
    pub fn estimate(
        spec: &ExecutionSpec,
        history: Option<&LatencyStats>,
    ) -> Result<f64, EstimateError> {
        let baseline = match history {
            Some(stats) if !stats.average_latency_recent.is_finite() => {
                return Err(EstimateError {
                    estimator: "latency",
                    message: "history average is not finite".to_string(),
                });
            }
            Some(stats) if stats.average_latency_recent > 0.0 => stats.average_latency_recent,
            _ => LATENCY_BASELINE_SECONDS,
        };

        let mut overhead = spec.enabled_data_sources().count() as f64 * LATENCY_PER_DATA_SOURCE;
        overhead += spec.enabled_tools().count() as f64 * LATENCY_PER_TOOL;
        if history.is_none() && spec.provider.is_some() {
            overhead += LATENCY_PROVIDER_OVERHEAD;
        }
        finite("latency", round_to(baseline + overhead, 2))
    }
}

/// Both estimates, falling back to the safe pair when either fails.
pub fn estimate_or_default(spec: &ExecutionSpec, history: Option<&LatencyStats>) -> (f64, f64) {
    match (
        CostEstimator::estimate(spec),
        LatencyEstimator::estimate(spec, history),
    ) {
        (Ok(cost), Ok(latency)) => (cost, latency),
        (cost, latency) => {
            let reason = cost
                .err()
                .or(latency.err())
                .map(|err| err.to_string())
                .unwrap_or_default();
            tracing::warn!(target: "planner", error = %reason, "estimate_failed_using_defaults");
            (SAFE_DEFAULT_COST, SAFE_DEFAULT_LATENCY)
        }
    }
}

//! Engine defaults, overridable from the environment.

use log::{debug, info, warn};
use std::env;
use std::str::FromStr;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;
pub const DEFAULT_CANDIDATE_MIN_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_CLUSTER_LIMIT: usize = 50;
pub const DEFAULT_CLUSTER_MIN_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_SCAN_WARN_THRESHOLD: usize = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub struct DedupeConfig {
    pub candidate_limit: usize,
    pub candidate_min_confidence: f64,
    pub cluster_limit: usize,
    pub cluster_min_confidence: f64,
    /// Collection size above which a full scan logs a scale warning.
    pub scan_warn_threshold: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            candidate_min_confidence: DEFAULT_CANDIDATE_MIN_CONFIDENCE,
            cluster_limit: DEFAULT_CLUSTER_LIMIT,
            cluster_min_confidence: DEFAULT_CLUSTER_MIN_CONFIDENCE,
            scan_warn_threshold: DEFAULT_SCAN_WARN_THRESHOLD,
        }
    }
}

impl DedupeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unparsable or out-of-range
    /// values fall back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            candidate_limit: read_value(&lookup, "DEDUPE_CANDIDATE_LIMIT", defaults.candidate_limit, |v| *v > 0),
            candidate_min_confidence: read_value(
                &lookup,
                "DEDUPE_CANDIDATE_MIN_CONFIDENCE",
                defaults.candidate_min_confidence,
                is_confidence,
            ),
            cluster_limit: read_value(&lookup, "DEDUPE_CLUSTER_LIMIT", defaults.cluster_limit, |v| *v > 0),
            cluster_min_confidence: read_value(
                &lookup,
                "DEDUPE_CLUSTER_MIN_CONFIDENCE",
                defaults.cluster_min_confidence,
                is_confidence,
            ),
            scan_warn_threshold: read_value(
                &lookup,
                "DEDUPE_SCAN_WARN_THRESHOLD",
                defaults.scan_warn_threshold,
                |_| true,
            ),
        };
        debug!("Dedupe config: {:?}", config);
        config
    }

    pub fn log_config(&self) {
        info!("🔧 Dedupe configuration");
        info!(
            "   Candidate search: limit={}, min confidence={:.2}",
            self.candidate_limit, self.candidate_min_confidence
        );
        info!(
            "   Cluster pass: limit={}, min confidence={:.2}",
            self.cluster_limit, self.cluster_min_confidence
        );
        info!("   Scale warning above {} records", self.scan_warn_threshold);
    }
}

fn is_confidence(value: &f64) -> bool {
    (0.0..=1.0).contains(value)
}

fn read_value<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(
                "⚠️ Ignoring {}='{}'; using default {}",
                key, raw, default
            );
            default
        }
    }
}

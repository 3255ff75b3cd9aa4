// src/utils/progress_bars/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Terminal progress settings for cluster passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressConfig {
    /// Master switch (`PROGRESS_ENABLED`).
    pub enabled: bool,
    /// Per-primary bar during a cluster pass (`PROGRESS_DETAILED`).
    pub detailed: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
        }
    }
}

/// Accepts the usual spellings of a boolean flag; anything else keeps `default`.
fn parse_flag(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            enabled: parse_flag(lookup("PROGRESS_ENABLED"), defaults.enabled),
            detailed: parse_flag(lookup("PROGRESS_DETAILED"), defaults.detailed),
        }
    }

    /// Display target for a cluster pass, or `None` when bars are switched off.
    pub fn cluster_progress(&self) -> Option<MultiProgress> {
        (self.enabled && self.detailed).then(MultiProgress::new)
    }
}

/// Bar that ticks once per primary visited by a cluster pass.
pub fn cluster_progress_bar(multi_progress: &MultiProgress, total: usize, label: &str) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(total as u64));
    let style = ProgressStyle::default_bar()
        .template("  🧩 [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

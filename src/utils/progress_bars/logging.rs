// src/utils/progress_bars/logging.rs - logging helpers for finder and merge runs
use log::{debug, info, warn};
use std::time::Instant;

use crate::errors::ScaleWarning;
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeOperation {
    CandidateSearch,
    Cluster,
    Merge,
}

#[derive(Clone)]
pub struct DedupeLogger {
    tag: String,
    emoji: &'static str,
    start_time: Instant,
}

impl DedupeLogger {
    pub fn new(operation: DedupeOperation, kind: EntityKind) -> Self {
        let (verb, emoji) = match operation {
            DedupeOperation::CandidateSearch => ("FIND", "🔍"),
            DedupeOperation::Cluster => ("CLUSTER", "🧩"),
            DedupeOperation::Merge => ("MERGE", "🔀"),
        };
        Self {
            tag: format!("{}-{}", verb, kind.as_str().to_uppercase()),
            emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, details: &str) {
        info!("[{}] {} 🚀 Starting ({})", self.tag, self.emoji, details);
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.tag,
                self.emoji,
                phase,
                details,
                elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.tag,
                self.emoji,
                phase,
                elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_data_loaded(&self, count: usize) {
        info!(
            "[{}] {} 📊 Loaded {} records from the record store",
            self.tag, self.emoji, count
        );
    }

    pub fn log_scale_warning(&self, warning: &ScaleWarning) {
        warn!("[{}] {} ⚠️  {}", self.tag, self.emoji, warning);
    }

    pub fn log_matches(&self, kept: usize, compared: usize, top_confidence: Option<f64>) {
        match top_confidence {
            Some(top) => info!(
                "[{}] {} 🎯 {} of {} comparisons kept (top confidence {:.3}) in {:.2?}",
                self.tag,
                self.emoji,
                kept,
                compared,
                top,
                self.start_time.elapsed()
            ),
            None => info!(
                "[{}] {} ✨ No matches among {} comparisons in {:.2?}",
                self.tag,
                self.emoji,
                compared,
                self.start_time.elapsed()
            ),
        }
    }

    pub fn log_groups(&self, groups: usize, grouped_entities: usize) {
        info!(
            "[{}] {} 🎉 COMPLETED: {} duplicate groups covering {} entities in {:.2?}",
            self.tag,
            self.emoji,
            groups,
            grouped_entities,
            self.start_time.elapsed()
        );
    }

    pub fn log_merge_committed(&self, primary_id: &str, merged: usize, reassigned: u64) {
        info!(
            "[{}] {} ✅ Merged {} duplicate(s) into {} ({} references reassigned) in {:.2?}",
            self.tag,
            self.emoji,
            merged,
            primary_id,
            reassigned,
            self.start_time.elapsed()
        );
    }

    pub fn log_rolled_back(&self, reason: &str) {
        warn!(
            "[{}] {} ↩️  Rolled back after {:.2?}: {}",
            self.tag,
            self.emoji,
            self.start_time.elapsed(),
            reason
        );
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.tag, self.emoji, message);
    }
}

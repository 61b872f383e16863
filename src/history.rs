use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::HistoryConfig;
use crate::score::decay::DecayReport;

/// One scheduled decay run: either a report or the reason it failed
#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub day: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DecayReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded in-memory history of decay ticks, newest last
pub struct TickHistory {
    max_entries: usize,
    entries: RwLock<VecDeque<TickRecord>>,
    total_recorded: AtomicU64,
    total_failed: AtomicU64,
}

impl TickHistory {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            entries: RwLock::new(VecDeque::new()),
            total_recorded: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, day: NaiveDate, report: DecayReport) {
        self.push(TickRecord { day, report: Some(report), error: None });
    }

    pub fn record_failure(&self, day: NaiveDate, error: String) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
        self.push(TickRecord { day, report: None, error: Some(error) });
    }

    fn push(&self, record: TickRecord) {
        let mut entries = self.entries.write();
        entries.push_back(record);
        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Most recent first
    pub fn recent(&self, count: usize) -> Vec<TickRecord> {
        let entries = self.entries.read();
        entries.iter().rev().take(count).cloned().collect()
    }

    pub fn last(&self) -> Option<TickRecord> {
        self.entries.read().back().cloned()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub fn get_stats(&self) -> serde_json::Value {
        let entries = self.entries.read();
        serde_json::json!({
            "current_entries": entries.len(),
            "max_entries": self.max_entries,
            "total_recorded": self.total_recorded(),
            "total_failed": self.total_failed(),
            "last": entries.back(),
        })
    }
}

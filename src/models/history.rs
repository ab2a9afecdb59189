use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::order::{OrderSnapshot, OrderStage};

pub const HISTORY_CAPACITY: usize = 10;

/// One summarized poll cycle, retained for display only.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub restaurant_name: String,
    pub status_text: String,
    pub driver_name: String,
    pub eta_label: String,
    pub stage: OrderStage,
}

impl HistoryEntry {
    /// Summarize an active snapshot; inactive cycles are not recorded.
    pub fn summarize(snapshot: &OrderSnapshot, at: DateTime<Utc>) -> Option<Self> {
        let first = snapshot.first()?;
        Some(Self {
            at,
            restaurant_name: first.restaurant_name.clone(),
            status_text: first.status_text.clone(),
            driver_name: first.driver_name.clone(),
            eta_label: first.eta_label.clone(),
            stage: first.stage,
        })
    }
}

/// Bounded ring of the last [`HISTORY_CAPACITY`] summarized cycles.
#[derive(Debug, Default)]
pub struct OrderHistory {
    entries: VecDeque<HistoryEntry>,
}

impl OrderHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderStage;

    fn entry(label: &str) -> HistoryEntry {
        HistoryEntry {
            at: Utc::now(),
            restaurant_name: label.to_string(),
            status_text: String::new(),
            driver_name: String::new(),
            eta_label: String::new(),
            stage: OrderStage::Preparing,
        }
    }

    #[test]
    fn ring_is_bounded_and_keeps_newest() {
        let mut history = OrderHistory::default();
        for i in 0..15 {
            history.push(entry(&format!("r{i}")));
        }
        let entries = history.entries();
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].restaurant_name, "r5");
        assert_eq!(entries[9].restaurant_name, "r14");
    }

    #[test]
    fn inactive_snapshot_is_not_summarized() {
        let snapshot = crate::models::order::OrderSnapshot::empty();
        assert!(HistoryEntry::summarize(&snapshot, Utc::now()).is_none());
    }
}

//! Bounded, most-recent-first record of completed interaction checks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::entities::interaction::InteractionReport;
use crate::transform::interaction::InteractionPair;

/// A flattened, tabular view of one history record.
pub type HistoryRow = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    InteractionCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub kind: RecordKind,
    pub recorded_at: String,
    pub drugs: Vec<String>,
    pub rxcuis: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub pairs: Vec<InteractionPair>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

impl HistoryRecord {
    /// Copies what a history row needs out of a finished interaction check.
    pub fn interaction_check(drugs: &[String], report: &InteractionReport) -> Self {
        Self {
            kind: RecordKind::InteractionCheck,
            recorded_at: now_rfc3339(),
            drugs: drugs.to_vec(),
            rxcuis: report.rxcuis.clone(),
            labels: report.labels.clone(),
            pairs: report.pairs(),
        }
    }

    /// Flattens the record: lists become `"; "`-joined strings, labels `code=label` entries,
    /// and each pair its one-line summary.
    pub fn to_row(&self) -> HistoryRow {
        let mut row = Map::new();
        row.insert(
            "kind".into(),
            serde_json::to_value(self.kind).unwrap_or(Value::Null),
        );
        row.insert("recorded_at".into(), Value::String(self.recorded_at.clone()));
        row.insert("drugs".into(), Value::String(self.drugs.join("; ")));
        row.insert("rxcuis".into(), Value::String(self.rxcuis.join("; ")));
        row.insert(
            "labels".into(),
            Value::String(
                self.labels
                    .iter()
                    .map(|(code, label)| format!("{code}={label}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        );
        row.insert("interaction_count".into(), Value::from(self.pairs.len()));
        row.insert(
            "interactions".into(),
            Value::String(
                self.pairs
                    .iter()
                    .map(InteractionPair::summary)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        );
        row
    }
}

/// Fixed-capacity ring buffer shared by all requests.
///
/// Every read and write goes through one mutex; it is never held across an await point.
#[derive(Debug)]
pub struct SessionHistory {
    capacity: usize,
    records: Mutex<VecDeque<HistoryRecord>>,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_CAPACITY)
    }
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryRecord>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inserts at the front, evicting the oldest record when full.
    pub fn add_record(&self, record: HistoryRecord) {
        let mut records = self.lock();
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// Current records, most recent first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Current records as flat rows, most recent first.
    pub fn export_rows(&self) -> Vec<HistoryRow> {
        self.lock().iter().map(HistoryRecord::to_row).collect()
    }
}

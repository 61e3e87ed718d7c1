use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Immutable record of one action attempt and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub params: Value,
    pub result: Value,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, params: Value, result: Value) -> Self {
        Self { timestamp: Utc::now(), action: action.into(), params, result }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only sink. Appends may happen concurrently; each record must land
/// as one complete, non-interleaved unit, durably before the action result is
/// returned.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

/// File-backed sink writing one JSON object per line, flushed on every
/// append.
pub struct JsonlAuditSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { writer: Mutex::new(BufWriter::new(file)) })
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AuditRecord, AuditSink, InMemoryAuditSink, JsonlAuditSink};

    #[test]
    fn in_memory_sink_keeps_records_in_append_order() {
        let sink = InMemoryAuditSink::default();
        sink.append(AuditRecord::new("cancel_order", json!({"order_id": 1001}), json!({"success": true})))
            .expect("append");
        sink.append(AuditRecord::new("issue_refund", json!({"order_id": 1002}), json!({"success": false})))
            .expect("append");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "cancel_order");
        assert_eq!(records[1].action, "issue_refund");
    }

    #[test]
    fn jsonl_sink_writes_one_complete_line_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("action_log.jsonl");

        let sink = JsonlAuditSink::open(&path).expect("open sink");
        sink.append(AuditRecord::new("escalate_case", json!({"order_id": 5}), json!({"success": true})))
            .expect("append");
        sink.append(AuditRecord::new("get_order_status", json!({"order_id": 6}), json!({"success": true})))
            .expect("append");

        let contents = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let record: AuditRecord = serde_json::from_str(line).expect("each line parses alone");
            assert!(!record.action.is_empty());
            assert!(record.result.get("success").is_some());
        }
    }

    #[test]
    fn jsonl_sink_appends_across_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("action_log.jsonl");

        {
            let sink = JsonlAuditSink::open(&path).expect("open sink");
            sink.append(AuditRecord::new("a", serde_json::Value::Null, serde_json::Value::Null))
                .expect("append");
        }
        {
            let sink = JsonlAuditSink::open(&path).expect("reopen sink");
            sink.append(AuditRecord::new("b", serde_json::Value::Null, serde_json::Value::Null))
                .expect("append");
        }

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents.lines().count(), 2);
    }
}

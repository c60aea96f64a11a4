//! Bounded record of recent calls
//!
//! Status views ("recent RPC calls") want to show what the application asked
//! the node and what came back. Each transport appends one [`CallRecord`] per
//! finished call; the oldest records fall off once capacity is reached.

use ethrpc_core::Result;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Default number of records kept
pub const DEFAULT_CAPACITY: usize = 100;

/// One finished call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Method called
    pub method: String,
    /// Parameters sent
    pub params: Vec<Value>,
    /// Result value, or the error message
    pub outcome: std::result::Result<Value, String>,
    /// Time from send to reply
    pub duration: Duration,
    /// When the call finished
    pub at: SystemTime,
}

/// Shared ring of recent calls
#[derive(Debug, Clone)]
pub struct CallLog {
    capacity: usize,
    records: Arc<Mutex<VecDeque<CallRecord>>>,
}

impl CallLog {
    /// Keep at most `capacity` records; 0 disables recording
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// A log that records nothing
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Maximum number of records kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a finished call
    pub fn record(&self, method: &str, params: &[Value], outcome: &Result<Value>, duration: Duration) {
        if self.capacity == 0 {
            return;
        }

        let record = CallRecord {
            method: method.to_string(),
            params: params.to_vec(),
            outcome: match outcome {
                Ok(value) => Ok(value.clone()),
                Err(e) => Err(e.to_string()),
            },
            duration,
            at: SystemTime::now(),
        };

        if let Ok(mut records) = self.records.lock() {
            while records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    /// Records, oldest first
    pub fn recent(&self) -> Vec<CallRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// True when no call has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Default for CallLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

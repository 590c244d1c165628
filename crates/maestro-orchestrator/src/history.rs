use crate::types::ExecutionRecord;
use std::collections::VecDeque;

/// Append-only log of finished executions, oldest first.
///
/// With a non-zero limit the oldest records are dropped once the log is full.
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    limit: usize,
}

impl ExecutionHistory {
    /// `limit == 0` keeps every record.
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    pub fn append(&mut self, record: ExecutionRecord) {
        if self.limit > 0 && self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// The last `n` records in completion order.
    pub fn recent(&self, n: usize) -> Vec<ExecutionRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

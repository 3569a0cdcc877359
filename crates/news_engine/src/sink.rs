use std::sync::{mpsc, Mutex};

use news_core::JobRecord;

/// Receives records as partitions emit them. Called concurrently from workers.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: JobRecord);
}

/// Forwards records to a channel; records are dropped once the receiver is gone.
pub struct ChannelRecordSink {
    tx: mpsc::Sender<JobRecord>,
}

impl ChannelRecordSink {
    pub fn new(tx: mpsc::Sender<JobRecord>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelRecordSink {
    fn emit(&self, record: JobRecord) {
        let _ = self.tx.send(record);
    }
}

/// Buffers records in memory, in emission order.
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<JobRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_records(self) -> Vec<JobRecord> {
        self.records
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordSink for CollectingSink {
    fn emit(&self, record: JobRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

use chrono::Utc;
use dragnet_core::wire::JobData;

/// Wall-clock seconds since the unix epoch, with sub-second precision.
pub(crate) fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One issued range. The range itself is immutable; the only mutable parts
/// are the heartbeat timestamp and the write-once end timestamp.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    id: u64,
    start_index: u64,
    end_index: u64,
    batch_size: u64,
    timeout_seconds: u64,
    start_timestamp: f64,
    update_timestamp: f64,
    end_timestamp: Option<f64>,
}

impl Job {
    pub(crate) fn new(id: u64, start_index: u64, batch_size: u64, timeout_seconds: u64) -> Self {
        let now = unix_now();
        Self {
            id,
            start_index,
            end_index: start_index + batch_size,
            batch_size,
            timeout_seconds,
            start_timestamp: now,
            update_timestamp: now,
            end_timestamp: None,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn start_index(&self) -> u64 {
        self.start_index
    }

    pub(crate) fn end_index(&self) -> u64 {
        self.end_index
    }

    /// Record a heartbeat, deferring expiry. No-op once finished.
    pub(crate) fn update(&mut self) {
        if self.end_timestamp.is_none() {
            self.update_timestamp = unix_now();
        }
    }

    /// Mark the job finished. The end timestamp is write-once.
    pub(crate) fn finish(&mut self) {
        if self.end_timestamp.is_none() {
            self.end_timestamp = Some(unix_now());
        }
    }

    /// Expiry is driven by the heartbeat, not by creation time: a worker
    /// that streams updates can hold a job longer than one timeout window.
    /// A finished job never expires.
    pub(crate) fn expired(&self) -> bool {
        match self.end_timestamp {
            None => unix_now() - self.update_timestamp >= self.timeout_seconds as f64,
            Some(_) => false,
        }
    }

    pub(crate) fn data(&self) -> JobData {
        JobData {
            id: self.id,
            start_index: self.start_index,
            end_index: self.end_index,
            batch_size: self.batch_size,
            timeout_seconds: self.timeout_seconds,
            start_timestamp: self.start_timestamp,
            update_timestamp: self.update_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

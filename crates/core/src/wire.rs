//! JSON wire types of the coordinator protocol.
//!
//! Field names are part of the protocol and are fixed in camelCase; both the
//! server facade and the worker client serialize through these types.

use serde::{Deserialize, Serialize};

/// One issued search job, as handed out by `GET /job` and echoed back on
/// finish/heartbeat requests.
///
/// The range is half-open: `start_index` inclusive, `end_index` exclusive,
/// with `end_index = start_index + batch_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    /// Server-assigned identifier, unique within a server lifetime.
    pub id: u64,
    /// First index of the range (inclusive).
    pub start_index: u64,
    /// One past the last index of the range (exclusive).
    pub end_index: u64,
    /// Number of indices in the range.
    pub batch_size: u64,
    /// Seconds without a heartbeat after which the server expires the job.
    pub timeout_seconds: u64,
    /// Creation time, seconds since the unix epoch.
    pub start_timestamp: f64,
    /// Last heartbeat time, seconds since the unix epoch.
    pub update_timestamp: f64,
    /// Finish time; `null` while the job is live.
    pub end_timestamp: Option<f64>,
}

/// Worker-visible timing settings, served by `GET /configuration/job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigData {
    /// Duration a single job should take; the worker sizes ranges toward it.
    pub target_duration_seconds: u64,
    /// How often the worker heartbeats a running job.
    pub update_interval_seconds: u64,
    /// Heartbeat timeout the server applies to issued jobs.
    pub timeout_seconds: u64,
}

/// Aggregate search progress, served by `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    /// Seconds since the server process started.
    pub runtime_seconds: f64,
    /// Indices covered by the completed prefix during this server lifetime.
    pub completed_searches: u64,
    /// `completed_searches / runtime_seconds` (0 at startup).
    pub searches_per_seconds: f64,
    /// Next index the server will hand out.
    pub next_start_index: u64,
    /// Every index below this is known searched.
    pub completed_end_index: u64,
    /// Jobs issued and not yet finished.
    pub running_jobs_count: usize,
    /// Jobs finished but not yet contiguous with the completed prefix.
    pub pending_jobs_count: usize,
    /// Jobs that expired or were cancelled.
    pub failed_jobs_count: usize,
    /// Jobs absorbed into the completed prefix.
    pub completed_jobs_count: usize,
    /// Results accepted so far.
    pub results_count: usize,
}

/// Error body returned by the facade for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// HTTP status code, repeated in the body.
    pub status: u16,
    /// Human-readable description.
    pub message: String,
}

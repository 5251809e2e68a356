//! The dispatch engine.
//!
//! A single value owns the search cursor and all job collections. Every
//! mutation is serialized under one state mutex and is short: checkpoint
//! I/O always happens outside the lock, on a snapshot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use dragnet_core::wire::{JobData, StatusData};

use crate::checkpoint::{CheckpointData, CheckpointStore};
use crate::job::{Job, unix_now};

#[derive(Debug)]
struct SearchState {
    initial_start_index: u64,
    next_start_index: u64,
    completed_end_index: u64,
    running: HashMap<u64, Job>,
    pending: HashMap<u64, Job>,
    failed: Vec<JobData>,
    completed: Vec<JobData>,
    results: Vec<serde_json::Value>,
}

impl SearchState {
    /// Drain every pending job adjacent to the completed prefix.
    ///
    /// `start_index <= completed_end_index` (not `=`) tolerates duplicate
    /// or overlapping pending jobs left behind by a reclaim; the `>` guards
    /// keep both cursors monotonic.
    fn absorb_pending(&mut self) -> bool {
        let mut absorbed = false;
        loop {
            let next_id = self
                .pending
                .values()
                .find(|job| job.start_index() <= self.completed_end_index)
                .map(Job::id);
            let Some(id) = next_id else {
                break;
            };

            let Some(job) = self.pending.remove(&id) else {
                break;
            };
            if job.start_index() > self.next_start_index {
                self.next_start_index = job.start_index();
            }
            if job.end_index() > self.completed_end_index {
                self.completed_end_index = job.end_index();
            }
            // A reclaimed range re-covered by a smaller batch can leave the
            // cursor below the completed boundary; everything below it is
            // already searched, so the cursor never points below it.
            if self.completed_end_index > self.next_start_index {
                self.next_start_index = self.completed_end_index;
            }
            tracing::info!(
                job_id = id,
                completed_end_index = self.completed_end_index,
                "job completed"
            );
            self.completed.push(job.data());
            absorbed = true;
        }
        absorbed
    }

    /// Move a running job to the failed list, rewinding the cursor so the
    /// lost range is reissued.
    fn fail_running(&mut self, job: Job) {
        if job.start_index() < self.next_start_index {
            self.next_start_index = job.start_index();
        }
        self.failed.push(job.data());
    }
}

/// The process-wide search engine.
pub struct SearchEngine {
    state: Mutex<SearchState>,
    next_job_id: AtomicU64,
    timeout_seconds: u64,
    start_timestamp: f64,
    checkpoint: CheckpointStore,
}

impl SearchEngine {
    /// Build the engine from the checkpoint store, resuming at the
    /// persisted index. No in-flight jobs survive a restart; workers must
    /// re-request their ranges.
    pub fn new(timeout_seconds: u64, checkpoint: CheckpointStore) -> anyhow::Result<Self> {
        let data = checkpoint.load()?;
        tracing::info!(
            index = data.index,
            results = data.results.len(),
            "search state loaded"
        );

        Ok(Self {
            state: Mutex::new(SearchState {
                initial_start_index: data.index,
                next_start_index: data.index,
                completed_end_index: data.index,
                running: HashMap::new(),
                pending: HashMap::new(),
                failed: data.failed,
                completed: data.completed,
                results: data.results,
            }),
            next_job_id: AtomicU64::new(0),
            timeout_seconds,
            start_timestamp: unix_now(),
            checkpoint,
        })
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, SearchState> {
        self.state.lock().unwrap()
    }

    /// Create a running job covering the next `batch_size` indices and
    /// advance the cursor past it.
    pub fn issue_job(&self, batch_size: u64) -> JobData {
        let batch_size = batch_size.max(1);
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.locked();
        let job = Job::new(id, state.next_start_index, batch_size, self.timeout_seconds);
        state.next_start_index = job.end_index();
        let data = job.data();
        state.running.insert(id, job);
        data
    }

    /// Heartbeat a running job. Returns false if the id is not running.
    pub fn update_job(&self, id: u64) -> bool {
        let mut state = self.locked();
        match state.running.get_mut(&id) {
            Some(job) => {
                job.update();
                true
            }
            None => false,
        }
    }

    /// Move a running job to pending and absorb any run of pending jobs now
    /// adjacent to the completed prefix. Returns false if the id is not
    /// running.
    pub fn finish_job(&self, id: u64) -> bool {
        let mut state = self.locked();
        let Some(mut job) = state.running.remove(&id) else {
            return false;
        };
        job.finish();
        state.pending.insert(id, job);
        state.absorb_pending();
        true
    }

    /// Cancel a running job, reclaiming its range. Returns false if the id
    /// is not running.
    pub fn cancel_job(&self, id: u64) -> bool {
        let mut state = self.locked();
        let Some(job) = state.running.remove(&id) else {
            return false;
        };
        state.fail_running(job);
        tracing::info!(
            job_id = id,
            next_start_index = state.next_start_index,
            "job cancelled"
        );
        true
    }

    /// Append worker results verbatim. Results are accepted independent of
    /// any job state; duplicates are kept.
    pub fn accept_results(&self, results: Vec<serde_json::Value>) -> bool {
        let mut state = self.locked();
        state.results.extend(results);
        true
    }

    /// Expire running jobs whose heartbeat lapsed, then absorb pending
    /// jobs. Returns whether anything changed (the caller persists if so).
    pub fn sweep(&self) -> bool {
        let mut state = self.locked();

        let expired_ids: Vec<u64> = state
            .running
            .values()
            .filter(|job| job.expired())
            .map(Job::id)
            .collect();
        let expired_any = !expired_ids.is_empty();

        for id in expired_ids {
            let Some(job) = state.running.remove(&id) else {
                continue;
            };
            state.fail_running(job);
            tracing::error!(
                job_id = id,
                next_start_index = state.next_start_index,
                "job expired"
            );
        }

        let absorbed_any = state.absorb_pending();
        expired_any || absorbed_any
    }

    /// Derived counters and throughput for `GET /status`.
    pub fn status(&self) -> StatusData {
        let state = self.locked();
        let runtime_seconds = (unix_now() - self.start_timestamp).max(0.0);
        let completed_searches = state.completed_end_index - state.initial_start_index;
        let searches_per_seconds = if runtime_seconds > 0.0 {
            completed_searches as f64 / runtime_seconds
        } else {
            0.0
        };

        StatusData {
            runtime_seconds,
            completed_searches,
            searches_per_seconds,
            next_start_index: state.next_start_index,
            completed_end_index: state.completed_end_index,
            running_jobs_count: state.running.len(),
            pending_jobs_count: state.pending.len(),
            failed_jobs_count: state.failed.len(),
            completed_jobs_count: state.completed.len(),
            results_count: state.results.len(),
        }
    }

    /// Snapshot of currently running jobs.
    pub fn running_jobs(&self) -> Vec<JobData> {
        self.locked().running.values().map(Job::data).collect()
    }

    /// Snapshot of finished jobs not yet absorbed.
    pub fn pending_jobs(&self) -> Vec<JobData> {
        self.locked().pending.values().map(Job::data).collect()
    }

    /// Snapshot of expired and cancelled jobs, oldest first.
    pub fn failed_jobs(&self) -> Vec<JobData> {
        self.locked().failed.clone()
    }

    /// Snapshot of absorbed jobs in absorption order.
    pub fn completed_jobs(&self) -> Vec<JobData> {
        self.locked().completed.clone()
    }

    /// Snapshot of all accepted results.
    pub fn results(&self) -> Vec<serde_json::Value> {
        self.locked().results.clone()
    }

    fn snapshot(&self) -> CheckpointData {
        let state = self.locked();
        CheckpointData {
            index: state.completed_end_index,
            results: state.results.clone(),
            failed: state.failed.clone(),
            completed: state.completed.clone(),
        }
    }

    /// Rewrite the checkpoint from a snapshot of the current state.
    ///
    /// The state lock is released before any file I/O starts.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let snapshot = self.snapshot();
        self.checkpoint.write(snapshot).await
    }

    /// Spawn the expiry sweeper: a once-per-second pass that fails expired
    /// jobs, drains absorbable pending jobs and rewrites the checkpoint
    /// when anything changed. Stops when `stop` flips to true.
    pub fn spawn_sweeper(
        self: &std::sync::Arc<Self>,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if engine.sweep() {
                            if let Err(err) = engine.persist().await {
                                tracing::error!("checkpoint write failed: {err:#}");
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine_with_timeout(timeout_seconds: u64) -> (SearchEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("search.json"));
        let engine = SearchEngine::new(timeout_seconds, store).unwrap();
        (engine, dir)
    }

    fn engine() -> (SearchEngine, TempDir) {
        engine_with_timeout(120)
    }

    /// The union of completed ranges must cover [initial, completed_end)
    /// without a gap. With `exact`, ranges must also partition it (no
    /// overlap), which holds for sequences without reclaim.
    fn assert_completed_covers(engine: &SearchEngine, exact: bool) {
        let status = engine.status();
        let mut ranges: Vec<(u64, u64)> = engine
            .completed_jobs()
            .iter()
            .map(|job| (job.start_index, job.end_index))
            .collect();
        ranges.sort_unstable();

        let mut covered = status.completed_end_index - status.completed_searches;
        for (start, end) in ranges {
            if exact {
                assert_eq!(start, covered, "completed ranges overlap or gap");
            } else {
                assert!(start <= covered, "gap in completed ranges");
            }
            covered = covered.max(end);
        }
        assert_eq!(covered, status.completed_end_index);
    }

    #[test]
    fn single_job_happy_path() {
        let (engine, _dir) = engine();

        let job = engine.issue_job(10);
        assert_eq!(job.id, 0);
        assert_eq!((job.start_index, job.end_index), (0, 10));

        assert!(engine.finish_job(0));
        let status = engine.status();
        assert_eq!(status.completed_end_index, 10);
        assert_eq!(status.next_start_index, 10);
        assert_eq!(status.pending_jobs_count, 0);
        assert_eq!(status.completed_jobs_count, 1);
        assert_eq!(status.results_count, 0);
        assert_eq!(engine.completed_jobs()[0].id, 0);
    }

    #[test]
    fn out_of_order_completion_cascades_on_absorption() {
        let (engine, _dir) = engine();

        let a = engine.issue_job(5);
        let b = engine.issue_job(7);
        let c = engine.issue_job(3);
        assert_eq!((a.start_index, a.end_index), (0, 5));
        assert_eq!((b.start_index, b.end_index), (5, 12));
        assert_eq!((c.start_index, c.end_index), (12, 15));

        assert!(engine.finish_job(b.id));
        assert_eq!(engine.status().completed_end_index, 0);
        assert_eq!(engine.status().pending_jobs_count, 1);

        assert!(engine.finish_job(c.id));
        assert_eq!(engine.status().completed_end_index, 0);
        assert_eq!(engine.status().pending_jobs_count, 2);

        assert!(engine.finish_job(a.id));
        let status = engine.status();
        assert_eq!(status.completed_end_index, 15);
        assert_eq!(status.pending_jobs_count, 0);

        let order: Vec<u64> = engine.completed_jobs().iter().map(|j| j.id).collect();
        assert_eq!(order, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn expiry_reclaims_the_whole_prefix() {
        let (engine, _dir) = engine_with_timeout(0);

        engine.issue_job(10);
        engine.issue_job(10);
        assert_eq!(engine.status().next_start_index, 20);

        assert!(engine.sweep());
        let status = engine.status();
        assert_eq!(status.failed_jobs_count, 2);
        assert_eq!(status.running_jobs_count, 0);
        assert_eq!(status.next_start_index, 0);
        assert_eq!(status.completed_end_index, 0);

        let reissued = engine.issue_job(10);
        assert_eq!(reissued.id, 2);
        assert_eq!((reissued.start_index, reissued.end_index), (0, 10));
    }

    #[test]
    fn partial_reclaim_keeps_completed_prefix() {
        let (engine, _dir) = engine_with_timeout(0);

        let a = engine.issue_job(5);
        assert!(engine.finish_job(a.id));
        assert_eq!(engine.status().completed_end_index, 5);

        let b = engine.issue_job(10);
        assert_eq!((b.start_index, b.end_index), (5, 15));

        assert!(engine.sweep());
        let status = engine.status();
        assert_eq!(status.next_start_index, 5);
        assert_eq!(status.completed_end_index, 5);
        let failed = engine.failed_jobs();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
    }

    #[test]
    fn results_accepted_independent_of_job_state() {
        let (engine, _dir) = engine();

        assert!(engine.accept_results(vec![serde_json::json!({"v": 1})]));
        let status = engine.status();
        assert_eq!(status.results_count, 1);
        assert_eq!(status.running_jobs_count, 0);
        assert_eq!(status.completed_jobs_count, 0);
        assert_eq!(engine.results(), vec![serde_json::json!({"v": 1})]);
    }

    #[test]
    fn heartbeat_prevents_expiry_and_unknown_ids_are_rejected() {
        let (engine, _dir) = engine_with_timeout(3600);

        let job = engine.issue_job(1);
        assert!(engine.update_job(job.id));
        assert!(!engine.sweep());
        assert_eq!(engine.status().running_jobs_count, 1);

        assert!(!engine.update_job(99));
        assert!(!engine.finish_job(99));
        assert!(!engine.cancel_job(99));
    }

    #[test]
    fn finished_job_cannot_be_finished_or_cancelled_again() {
        let (engine, _dir) = engine();
        let job = engine.issue_job(2);
        assert!(engine.finish_job(job.id));
        assert!(!engine.finish_job(job.id));
        assert!(!engine.cancel_job(job.id));
        assert!(!engine.update_job(job.id));
    }

    #[test]
    fn cancel_overlap_with_pending_resolves_through_absorption() {
        // Reclaim while a later range is pending: the reissued range
        // overlaps the pending one, and both absorb without breaking
        // monotonicity.
        let (engine, _dir) = engine();

        let a = engine.issue_job(5);
        let b = engine.issue_job(5);
        assert!(engine.finish_job(b.id));

        assert!(engine.cancel_job(a.id));
        assert_eq!(engine.status().next_start_index, 0);

        let c = engine.issue_job(10);
        assert_eq!((c.start_index, c.end_index), (0, 10));
        assert!(engine.finish_job(c.id));

        let status = engine.status();
        assert_eq!(status.completed_end_index, 10);
        assert_eq!(status.pending_jobs_count, 0);
        assert_eq!(status.next_start_index, 10);
        assert_completed_covers(&engine, false);
    }

    #[test]
    fn absorption_clamps_cursor_to_completed_boundary() {
        let (engine, _dir) = engine_with_timeout(0);

        engine.issue_job(5);
        let b = engine.issue_job(5);
        assert!(engine.finish_job(b.id));

        // The first job expires: the cursor rewinds to 0 while b stays
        // pending.
        assert!(engine.sweep());
        assert_eq!(engine.status().next_start_index, 0);

        // Re-cover [0, 5) with a smaller batch; absorbing it makes b
        // adjacent, and the cursor must follow the completed boundary.
        let c = engine.issue_job(5);
        assert_eq!((c.start_index, c.end_index), (0, 5));
        assert!(engine.finish_job(c.id));

        let status = engine.status();
        assert_eq!(status.completed_end_index, 10);
        assert_eq!(status.next_start_index, 10);
        assert_eq!(status.pending_jobs_count, 0);
    }

    #[test]
    fn issue_finish_sequences_partition_the_prefix() {
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            seed >> 33
        };

        let (engine, _dir) = engine();
        let mut open: Vec<u64> = Vec::new();

        for _ in 0..400 {
            if open.is_empty() || next() % 2 == 0 {
                let job = engine.issue_job(next() % 8 + 1);
                open.push(job.id);
            } else {
                let idx = (next() as usize) % open.len();
                let id = open.swap_remove(idx);
                assert!(engine.finish_job(id));
            }

            let status = engine.status();
            assert!(status.completed_end_index <= status.next_start_index);
            for job in engine.running_jobs() {
                assert!(job.start_index < status.next_start_index);
            }
            for job in engine.pending_jobs() {
                assert!(job.start_index >= status.completed_end_index);
            }
        }

        for id in open {
            assert!(engine.finish_job(id));
        }
        let status = engine.status();
        assert_eq!(status.completed_end_index, status.next_start_index);
        assert_eq!(status.pending_jobs_count, 0);
        assert_completed_covers(&engine, true);
    }

    #[test]
    fn mixed_sequences_keep_the_prefix_gap_free() {
        let mut seed: u64 = 0x243f6a8885a308d3;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            seed >> 33
        };

        // Timeout 0 makes every running job expire on the next sweep, so
        // the sequence exercises reclaim and overlapping pending jobs.
        let (engine, _dir) = engine_with_timeout(0);
        let mut open: Vec<u64> = Vec::new();
        let mut last_completed_end = 0;

        for _ in 0..600 {
            match next() % 4 {
                0 | 1 => {
                    let job = engine.issue_job(next() % 8 + 1);
                    open.push(job.id);
                }
                2 if !open.is_empty() => {
                    let idx = (next() as usize) % open.len();
                    let id = open.swap_remove(idx);
                    engine.finish_job(id);
                }
                3 => {
                    engine.sweep();
                    open.clear();
                }
                _ => {}
            }

            let status = engine.status();
            assert!(status.completed_end_index >= last_completed_end);
            last_completed_end = status.completed_end_index;
            assert!(status.completed_end_index <= status.next_start_index);
            for job in engine.pending_jobs() {
                assert!(job.start_index >= status.completed_end_index);
            }
            assert_completed_covers(&engine, false);
        }
    }

    #[tokio::test]
    async fn persist_and_reload_resumes_at_completed_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("search.json");

        let store = CheckpointStore::new(path.clone());
        let engine = SearchEngine::new(120, store).unwrap();
        let a = engine.issue_job(10);
        engine.issue_job(10);
        engine.finish_job(a.id);
        engine.accept_results(vec![serde_json::json!([1, 2, 3])]);
        engine.persist().await.unwrap();

        let reloaded = SearchEngine::new(120, CheckpointStore::new(path)).unwrap();
        let status = reloaded.status();
        // In-flight jobs do not survive a restart.
        assert_eq!(status.running_jobs_count, 0);
        assert_eq!(status.next_start_index, 10);
        assert_eq!(status.completed_end_index, 10);
        assert_eq!(status.completed_searches, 0);
        assert_eq!(status.completed_jobs_count, 1);
        assert_eq!(status.results_count, 1);

        // New jobs continue from the persisted index with fresh ids.
        let job = reloaded.issue_job(5);
        assert_eq!(job.id, 0);
        assert_eq!(job.start_index, 10);
    }
}

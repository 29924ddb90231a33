use std::collections::HashMap;

use rand::Rng;
use tokio::sync::{broadcast, RwLock};

use crate::config::StopPolicy;
use crate::error::{Result, SnowflakeError};
use crate::plugins::{CustomJob, CustomJobAdapter};
use crate::scheduler::deploy::{DeployRequest, JobField};
use crate::scheduler::events::JobEvent;
use crate::scheduler::job::{JobRecord, JobSummary};
use crate::worker::{share, ProcessController, SharedController};

const ID_BYTES: usize = 8;
const EVENT_CAPACITY: usize = 256;
const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// Everything guarded by the registry lock.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) jobs: HashMap<String, JobRecord>,
    next_seq: u64,
}

impl RegistryState {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn name_taken(&self, name: &str) -> bool {
        self.jobs.values().any(|job| job.name == name)
    }

    /// Ids win over names, so a job can always be addressed by its id.
    fn resolve_mut(&mut self, identifier: &str) -> Option<&mut JobRecord> {
        if self.jobs.contains_key(identifier) {
            return self.jobs.get_mut(identifier);
        }
        self.jobs.values_mut().find(|job| job.name == identifier)
    }

    fn resolve(&self, identifier: &str) -> Option<&JobRecord> {
        self.jobs
            .get(identifier)
            .or_else(|| self.jobs.values().find(|job| job.name == identifier))
    }

    fn fresh_id(&self) -> String {
        generate_job_id(|candidate| self.jobs.contains_key(candidate))
    }

    /// Insert a record under `id` (from [`fresh_id`](Self::fresh_id)) and the
    /// first free name derived from `base_name`.
    fn insert(
        &mut self,
        id: String,
        base_name: &str,
        target_path: String,
        controller: SharedController,
    ) -> &mut JobRecord {
        let name = suggest_allowed_name(base_name, |candidate| self.name_taken(candidate));
        let seq = self.take_seq();
        let record = JobRecord::new(id.clone(), name, target_path, seq, controller);
        self.jobs.entry(id).or_insert(record)
    }
}

/// The set of known jobs.
///
/// One `RwLock` guards the whole map: id generation, name de-duplication,
/// insertion, enable/disable and the scheduler's per-tick updates all go
/// through it. Controllers are never called while the lock is held.
#[derive(Debug)]
pub struct JobRegistry {
    pub(crate) state: RwLock<RegistryState>,
    events: broadcast::Sender<JobEvent>,
    stop_policy: StopPolicy,
    output_limit: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_process_settings(StopPolicy::default(), DEFAULT_OUTPUT_LIMIT)
    }

    /// Registry whose process jobs use the given stop escalation and
    /// per-stream output cap.
    pub fn with_process_settings(stop_policy: StopPolicy, output_limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            events,
            stop_policy,
            output_limit,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Create a command-spawned job from a validated request.
    ///
    /// The controller is built before the lock is taken, so a target path
    /// with no resolvable command is rejected without touching the map.
    pub async fn deploy(&self, request: DeployRequest) -> Result<JobSummary> {
        let controller = ProcessController::new(
            &request.target_path,
            request.command.as_deref(),
            request.arguments.clone(),
        )?
        .with_stop_policy(self.stop_policy)
        .with_output_limit(self.output_limit);

        let mut state = self.state.write().await;
        let id = state.fresh_id();
        let controller = share(Box::new(controller.with_label(id.clone())));
        let record = state.insert(id, &request.name, request.target_path, controller);
        record.disabled = request.disabled;
        record.repeat = request.repeat;
        record.repeat_sleep = request.repeat_sleep;
        record.operating_week_days = request.operating_week_days;
        record.operating_time_window = request.operating_time_window;
        let summary = record.summary();

        tracing::info!(job_id = %summary.id, name = %summary.name, "Job deployed");
        Ok(summary)
    }

    /// Register a pre-built job. Its dependency check runs first, outside
    /// the lock; a job that fails it is never added.
    pub async fn register_external_job(&self, mut job: Box<dyn CustomJob>) -> Result<String> {
        if !job.dependency_check().await {
            return Err(SnowflakeError::DependencyMissing(job.name().to_string()));
        }

        let base_name = job.name().to_string();
        let target_path = job.source();
        let active = job.active();
        let controller = share(Box::new(CustomJobAdapter::new(job)));

        let mut state = self.state.write().await;
        let id = state.fresh_id();
        let record = state.insert(id, &base_name, target_path, controller);
        record.active = active;

        tracing::info!(job_id = %record.id, name = %record.name, "Custom job registered");
        Ok(record.id.clone())
    }

    /// Clear `disabled` and `finished`. The scheduler starts the job on its
    /// next tick if the schedule admits it.
    pub async fn enable(&self, identifier: &str) -> Result<JobSummary> {
        self.update(identifier, |job| {
            job.disabled = false;
            job.finished = false;
        })
        .await
    }

    /// Set `disabled`. A running workload is stopped on the next tick.
    pub async fn disable(&self, identifier: &str) -> Result<JobSummary> {
        self.update(identifier, |job| job.disabled = true).await
    }

    /// Disable every job. Returns how many were not disabled before.
    pub async fn disable_all(&self) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for job in state.jobs.values_mut() {
            if !job.disabled {
                job.disabled = true;
                changed += 1;
            }
        }
        tracing::info!(changed, "All jobs disabled");
        changed
    }

    /// Overwrite one scheduling field.
    pub async fn configure(&self, identifier: &str, field: JobField) -> Result<JobSummary> {
        let mut state = self.state.write().await;

        let target = state
            .resolve(identifier)
            .map(|job| job.id.clone())
            .ok_or_else(|| SnowflakeError::NotFound(identifier.to_string()))?;
        if let JobField::Name(name) = &field {
            if state.jobs.values().any(|job| job.name == *name && job.id != target) {
                return Err(SnowflakeError::NameConflict(name.clone()));
            }
        }

        let key = field.key();
        let job = state
            .jobs
            .get_mut(&target)
            .ok_or_else(|| SnowflakeError::NotFound(identifier.to_string()))?;
        match field {
            JobField::Name(name) => job.name = name,
            JobField::Disabled(disabled) => job.disabled = disabled,
            JobField::Finished(finished) => job.finished = finished,
            JobField::Repeat(repeat) => job.repeat = repeat,
            JobField::RepeatSleep(seconds) => job.repeat_sleep = seconds,
            JobField::WeekDays(days) => job.operating_week_days = days,
            JobField::TimeWindow(window) => job.operating_time_window = window,
        }

        tracing::info!(job_id = %job.id, argument = key, "Job reconfigured");
        Ok(job.summary())
    }

    async fn update<F>(&self, identifier: &str, apply: F) -> Result<JobSummary>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut state = self.state.write().await;
        match state.resolve_mut(identifier) {
            Some(job) => {
                apply(job);
                tracing::debug!(job_id = %job.id, disabled = job.disabled, "Job updated");
                Ok(job.summary())
            }
            None => {
                tracing::warn!(identifier, "Identifier not found");
                Err(SnowflakeError::NotFound(identifier.to_string()))
            }
        }
    }

    pub async fn get(&self, identifier: &str) -> Option<JobSummary> {
        self.state.read().await.resolve(identifier).map(JobRecord::summary)
    }

    /// Snapshot of every job in deploy order.
    pub async fn list(&self) -> Vec<JobSummary> {
        let state = self.state.read().await;
        let mut jobs: Vec<&JobRecord> = state.jobs.values().collect();
        jobs.sort_by_key(|job| job.seq);
        jobs.into_iter().map(JobRecord::summary).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.jobs.is_empty()
    }

    /// `(id, controller)` for every job, in deploy order.
    pub(crate) async fn controllers(&self) -> Vec<(String, SharedController)> {
        let state = self.state.read().await;
        let mut jobs: Vec<&JobRecord> = state.jobs.values().collect();
        jobs.sort_by_key(|job| job.seq);
        jobs.into_iter()
            .map(|job| (job.id.clone(), job.controller.clone()))
            .collect()
    }
}

/// Random 8-byte hex id, re-drawn until `taken` rejects it.
pub fn generate_job_id<F>(taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut rng = rand::thread_rng();
    loop {
        let bytes: [u8; ID_BYTES] = rng.gen();
        let id: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        if !taken(&id) {
            return id;
        }
    }
}

/// First free name in the sequence `base`, `base_1`, `base_2`, ...
///
/// A base that already ends in `_<n>` continues counting from `n`.
pub fn suggest_allowed_name<F>(base: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }

    let (mut stem, mut counter) = match base.rsplit_once('_') {
        Some((stem, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            match digits.parse::<u64>() {
                Ok(n) => (stem, n),
                Err(_) => (base, 0),
            }
        }
        _ => (base, 0),
    };

    loop {
        counter = match counter.checked_add(1) {
            Some(next) => next,
            None => {
                stem = base;
                1
            }
        };
        let candidate = format!("{}_{}", stem, counter);
        if !taken(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn free_name_is_kept() {
        let taken = set(&["other"]);
        assert_eq!(suggest_allowed_name("worker", |n| taken.contains(n)), "worker");
    }

    #[test]
    fn suffix_is_appended_then_incremented() {
        let taken = set(&["worker"]);
        assert_eq!(suggest_allowed_name("worker", |n| taken.contains(n)), "worker_1");

        let taken = set(&["worker", "worker_1"]);
        assert_eq!(suggest_allowed_name("worker", |n| taken.contains(n)), "worker_2");
    }

    #[test]
    fn existing_numeric_suffix_is_continued() {
        let taken = set(&["job_7"]);
        assert_eq!(suggest_allowed_name("job_7", |n| taken.contains(n)), "job_8");
    }

    #[test]
    fn non_numeric_trailing_segment_gets_new_suffix() {
        let taken = set(&["backup_daily", "backup_daily_1"]);
        assert_eq!(
            suggest_allowed_name("backup_daily", |n| taken.contains(n)),
            "backup_daily_2"
        );
    }

    #[test]
    fn overflowing_suffix_still_converges() {
        let base = format!("x_{}", u64::MAX);
        let taken = set(&[base.as_str()]);
        assert_eq!(
            suggest_allowed_name(&base, |n| taken.contains(n)),
            format!("{}_1", base)
        );

        let huge = "y_99999999999999999999999";
        let taken = set(&[huge]);
        assert_eq!(suggest_allowed_name(huge, |n| taken.contains(n)), format!("{}_1", huge));
    }

    #[test]
    fn generated_ids_are_hex_and_skip_taken() {
        let id = generate_job_id(|_| false);
        assert_eq!(id.len(), ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let first = id.clone();
        let again = generate_job_id(|candidate| candidate == first);
        assert_ne!(again, first);
    }
}

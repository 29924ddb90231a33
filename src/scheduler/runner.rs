use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::scheduler::events::JobEvent;
use crate::scheduler::policy;
use crate::scheduler::registry::JobRegistry;
use crate::worker::{CapturedOutput, RunOutcome, SharedController};

/// What one tick did, by job id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub completed: Vec<String>,
    pub errors: Vec<String>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.completed.is_empty()
            && self.errors.is_empty()
    }
}

struct Probe {
    id: String,
    alive: bool,
    output: Option<CapturedOutput>,
    controller: SharedController,
}

enum Action {
    Start,
    Stop,
}

/// Periodically reconciles every job with its schedule.
///
/// A tick runs in three phases:
/// 1. **Probe**: ask each controller whether its workload is alive (no registry lock)
/// 2. **Decide**: under the registry write lock, refresh `active`, record runs
///    that ended on their own and plan start/stop transitions
/// 3. **Act**: call `start()`/`stop()` without the registry lock, then re-lock
///    to commit timestamps and flags
#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Arc<JobRegistry>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(registry: Arc<JobRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Tick until `shutdown` is cancelled, then stop every running job.
    ///
    /// Each tick runs as its own task, so a panic while evaluating one tick is
    /// logged and the loop carries on with the next.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = interval.tick() => {
                    let scheduler = self.clone();
                    let tick = tokio::spawn(async move { scheduler.tick(Local::now()).await });
                    match tick.await {
                        Ok(report) if !report.is_idle() => {
                            tracing::debug!(
                                started = report.started.len(),
                                stopped = report.stopped.len(),
                                completed = report.completed.len(),
                                errors = report.errors.len(),
                                "Tick finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(code = "E_TICK_PANIC", error = %e, "Scheduler tick aborted");
                        }
                    }
                }
            }
        }

        let report = self.stop_all(Local::now()).await;
        tracing::info!(stopped = report.stopped.len(), "Scheduler stopped");
    }

    /// One evaluation pass over every job at local time `now`.
    pub async fn tick(&self, now: DateTime<Local>) -> TickReport {
        let stamp = now.with_timezone(&Utc);
        let mut report = TickReport::default();

        let mut probes = Vec::new();
        for (id, controller) in self.registry.controllers().await {
            let (alive, output) = {
                let mut guard = controller.lock().await;
                let alive = guard.is_alive().await;
                (alive, (!alive).then(|| guard.output()))
            };
            probes.push(Probe {
                id,
                alive,
                output,
                controller,
            });
        }

        let mut plan = Vec::new();
        {
            let mut state = self.registry.state.write().await;
            for probe in probes {
                // Deployed after the probe phase; picked up next tick
                let Some(job) = state.jobs.get_mut(&probe.id) else {
                    continue;
                };

                let was_active = job.active;
                job.active = probe.alive;

                if was_active && !probe.alive && job.time_started.is_some() {
                    job.mark_stopped(stamp);
                    let outcome = RunOutcome::classify(&probe.output.unwrap_or_default());
                    match &outcome {
                        RunOutcome::Success => {
                            tracing::info!(job_id = %job.id, name = %job.name, "Job completed")
                        }
                        RunOutcome::Failure(reason) => {
                            tracing::warn!(job_id = %job.id, name = %job.name, reason = %reason, "Job completed with errors")
                        }
                    }
                    report.completed.push(job.id.clone());
                    self.registry.emit(JobEvent::Completed {
                        id: job.id.clone(),
                        name: job.name.clone(),
                        outcome,
                    });
                }

                let verdict = policy::admission(job, &now);
                if !verdict.is_admitted() {
                    if job.active {
                        tracing::debug!(job_id = %job.id, verdict = ?verdict, "Job not admitted, stopping");
                        plan.push((probe.id, Action::Stop, probe.controller));
                    }
                    continue;
                }

                if !job.active && !job.finished && !job.resting(stamp) {
                    plan.push((probe.id, Action::Start, probe.controller));
                }
            }
        }

        for (id, action, controller) in plan {
            match action {
                Action::Start => self.start_job(&id, &controller, stamp, &mut report).await,
                Action::Stop => self.stop_job(&id, &controller, stamp, &mut report).await,
            }
        }

        report
    }

    /// Stop every job that is currently running.
    pub async fn stop_all(&self, now: DateTime<Local>) -> TickReport {
        let stamp = now.with_timezone(&Utc);
        let mut report = TickReport::default();

        let running: Vec<(String, SharedController)> = {
            let state = self.registry.state.read().await;
            let mut jobs: Vec<_> = state.jobs.values().filter(|job| job.active).collect();
            jobs.sort_by_key(|job| job.seq);
            jobs.into_iter()
                .map(|job| (job.id.clone(), job.controller.clone()))
                .collect()
        };

        for (id, controller) in running {
            self.stop_job(&id, &controller, stamp, &mut report).await;
        }
        report
    }

    async fn start_job(
        &self,
        id: &str,
        controller: &SharedController,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let result = controller.lock().await.start().await;

        let stop_now = {
            let mut state = self.registry.state.write().await;
            let Some(job) = state.jobs.get_mut(id) else {
                return;
            };

            // One attempt per deployment for one-shot jobs, successful or not
            if !job.repeat {
                job.finished = true;
            }

            match result {
                Ok(()) => {
                    job.active = true;
                    job.time_started = Some(now);
                    job.time_stopped = None;
                    job.failures.clear();
                    tracing::info!(job_id = %job.id, name = %job.name, "Job started");
                    report.started.push(job.id.clone());
                    self.registry.emit(JobEvent::Started {
                        id: job.id.clone(),
                        name: job.name.clone(),
                    });
                    job.disabled
                }
                Err(e) => {
                    let message = e.to_string();
                    if job.failures.should_log(&message) {
                        tracing::error!(job_id = %job.id, name = %job.name, code = e.code(), error = %message, "Could not start job");
                    }
                    report.errors.push(job.id.clone());
                    self.registry.emit(JobEvent::Failed {
                        id: job.id.clone(),
                        name: job.name.clone(),
                        error: message,
                    });
                    false
                }
            }
        };

        // Disabled while the workload was starting
        if stop_now {
            self.stop_job(id, controller, now, report).await;
        }
    }

    async fn stop_job(
        &self,
        id: &str,
        controller: &SharedController,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let result = controller.lock().await.stop().await;

        let mut state = self.registry.state.write().await;
        let Some(job) = state.jobs.get_mut(id) else {
            return;
        };

        match result {
            Ok(()) => {
                if !job.active {
                    return;
                }
                job.mark_stopped(now);
                job.failures.clear();
                tracing::info!(job_id = %job.id, name = %job.name, duration_s = job.time_duration.num_seconds(), "Job terminated");
                report.stopped.push(job.id.clone());
                self.registry.emit(JobEvent::Terminated {
                    id: job.id.clone(),
                    name: job.name.clone(),
                    duration: job.time_duration,
                });
            }
            Err(e) => {
                let message = e.to_string();
                if job.failures.should_log(&message) {
                    tracing::error!(job_id = %job.id, name = %job.name, code = e.code(), error = %message, "Could not stop job");
                }
                report.errors.push(job.id.clone());
                self.registry.emit(JobEvent::Failed {
                    id: job.id.clone(),
                    name: job.name.clone(),
                    error: message,
                });
            }
        }
    }
}

//! Shared helpers for the integration tests: a scriptable custom job, fixed
//! wall-clock instants and throwaway shell scripts.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use tokio::sync::Notify;

use snowflake::config::StopPolicy;
use snowflake::error::{Result, SnowflakeError};
use snowflake::plugins::CustomJob;
use snowflake::scheduler::JobRegistry;

/// Observable state of a [`FakeJob`], shared with the test.
#[derive(Debug)]
pub struct FakeState {
    pub alive: bool,
    pub start_attempts: u32,
    pub starts: u32,
    pub stops: u32,
    pub fail_start: bool,
    pub stuck: bool,
    pub dependencies: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            alive: false,
            start_attempts: 0,
            starts: 0,
            stops: 0,
            fail_start: false,
            stuck: false,
            dependencies: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeHandle(Arc<Mutex<FakeState>>);

impl FakeHandle {
    pub fn alive(&self) -> bool {
        self.0.lock().alive
    }

    pub fn starts(&self) -> u32 {
        self.0.lock().starts
    }

    pub fn start_attempts(&self) -> u32 {
        self.0.lock().start_attempts
    }

    pub fn stops(&self) -> u32 {
        self.0.lock().stops
    }

    /// The workload exits on its own.
    pub fn finish(&self) {
        self.0.lock().alive = false;
    }

    /// The workload was started outside the daemon.
    pub fn set_alive(&self, alive: bool) {
        self.0.lock().alive = alive;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.0.lock().fail_start = fail;
    }

    /// While stuck, `stop()` fails and the workload keeps running.
    pub fn set_stuck(&self, stuck: bool) {
        self.0.lock().stuck = stuck;
    }
}

/// Holds a [`FakeJob`]'s `start()` until the test releases it.
#[derive(Clone, Default)]
pub struct StartGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory custom job: "running" is a flag the test can flip.
pub struct FakeJob {
    name: String,
    active: bool,
    state: FakeHandle,
    gate: Option<StartGate>,
}

impl FakeJob {
    pub fn new(name: &str) -> (Self, FakeHandle) {
        let state = FakeHandle::default();
        (
            Self {
                name: name.to_string(),
                active: false,
                state: state.clone(),
                gate: None,
            },
            state,
        )
    }

    pub fn without_dependencies(self) -> Self {
        self.state.0.lock().dependencies = false;
        self
    }

    pub fn initially_active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn gated_start(mut self) -> (Self, StartGate) {
        let gate = StartGate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }
}

#[async_trait]
impl CustomJob for FakeJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn active(&self) -> bool {
        self.active
    }

    fn source(&self) -> String {
        format!("fake://{}", self.name)
    }

    async fn dependency_check(&mut self) -> bool {
        self.state.0.lock().dependencies
    }

    async fn start(&mut self) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.0.lock();
        state.start_attempts += 1;
        if state.fail_start {
            return Err(SnowflakeError::Plugin {
                name: self.name.clone(),
                reason: "refused to start".to_string(),
            });
        }
        state.alive = true;
        state.starts += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.0.lock();
        state.stops += 1;
        if state.stuck {
            return Err(SnowflakeError::StopFailed {
                pid: None,
                attempts: 1,
            });
        }
        state.alive = false;
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        self.state.0.lock().alive
    }
}

/// Registry whose process jobs give up quickly when stopping.
pub fn fast_registry() -> Arc<JobRegistry> {
    Arc::new(JobRegistry::with_process_settings(fast_stop_policy(), 64 * 1024))
}

pub fn fast_stop_policy() -> StopPolicy {
    StopPolicy {
        attempts: 5,
        pause_ms: 50,
    }
}

pub async fn register_fake(registry: &JobRegistry, name: &str) -> (String, FakeHandle) {
    let (job, handle) = FakeJob::new(name);
    let id = registry
        .register_external_job(Box::new(job))
        .await
        .expect("fake job registers");
    (id, handle)
}

/// 2024-01-01 is a Monday.
pub fn monday_at(hour: u32, minute: u32) -> DateTime<Local> {
    at(1, hour, minute, 0)
}

/// 2024-01-02 is a Tuesday.
pub fn tuesday_at(hour: u32, minute: u32) -> DateTime<Local> {
    at(2, hour, minute, 0)
}

pub fn at(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 1, day, hour, minute, second)
        .earliest()
        .expect("valid local time")
}

/// Write a bash script into `dir`. The `.sh` extension lets the daemon infer
/// `bash` as the command.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("{}.sh", name));
    std::fs::write(&path, format!("#!/usr/bin/env bash\n{}\n", body)).expect("write script");
    path
}

/// Poll `check` every 25ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

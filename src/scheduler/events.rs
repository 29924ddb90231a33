use chrono::Duration;

use crate::worker::RunOutcome;

/// Lifecycle notifications published by the registry.
///
/// Delivery is best effort: a subscriber that falls behind misses events
/// rather than slowing the scheduler down.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The scheduler started the job's workload.
    Started { id: String, name: String },
    /// The scheduler stopped a running workload.
    Terminated {
        id: String,
        name: String,
        duration: Duration,
    },
    /// The workload exited on its own.
    Completed {
        id: String,
        name: String,
        outcome: RunOutcome,
    },
    /// Starting or stopping the workload failed.
    Failed {
        id: String,
        name: String,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { id, .. }
            | JobEvent::Terminated { id, .. }
            | JobEvent::Completed { id, .. }
            | JobEvent::Failed { id, .. } => id,
        }
    }
}

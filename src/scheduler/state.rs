//! Registry entries and the read-only view handed out to callers.

use super::Registry;
use crate::launcher::ProcessHandle;
use crate::trigger::TriggerHandle;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

/// Scheduling state for one event.
#[derive(Debug)]
pub struct JobEntry {
    pub event_id: String,
    /// Absent when the backend was started at registration time.
    pub start_trigger: Option<TriggerHandle>,
    pub stop_trigger: TriggerHandle,
    /// Set once the start action spawned a backend.
    pub process: Option<ProcessHandle>,
}

impl JobEntry {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            event_id: self.event_id.clone(),
            start_at: self
                .start_trigger
                .as_ref()
                .filter(|t| t.is_armed())
                .map(|t| t.fire_at().with_timezone(&Utc)),
            stop_at: self.stop_trigger.fire_at().with_timezone(&Utc),
            pid: self.process.map(|p| p.pid),
            started_at: self.process.map(|p| p.started_at),
        }
    }
}

/// Point-in-time copy of a [`JobEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub event_id: String,
    /// When the pending start trigger fires, if one is still armed.
    pub start_at: Option<DateTime<Utc>>,
    pub stop_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Registry {
    pub(crate) fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs
            .values()
            .map(JobEntry::snapshot)
            .sorted_by(|a, b| a.event_id.cmp(&b.event_id))
            .collect()
    }

    /// Attach a freshly spawned process to its entry. Returns `false` when the
    /// entry is gone.
    pub(crate) fn attach_process(&mut self, event_id: &str, process: ProcessHandle) -> bool {
        match self.jobs.get_mut(event_id) {
            Some(job) => {
                if let Some(old) = job.process.replace(process) {
                    warn!(
                        "event {event_id} already had backend pid {}, now tracking pid {}",
                        old.pid, process.pid
                    );
                }
                true
            }
            None => false,
        }
    }
}

//! Job lifecycle - schedule, start and stop actions
//!
//! All three run on the registry actor. Failures past the scheduling call
//! are logged here and never propagate.

use super::{JobCommand, JobEntry, Registry};
use crate::error::ScheduleError;
use crate::port::port_owner;
use crate::trigger::TriggerHandle;
use chrono::{DateTime, Utc};

impl Registry {
    pub(crate) fn schedule(
        &mut self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let now = Utc::now();
        if let Some(previous) = self.jobs.get(event_id) {
            // old triggers stay armed and still act on this event id
            warn!(
                "event {event_id} is already scheduled (stop at {}, pid {}); replacing its entry, \
                 previous triggers remain armed",
                previous.stop_trigger.fire_at(),
                previous
                    .process
                    .map(|p| p.pid.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
        }

        // a lead time reaching past chrono's range puts the start in the past
        let start_at = start
            .checked_sub_signed(self.config.lead_time)
            .filter(|at| *at > now);
        let start_trigger = match start_at {
            None => {
                info!("event {event_id} window opens at {start}; starting backend now");
                None
            }
            Some(at) => {
                let cmd = JobCommand::Start {
                    event_id: event_id.to_string(),
                };
                Some(self.arm(event_id, "start", at, cmd)?)
            }
        };
        let cmd = JobCommand::Stop {
            event_id: event_id.to_string(),
            reply: None,
        };
        let stop_trigger = match self.arm(event_id, "stop", end, cmd) {
            Ok(trigger) => trigger,
            Err(e) => {
                if let Some(trigger) = &start_trigger {
                    trigger.disarm();
                }
                return Err(e);
            }
        };

        let start_now = start_trigger.is_none();
        if let Some(trigger) = &start_trigger {
            info!("event {event_id}: backend starts at {}", trigger.fire_at());
        }
        info!("event {event_id}: backend stops at {}", stop_trigger.fire_at());
        self.jobs.insert(
            event_id.to_string(),
            JobEntry {
                event_id: event_id.to_string(),
                start_trigger,
                stop_trigger,
                process: None,
            },
        );

        if start_now {
            self.start_process(event_id);
        }
        Ok(())
    }

    fn arm(
        &self,
        event_id: &str,
        kind: &'static str,
        at: DateTime<Utc>,
        cmd: JobCommand,
    ) -> Result<TriggerHandle, ScheduleError> {
        self.collaborators
            .trigger
            .arm(at, self.config.timezone, Box::new(self.post(cmd)))
            .map_err(|e| ScheduleError::TriggerArm {
                event_id: event_id.to_string(),
                kind,
                at: e.at,
                reason: e.reason,
            })
    }

    /// Launch the backend for `event_id` unless the target port is taken.
    pub(crate) fn start_process(&mut self, event_id: &str) {
        if !self.jobs.contains_key(event_id) {
            warn!("start fired for event {event_id} but it is no longer registered; not launching");
            return;
        }
        let port = self.config.backend_port;
        if !self.collaborators.probe.is_available(port) {
            let owner = port_owner(port)
                .map(|o| format!(" by {o}"))
                .unwrap_or_default();
            warn!("port {port} is already in use{owner}; not starting backend for event {event_id}");
            return;
        }
        match self.collaborators.launcher.launch(event_id, port) {
            Ok(process) => {
                if !self.attach_process(event_id, process) {
                    warn!(
                        "no job entry for event {event_id} to attach pid {}",
                        process.pid
                    );
                }
            }
            Err(e) => error!("failed to start backend for event {event_id}: {e}"),
        }
    }

    /// Terminate the backend (if any), disarm both triggers and drop the
    /// entry. Returns whether the event was registered.
    pub(crate) fn stop_process(&mut self, event_id: &str) -> bool {
        let Some(job) = self.jobs.remove(event_id) else {
            debug!("stop for event {event_id}: not registered, nothing to do");
            return false;
        };

        match job.process {
            Some(process) => {
                let pid = process.pid;
                let signal = self.config.stop_signal;
                info!("stopping backend for event {event_id} (pid {pid}) with {signal}");
                let termination = self.collaborators.terminator.terminate_tree(pid, signal);
                let event_id = event_id.to_string();
                self.terminations.spawn(async move {
                    match termination.await {
                        Ok(()) => info!("sent {signal} to backend tree of event {event_id} (pid {pid})"),
                        Err(e) => error!("failed to stop backend for event {event_id}: {e}"),
                    }
                });
            }
            None => warn!("event {event_id} has no running backend; nothing to terminate"),
        }

        if let Some(trigger) = &job.start_trigger {
            trigger.disarm();
        }
        job.stop_trigger.disarm();
        info!("event {event_id} removed from registry");
        true
    }
}

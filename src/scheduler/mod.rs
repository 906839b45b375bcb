//! Scheduler - owner of the job registry
//!
//! The registry is a single actor task. Callers and trigger callbacks talk to
//! it through [`JobCommand`] messages, so every mutation of the job map is
//! serialized without a lock.
//!
//! - `state`: job entries and read-only snapshots
//! - `lifecycle`: schedule / start / stop actions

mod lifecycle;
mod state;

pub use state::{JobEntry, JobSnapshot};

use crate::error::{LaunchError, ScheduleError};
use crate::launcher::{CommandLauncher, Launcher};
use crate::port::{PortProbe, TcpPortProbe};
use crate::settings::Settings;
use crate::terminate::{SignalTerminator, TermSignal, Terminator};
use crate::trigger::{CalendarTrigger, Trigger};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

/// Knobs the registry needs from configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub backend_port: u16,
    pub timezone: Tz,
    pub lead_time: TimeDelta,
    pub stop_signal: TermSignal,
}

impl From<&Settings> for SchedulerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            backend_port: settings.backend.port,
            timezone: settings.schedule.timezone,
            lead_time: settings.schedule.lead_time,
            stop_signal: settings.backend.stop_signal,
        }
    }
}

/// The side-effecting pieces the registry drives.
#[derive(Clone)]
pub struct Collaborators {
    pub trigger: Arc<dyn Trigger>,
    pub probe: Arc<dyn PortProbe>,
    pub launcher: Arc<dyn Launcher>,
    pub terminator: Arc<dyn Terminator>,
}

impl Collaborators {
    /// Production wiring: cron-backed triggers, a TCP bind probe, the
    /// configured backend command and signal-based termination.
    pub fn from_settings(settings: &Settings) -> Result<Self, LaunchError> {
        Ok(Self {
            trigger: Arc::new(CalendarTrigger::default()),
            probe: Arc::new(TcpPortProbe),
            launcher: Arc::new(CommandLauncher::from_settings(settings)?),
            terminator: Arc::new(SignalTerminator),
        })
    }
}

pub(crate) enum JobCommand {
    Schedule {
        event_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reply: oneshot::Sender<Result<(), ScheduleError>>,
    },
    Start {
        event_id: String,
    },
    Stop {
        event_id: String,
        reply: Option<oneshot::Sender<bool>>,
    },
    Jobs {
        reply: oneshot::Sender<Vec<JobSnapshot>>,
    },
}

/// Cloneable handle to the registry actor. The actor exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<JobCommand>,
}

pub(crate) struct Registry {
    pub(crate) jobs: HashMap<String, JobEntry>,
    pub(crate) config: SchedulerConfig,
    pub(crate) collaborators: Collaborators,
    /// Lets trigger callbacks post back without keeping the actor alive.
    pub(crate) mailbox: mpsc::WeakUnboundedSender<JobCommand>,
    /// In-flight termination attempts, drained before the actor exits.
    pub(crate) terminations: JoinSet<()>,
}

impl Scheduler {
    pub fn spawn(config: SchedulerConfig, collaborators: Collaborators) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Registry {
            jobs: HashMap::new(),
            config,
            collaborators,
            mailbox: tx.downgrade(),
            terminations: JoinSet::new(),
        };
        let task = tokio::spawn(registry.run(rx));
        (Self { tx }, task)
    }

    /// Register the window for `event_id`. Resolves once the job is in the
    /// registry; when the window is already open (or about to be), the start
    /// action has been attempted by then too.
    pub async fn schedule_job(
        &self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let (reply, rx) = oneshot::channel();
        self.send(JobCommand::Schedule {
            event_id: event_id.to_string(),
            start,
            end,
            reply,
        })?;
        rx.await.map_err(|_| ScheduleError::RegistryClosed)?
    }

    /// Run the stop action now, as if the stop trigger had fired. Returns
    /// whether a job was registered for `event_id`.
    pub async fn stop_job(&self, event_id: &str) -> Result<bool, ScheduleError> {
        let (reply, rx) = oneshot::channel();
        self.send(JobCommand::Stop {
            event_id: event_id.to_string(),
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| ScheduleError::RegistryClosed)
    }

    /// Snapshot of every registered job, ordered by event id.
    pub async fn jobs(&self) -> Result<Vec<JobSnapshot>, ScheduleError> {
        let (reply, rx) = oneshot::channel();
        self.send(JobCommand::Jobs { reply })?;
        rx.await.map_err(|_| ScheduleError::RegistryClosed)
    }

    fn send(&self, cmd: JobCommand) -> Result<(), ScheduleError> {
        self.tx.send(cmd).map_err(|_| ScheduleError::RegistryClosed)
    }
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<JobCommand>) {
        debug!("job registry started");
        loop {
            let cmd = select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
                Some(_) = self.terminations.join_next(), if !self.terminations.is_empty() => continue,
            };
            self.handle(cmd);
        }
        while self.terminations.join_next().await.is_some() {}
        let running = self
            .jobs
            .values()
            .filter(|job| job.process.is_some())
            .count();
        if running > 0 {
            warn!("job registry shutting down with {running} backend(s) left running unmanaged");
        }
        debug!("job registry stopped");
    }

    fn handle(&mut self, cmd: JobCommand) {
        match cmd {
            JobCommand::Schedule {
                event_id,
                start,
                end,
                reply,
            } => {
                let result = self.schedule(&event_id, start, end);
                if let Err(e) = &result {
                    error!("failed to schedule event {event_id}: {e}");
                }
                let _ = reply.send(result);
            }
            JobCommand::Start { event_id } => self.start_process(&event_id),
            JobCommand::Stop { event_id, reply } => {
                let existed = self.stop_process(&event_id);
                if let Some(reply) = reply {
                    let _ = reply.send(existed);
                }
            }
            JobCommand::Jobs { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Post a command to ourselves from a trigger callback.
    pub(crate) fn post(&self, cmd: JobCommand) -> impl FnOnce() + Send + 'static {
        let mailbox = self.mailbox.clone();
        move || match mailbox.upgrade() {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    debug!("job registry gone, dropping trigger action");
                }
            }
            None => debug!("job registry gone, dropping trigger action"),
        }
    }
}

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use event_warden::error::{LaunchError, TerminateError, TriggerError};
use event_warden::launcher::{Launcher, ProcessHandle};
use event_warden::port::PortProbe;
use event_warden::scheduler::{Collaborators, Scheduler, SchedulerConfig};
use event_warden::terminate::{BoxFuture, TermSignal, Terminator};
use event_warden::trigger::{Callback, Trigger, TriggerHandle};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const BACKEND_PORT: u16 = 3999;

pub fn config() -> SchedulerConfig {
    SchedulerConfig {
        backend_port: BACKEND_PORT,
        timezone: chrono_tz::Asia::Beirut,
        lead_time: chrono::Duration::minutes(5),
        stop_signal: TermSignal::Interrupt,
    }
}

/// A trigger that never fires on its own; tests fire it explicitly.
pub struct ArmedTrigger {
    pub at: DateTime<Utc>,
    pub tz: Tz,
    pub armed: Arc<AtomicBool>,
    callback: Option<Callback>,
}

#[derive(Default)]
pub struct FakeTrigger {
    armed: Mutex<Vec<ArmedTrigger>>,
    fail: AtomicBool,
}

impl FakeTrigger {
    pub fn fail_next_arms(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Fire times of every trigger ever armed, with whether it is still armed.
    pub fn armed(&self) -> Vec<(DateTime<Utc>, bool)> {
        self.armed
            .lock()
            .unwrap()
            .iter()
            .map(|t| (t.at, t.armed.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn armed_count(&self) -> usize {
        self.armed().iter().filter(|(_, armed)| *armed).count()
    }

    /// Fire the trigger armed for `at`, honoring disarm. Returns whether the
    /// callback ran.
    pub fn fire(&self, at: DateTime<Utc>) -> bool {
        let callback = {
            let mut armed = self.armed.lock().unwrap();
            let trigger = armed
                .iter_mut()
                .find(|t| t.at == at && t.armed.load(Ordering::SeqCst))
                .unwrap_or_else(|| panic!("no armed trigger at {at}"));
            trigger.armed.store(false, Ordering::SeqCst);
            trigger.callback.take()
        };
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    /// Take the callback of the first trigger at `at` without disarming it,
    /// as if it fired at the same moment something else disarmed it.
    pub fn take_callback(&self, at: DateTime<Utc>) -> Callback {
        let mut armed = self.armed.lock().unwrap();
        armed
            .iter_mut()
            .find(|t| t.at == at && t.callback.is_some())
            .and_then(|t| t.callback.take())
            .unwrap_or_else(|| panic!("no callback at {at}"))
    }
}

impl Trigger for FakeTrigger {
    fn arm(
        &self,
        at: DateTime<Utc>,
        tz: Tz,
        callback: Callback,
    ) -> Result<TriggerHandle, TriggerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TriggerError {
                at: at.to_rfc3339(),
                reason: "refused by test".to_string(),
            });
        }
        let armed = Arc::new(AtomicBool::new(true));
        self.armed.lock().unwrap().push(ArmedTrigger {
            at,
            tz,
            armed: armed.clone(),
            callback: Some(callback),
        });
        Ok(TriggerHandle::new(at.with_timezone(&tz), armed, None))
    }
}

#[derive(Default)]
pub struct FakeProbe {
    busy: AtomicBool,
}

impl FakeProbe {
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

impl PortProbe for FakeProbe {
    fn is_available(&self, _port: u16) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    launches: Mutex<Vec<(String, u16)>>,
    next_pid: AtomicU32,
    fail: AtomicBool,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            launches: Mutex::new(vec![]),
            next_pid: AtomicU32::new(1000),
            fail: AtomicBool::new(false),
        }
    }
}

impl FakeLauncher {
    pub fn launches(&self) -> Vec<(String, u16)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, event_id: &str, port: u16) -> Result<ProcessHandle, LaunchError> {
        self.launches
            .lock()
            .unwrap()
            .push((event_id.to_string(), port));
        if self.fail.load(Ordering::SeqCst) {
            return Err(LaunchError::Spawn {
                event_id: event_id.to_string(),
                program: "fake".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }
        Ok(ProcessHandle {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            started_at: Utc::now(),
        })
    }
}

#[derive(Default)]
pub struct FakeTerminator {
    calls: Mutex<Vec<(u32, TermSignal)>>,
    fail: AtomicBool,
}

impl FakeTerminator {
    pub fn calls(&self) -> Vec<(u32, TermSignal)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Terminator for FakeTerminator {
    fn terminate_tree(
        &self,
        pid: u32,
        signal: TermSignal,
    ) -> BoxFuture<Result<(), TerminateError>> {
        self.calls.lock().unwrap().push((pid, signal));
        let fail = self.fail.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                Err(TerminateError::Signal {
                    pid,
                    signal: signal.to_string(),
                    reason: "EPERM".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }
}

/// A scheduler wired to in-memory fakes.
pub struct Harness {
    pub scheduler: Scheduler,
    pub registry: tokio::task::JoinHandle<()>,
    pub trigger: Arc<FakeTrigger>,
    pub probe: Arc<FakeProbe>,
    pub launcher: Arc<FakeLauncher>,
    pub terminator: Arc<FakeTerminator>,
}

impl Harness {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let trigger = Arc::new(FakeTrigger::default());
        let probe = Arc::new(FakeProbe::default());
        let launcher = Arc::new(FakeLauncher::default());
        let terminator = Arc::new(FakeTerminator::default());
        let (scheduler, registry) = Scheduler::spawn(
            config(),
            Collaborators {
                trigger: trigger.clone(),
                probe: probe.clone(),
                launcher: launcher.clone(),
                terminator: terminator.clone(),
            },
        );
        Self {
            scheduler,
            registry,
            trigger,
            probe,
            launcher,
            terminator,
        }
    }

    /// Wait until every command posted so far has been processed.
    pub async fn settle(&self) {
        self.scheduler.jobs().await.unwrap();
    }
}

/// Now, truncated to whole seconds so fire times compare exactly.
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
}

pub fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

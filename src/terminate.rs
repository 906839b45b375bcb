//! Graceful termination of a backend process and everything it spawned.

use crate::error::TerminateError;
#[cfg(not(unix))]
use crate::procs::PROCS;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Signal used to ask a process tree to shut down.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIs,
)]
#[strum(ascii_case_insensitive)]
pub enum TermSignal {
    #[default]
    #[strum(to_string = "SIGINT", serialize = "INT", serialize = "interrupt")]
    Interrupt,
    #[strum(to_string = "SIGTERM", serialize = "TERM", serialize = "terminate")]
    Terminate,
}

#[cfg(unix)]
impl From<TermSignal> for nix::sys::signal::Signal {
    fn from(signal: TermSignal) -> Self {
        match signal {
            TermSignal::Interrupt => nix::sys::signal::Signal::SIGINT,
            TermSignal::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

/// Sends a stop signal to a process tree. The returned future resolves once
/// the signal was delivered (or found to be unnecessary); it does not wait
/// for the processes to exit. One attempt only.
pub trait Terminator: Send + Sync {
    fn terminate_tree(
        &self,
        pid: u32,
        signal: TermSignal,
    ) -> BoxFuture<Result<(), TerminateError>>;
}

/// Signals descendants and the process group of the root pid.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl Terminator for SignalTerminator {
    fn terminate_tree(
        &self,
        pid: u32,
        signal: TermSignal,
    ) -> BoxFuture<Result<(), TerminateError>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || signal_tree(pid, signal))
                .await
                .map_err(|_| TerminateError::TaskFailed { pid })?
        })
    }
}

#[cfg(unix)]
fn signal_tree(pid: u32, signal: TermSignal) -> Result<(), TerminateError> {
    use crate::procs::PROCS;
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::{Pid, getpgid};

    let sig: nix::sys::signal::Signal = signal.into();
    let root = Pid::from_raw(pid as i32);

    PROCS.refresh_processes();
    let name = PROCS.title(pid).unwrap_or_else(|| "exited".to_string());
    // Members of the root's group get the group signal below; only
    // descendants that moved to another group are signalled one by one.
    for child in PROCS.descendants(pid) {
        let child = Pid::from_raw(child as i32);
        if getpgid(Some(child)).is_ok_and(|pgid| pgid == root) {
            continue;
        }
        debug!("sending {signal} to descendant pid {child} of {pid}");
        match kill(child, sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("failed to send {signal} to descendant pid {child}: {e}"),
        }
    }

    // The launcher makes every backend lead its own group, and the group
    // outlives its leader: after the root exits, orphans are only reachable
    // through it.
    debug!("sending {signal} to process group {pid} ({name})");
    let result = match killpg(root, sig) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH | Errno::EPERM) => {
            debug!("no signalable process group {pid}, sending {signal} to pid {pid}");
            kill(root, sig)
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("pid {pid} and its group already exited");
            Ok(())
        }
        Err(e) => Err(TerminateError::Signal {
            pid,
            signal: signal.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn signal_tree(pid: u32, signal: TermSignal) -> Result<(), TerminateError> {
    PROCS.refresh_processes();
    for child in PROCS.descendants(pid) {
        debug!("killing descendant pid {child} of {pid}");
        PROCS.kill(child);
    }
    if PROCS.is_running(pid) && !PROCS.kill(pid) {
        return Err(TerminateError::Signal {
            pid,
            signal: signal.to_string(),
            reason: "process refused to terminate".to_string(),
        });
    }
    Ok(())
}

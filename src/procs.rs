use once_cell::sync::Lazy;
use std::sync::Mutex;
use sysinfo::{ProcessStatus, ProcessesToUpdate};

/// Shared view of the host process table.
pub struct Procs {
    system: Mutex<sysinfo::System>,
}

pub static PROCS: Lazy<Procs> = Lazy::new(Procs::new);

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        let procs = Self {
            system: Mutex::new(sysinfo::System::new()),
        };
        procs.refresh_processes();
        procs
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn title(&self, pid: u32) -> Option<String> {
        self.lock_system()
            .process(sysinfo::Pid::from_u32(pid))
            .map(|p| p.name().to_string_lossy().to_string())
    }

    /// Zombies count as gone: they hold no resources beyond their table slot.
    pub fn is_running(&self, pid: u32) -> bool {
        self.lock_system()
            .process(sysinfo::Pid::from_u32(pid))
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    /// All descendants of `pid`, deepest first, so they can be signalled
    /// ahead of their parents.
    pub fn descendants(&self, pid: u32) -> Vec<u32> {
        let system = self.lock_system();
        let root = sysinfo::Pid::from_u32(pid);
        let mut found: Vec<(usize, u32)> = vec![];
        for (child_pid, process) in system.processes() {
            let mut depth = 0;
            let mut process = process;
            while let Some(parent) = process.parent() {
                depth += 1;
                if parent == root {
                    found.push((depth, child_pid.as_u32()));
                    break;
                }
                match system.process(parent) {
                    Some(p) => process = p,
                    None => break,
                }
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, pid)| pid).collect()
    }

    #[cfg(not(unix))]
    pub(crate) fn kill(&self, pid: u32) -> bool {
        match self.lock_system().process(sysinfo::Pid::from_u32(pid)) {
            Some(process) => {
                debug!("killing process {pid}");
                process.kill()
            }
            None => false,
        }
    }

    pub fn refresh_processes(&self) {
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::All, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_running() {
        let procs = Procs::new();
        assert!(procs.is_running(std::process::id()));
        assert!(procs.title(std::process::id()).is_some());
    }

    #[test]
    fn test_descendants_of_unknown_pid_is_empty() {
        let procs = Procs::new();
        assert!(procs.descendants(u32::MAX - 1).is_empty());
    }
}

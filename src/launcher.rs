//! Spawning the per-event backend process.

use crate::error::LaunchError;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Child;
use tokio::select;

/// A spawned backend, tracked by pid only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

pub trait Launcher: Send + Sync {
    /// Start the backend for `event_id` bound to `port`. Returns as soon as
    /// the process exists; readiness is not awaited.
    fn launch(&self, event_id: &str, port: u16) -> Result<ProcessHandle, LaunchError>;
}

/// Runs the configured backend command line.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    event_id_var: String,
    port_var: String,
    log_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(command: &str) -> Result<Self, LaunchError> {
        let mut argv = shell_words::split(command).map_err(|e| LaunchError::InvalidCommand {
            reason: e.to_string(),
        })?;
        if argv.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        let program = argv.remove(0);
        Ok(Self {
            program,
            args: argv,
            event_id_var: "EVENT_ID".to_string(),
            port_var: "PORT".to_string(),
            log_dir: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, LaunchError> {
        let mut launcher = Self::new(&settings.backend.command)?
            .with_env_names(&settings.backend.event_id_var, &settings.backend.port_var);
        if settings.logs.capture_output {
            launcher = launcher.with_log_dir(settings.logs.dir.clone());
        }
        Ok(launcher)
    }

    pub fn with_env_names(mut self, event_id_var: &str, port_var: &str) -> Self {
        self.event_id_var = event_id_var.to_string();
        self.port_var = port_var.to_string();
        self
    }

    /// Append each line of backend output to `<dir>/<event id>.log`.
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, event_id: &str, port: u16) -> Result<ProcessHandle, LaunchError> {
        info!(
            "launching backend for event {event_id} on port {port}: {} {}",
            self.program,
            shell_words::join(&self.args)
        );
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .env(&self.event_id_var, event_id)
            .env(&self.port_var, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // own process group: no terminal signals from us, and the whole tree
        // can be signalled through the group later
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            event_id: event_id.to_string(),
            program: self.program.clone(),
            source,
        })?;
        let Some(pid) = child.id() else {
            return Err(LaunchError::ExitedImmediately {
                event_id: event_id.to_string(),
            });
        };
        info!("started backend for event {event_id} with pid {pid}");

        let log_path = self
            .log_dir
            .as_ref()
            .map(|dir| dir.join(log_file_name(event_id)));
        tokio::spawn(observe(event_id.to_string(), child, log_path));

        Ok(ProcessHandle {
            pid,
            started_at: Utc::now(),
        })
    }
}

/// File name for an event's captured output. Anything outside
/// `[A-Za-z0-9_-]` is percent-encoded so the id can never leave the log dir.
fn log_file_name(event_id: &str) -> String {
    let mut name = String::with_capacity(event_id.len() + 4);
    for byte in event_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name.push_str(".log");
    name
}

/// Forwards the child's output to the log (and optionally a file) and reaps
/// it when it exits. Purely diagnostic.
async fn observe(event_id: String, mut child: Child, log_path: Option<PathBuf>) {
    let pid = child.id().unwrap_or(0);
    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => (out, err),
        _ => {
            error!("failed to capture output for event {event_id}");
            return;
        }
    };
    let mut stdout = BufReader::new(stdout).lines();
    let mut stderr = BufReader::new(stderr).lines();

    let mut log_file = match &log_path {
        Some(path) => match open_log(path).await {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                warn!("could not open {} for event {event_id}: {e}", path.display());
                None
            }
        },
        None => None,
    };

    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut exited = false;
    while stdout_open || stderr_open || !exited {
        let (stream, line) = select! {
            line = stdout.next_line(), if stdout_open => match line {
                Ok(Some(line)) => ("stdout", line),
                _ => {
                    stdout_open = false;
                    continue;
                }
            },
            line = stderr.next_line(), if stderr_open => match line {
                Ok(Some(line)) => ("stderr", line),
                _ => {
                    stderr_open = false;
                    continue;
                }
            },
            status = child.wait(), if !exited => {
                exited = true;
                match status {
                    Ok(status) => info!("backend for event {event_id} (pid {pid}) exited with {status}"),
                    Err(e) => warn!("failed waiting on backend for event {event_id} (pid {pid}): {e}"),
                }
                continue;
            }
        };
        debug!(target: "event_warden::output", "{event_id} {stream}: {line}");
        if let Some(file) = &mut log_file {
            let formatted = format!(
                "{} {event_id} {line}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            if let Err(e) = file.write_all(formatted.as_bytes()).await {
                warn!("failed to write log for event {event_id}: {e}");
                log_file = None;
            } else {
                let _ = file.flush().await;
            }
        }
    }
}

async fn open_log(path: &std::path::Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::File::options()
        .append(true)
        .create(true)
        .open(path)
        .await
}

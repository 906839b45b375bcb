//! Diagnostic error types for the orchestrator.
//!
//! Only scheduling-boundary failures travel upward as errors. Launch and
//! termination failures are created here so they carry codes and help text,
//! but the scheduler logs them where they happen instead of propagating.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by `Scheduler::schedule_job` and friends.
#[derive(Debug, Error, Diagnostic)]
pub enum ScheduleError {
    #[error("could not arm {kind} trigger for event '{event_id}' at {at}: {reason}")]
    #[diagnostic(
        code(warden::schedule::trigger_arm),
        help("the fire time must be representable in the configured timezone")
    )]
    TriggerArm {
        event_id: String,
        kind: &'static str,
        at: String,
        reason: String,
    },

    #[error("job registry is no longer running")]
    #[diagnostic(
        code(warden::schedule::registry_closed),
        help("the scheduler task has exited; restart the orchestrator")
    )]
    RegistryClosed,
}

/// A trigger could not be armed for the requested point in time.
#[derive(Debug, Error, Diagnostic)]
#[error("cannot arm trigger for {at}: {reason}")]
#[diagnostic(code(warden::trigger::arm))]
pub struct TriggerError {
    pub at: String,
    pub reason: String,
}

/// Errors from launching the backend process for an event.
#[derive(Debug, Error, Diagnostic)]
pub enum LaunchError {
    #[error("no backend command configured")]
    #[diagnostic(
        code(warden::launch::empty_command),
        help("set [backend].command in the config file or WARDEN_BACKEND_COMMAND")
    )]
    EmptyCommand,

    #[error("backend command could not be parsed: {reason}")]
    #[diagnostic(code(warden::launch::invalid_command))]
    InvalidCommand { reason: String },

    #[error("failed to spawn '{program}' for event '{event_id}'")]
    #[diagnostic(code(warden::launch::spawn_failed))]
    Spawn {
        event_id: String,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process for event '{event_id}' exited before its pid could be captured")]
    #[diagnostic(code(warden::launch::exited_immediately))]
    ExitedImmediately { event_id: String },
}

/// Errors from delivering the stop signal to a process tree.
#[derive(Debug, Error, Diagnostic)]
pub enum TerminateError {
    #[error("failed to send {signal} to pid {pid}: {reason}")]
    #[diagnostic(
        code(warden::terminate::signal_failed),
        help("the process may belong to another user or require manual intervention")
    )]
    Signal {
        pid: u32,
        signal: String,
        reason: String,
    },

    #[error("termination task for pid {pid} did not complete")]
    #[diagnostic(code(warden::terminate::task_failed))]
    TaskFailed { pid: u32 },
}

/// A rejected scheduling request, with every problem found.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid scheduling request: {}", reasons.join("; "))]
#[diagnostic(code(warden::validate::invalid_request))]
pub struct ValidationError {
    pub reasons: Vec<String>,
}

/// Errors related to loading configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {}", path.display())]
    #[diagnostic(code(warden::config::read_error))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file: {}", path.display())]
    #[diagnostic(
        code(warden::config::parse_error),
        help("check TOML syntax at https://toml.io")
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown timezone '{name}'")]
    #[diagnostic(
        code(warden::config::timezone),
        help("use an IANA timezone name such as 'Asia/Beirut' or 'UTC'")
    )]
    InvalidTimezone { name: String },

    #[error("invalid duration for {key}: '{value}'")]
    #[diagnostic(
        code(warden::config::duration),
        help("use a humantime duration of at most 100 years, such as '5m', '24h' or '30days'")
    )]
    InvalidDuration { key: &'static str, value: String },

    #[error("invalid value for {key}: '{value}'")]
    #[diagnostic(code(warden::config::invalid_value))]
    InvalidValue { key: &'static str, value: String },
}

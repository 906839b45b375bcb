//! User-configurable settings for warden.
//!
//! Settings are resolved in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. The config file (`$WARDEN_CONFIG`, default `~/.config/warden/config.toml`)
//! 3. Built-in defaults (lowest priority)
//!
//! Example config file:
//! ```toml
//! [backend]
//! command = "docker compose -f stream.yml up"
//! port = 3000
//!
//! [schedule]
//! timezone = "Asia/Beirut"
//! lead_time = "5m"
//!
//! [web]
//! bind = "0.0.0.0"
//! port = 8080
//! ```

use crate::Result;
use crate::env;
use crate::error::ConfigError;
use crate::terminate::TermSignal;
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BACKEND_PORT: u16 = 3000;
pub const DEFAULT_TIMEZONE: &str = "Asia/Beirut";
pub const DEFAULT_LEAD_TIME: &str = "5m";
pub const DEFAULT_HORIZON: &str = "30days";
pub const DEFAULT_MAX_LOOKBACK: &str = "24h";
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Upper bound for any schedule duration (100 years).
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub schedule: ScheduleSettings,
    pub web: WebSettings,
    pub logs: LogSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Command line of the managed backend, split with shell quoting rules.
    pub command: String,
    pub port: u16,
    /// Name of the env var carrying the event id into the child.
    pub event_id_var: String,
    /// Name of the env var carrying the target port into the child.
    pub port_var: String,
    pub stop_signal: TermSignal,
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub timezone: Tz,
    /// How long before the window opens the backend is started.
    pub lead_time: TimeDelta,
    /// Furthest a window may start in the future.
    pub horizon: TimeDelta,
    /// Furthest a window may have started in the past.
    pub max_lookback: TimeDelta,
}

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// Append each backend's stdout/stderr to `<dir>/<event id>.log`.
    pub capture_output: bool,
}

/// On-disk shape of the config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    backend: BackendFile,
    schedule: ScheduleFile,
    web: WebFile,
    logs: LogsFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BackendFile {
    command: Option<String>,
    port: Option<u16>,
    event_id_var: Option<String>,
    port_var: Option<String>,
    stop_signal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ScheduleFile {
    timezone: Option<String>,
    lead_time: Option<String>,
    horizon: Option<String>,
    max_lookback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WebFile {
    bind: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogsFile {
    dir: Option<PathBuf>,
    capture_output: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings {
                command: String::new(),
                port: DEFAULT_BACKEND_PORT,
                event_id_var: "EVENT_ID".to_string(),
                port_var: "PORT".to_string(),
                stop_signal: TermSignal::Interrupt,
            },
            schedule: ScheduleSettings {
                timezone: chrono_tz::Asia::Beirut,
                lead_time: TimeDelta::minutes(5),
                horizon: TimeDelta::days(30),
                max_lookback: TimeDelta::hours(24),
            },
            web: WebSettings {
                bind: "127.0.0.1".to_string(),
                port: DEFAULT_WEB_PORT,
            },
            logs: LogSettings {
                dir: env::WARDEN_LOGS_DIR.clone(),
                capture_output: true,
            },
        }
    }
}

impl Settings {
    /// Load from the default config file location plus the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&env::WARDEN_CONFIG_FILE, |key| env::var_string(key))
    }

    /// Load from `path` (skipped if it does not exist), resolving env overrides
    /// through `lookup`.
    pub fn load_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = if path.exists() {
            debug!("loading settings from {}", path.display());
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            trace!("no config file at {}, using defaults", path.display());
            SettingsFile::default()
        };
        Ok(Self::resolve(file, lookup)?)
    }

    /// Parse settings from a TOML string with no env overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self::resolve(file, |_| None)?)
    }

    fn resolve(
        file: SettingsFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        let pick = |key: &str, from_file: Option<String>| lookup(key).or(from_file);

        let backend_port = match lookup("WARDEN_BACKEND_PORT") {
            Some(v) => parse_port("backend.port", &v)?,
            None => file.backend.port.unwrap_or(defaults.backend.port),
        };
        let stop_signal = match pick("WARDEN_STOP_SIGNAL", file.backend.stop_signal) {
            Some(v) => TermSignal::from_str(&v).map_err(|_| ConfigError::InvalidValue {
                key: "backend.stop_signal",
                value: v,
            })?,
            None => defaults.backend.stop_signal,
        };
        let timezone = match pick("WARDEN_TIMEZONE", file.schedule.timezone) {
            Some(name) => parse_timezone(&name)?,
            None => defaults.schedule.timezone,
        };
        let web_port = match lookup("WARDEN_WEB_PORT") {
            Some(v) => parse_port("web.port", &v)?,
            None => file.web.port.unwrap_or(defaults.web.port),
        };
        let capture_output = match lookup("WARDEN_CAPTURE_OUTPUT") {
            Some(v) => !matches!(v.to_lowercase().as_str(), "false" | "0"),
            None => file
                .logs
                .capture_output
                .unwrap_or(defaults.logs.capture_output),
        };

        Ok(Self {
            backend: BackendSettings {
                command: pick("WARDEN_BACKEND_COMMAND", file.backend.command)
                    .unwrap_or(defaults.backend.command),
                port: backend_port,
                event_id_var: pick("WARDEN_EVENT_ID_VAR", file.backend.event_id_var)
                    .unwrap_or(defaults.backend.event_id_var),
                port_var: pick("WARDEN_PORT_VAR", file.backend.port_var)
                    .unwrap_or(defaults.backend.port_var),
                stop_signal,
            },
            schedule: ScheduleSettings {
                timezone,
                lead_time: duration_or(
                    "schedule.lead_time",
                    pick("WARDEN_LEAD_TIME", file.schedule.lead_time),
                    defaults.schedule.lead_time,
                )?,
                horizon: duration_or(
                    "schedule.horizon",
                    pick("WARDEN_HORIZON", file.schedule.horizon),
                    defaults.schedule.horizon,
                )?,
                max_lookback: duration_or(
                    "schedule.max_lookback",
                    pick("WARDEN_MAX_LOOKBACK", file.schedule.max_lookback),
                    defaults.schedule.max_lookback,
                )?,
            },
            web: WebSettings {
                bind: pick("WARDEN_WEB_BIND", file.web.bind).unwrap_or(defaults.web.bind),
                port: web_port,
            },
            logs: LogSettings {
                dir: lookup("WARDEN_LOGS_DIR")
                    .map(PathBuf::from)
                    .or(file.logs.dir)
                    .unwrap_or(defaults.logs.dir),
                capture_output,
            },
        })
    }
}

pub fn parse_timezone(name: &str) -> std::result::Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone {
            name: name.to_string(),
        })
}

fn parse_port(key: &'static str, value: &str) -> std::result::Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn duration_or(
    key: &'static str,
    value: Option<String>,
    default: TimeDelta,
) -> std::result::Result<TimeDelta, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let invalid = || ConfigError::InvalidDuration {
        key,
        value: value.clone(),
    };
    let parsed = humantime::parse_duration(value.trim()).map_err(|_| invalid())?;
    if parsed.as_secs() > MAX_DURATION_SECS {
        return Err(invalid());
    }
    TimeDelta::from_std(parsed).map_err(|_| invalid())
}

/// Render a schedule duration the way it is written in the config file.
pub fn format_duration(d: TimeDelta) -> String {
    match d.to_std() {
        Ok(d) => humantime::format_duration(d).to_string(),
        Err(_) => d.to_string(),
    }
}

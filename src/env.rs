use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;

pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir().unwrap_or_else(|| {
        eprintln!("Warning: Could not determine home directory");
        PathBuf::from("/tmp")
    })
});
pub static WARDEN_CONFIG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("WARDEN_CONFIG_DIR").unwrap_or(HOME_DIR.join(".config").join("warden"))
});
pub static WARDEN_CONFIG_FILE: Lazy<PathBuf> = Lazy::new(|| {
    var_path("WARDEN_CONFIG").unwrap_or(WARDEN_CONFIG_DIR.join("config.toml"))
});
pub static WARDEN_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("WARDEN_STATE_DIR").unwrap_or(
        dirs::state_dir()
            .unwrap_or(HOME_DIR.join(".local").join("state"))
            .join("warden"),
    )
});
pub static WARDEN_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("WARDEN_LOG").unwrap_or(log::LevelFilter::Info));
pub static WARDEN_LOG_FILE_LEVEL: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("WARDEN_LOG_FILE_LEVEL").unwrap_or(*WARDEN_LOG));
pub static WARDEN_LOGS_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("WARDEN_LOGS_DIR").unwrap_or(WARDEN_STATE_DIR.join("logs")));
pub static WARDEN_LOG_FILE: Lazy<PathBuf> = Lazy::new(|| WARDEN_LOGS_DIR.join("warden.log"));

pub(crate) fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

pub(crate) fn var_string(name: &str) -> Option<String> {
    var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}

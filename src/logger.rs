use crate::env;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

struct Logger {
    term_level: LevelFilter,
    file_level: LevelFilter,
    log_file: Option<Mutex<File>>,
}

static LOGGER: OnceCell<Logger> = OnceCell::new();

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.term_level
            || (self.log_file.is_some() && metadata.level() <= self.file_level)
    }

    fn log(&self, record: &Record) {
        if record.level() <= self.file_level
            && let Some(log_file) = &self.log_file
        {
            let mut file = log_file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = writeln!(
                file,
                "{} {} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
        }
        if record.level() <= self.term_level {
            eprintln!("{} {}", styled_level(record.level()), record.args());
        }
    }

    fn flush(&self) {
        if let Some(log_file) = &self.log_file {
            let _ = log_file.lock().unwrap_or_else(|e| e.into_inner()).flush();
        }
    }
}

fn styled_level(level: Level) -> String {
    let prefix = format!("warden {}", level.as_str().to_lowercase());
    match level {
        Level::Error => console::style(prefix).red().bold().for_stderr(),
        Level::Warn => console::style(prefix).yellow().for_stderr(),
        Level::Info => console::style(prefix).cyan().for_stderr(),
        Level::Debug => console::style(prefix).magenta().for_stderr(),
        Level::Trace => console::style(prefix).dim().for_stderr(),
    }
    .to_string()
}

fn open_log_file() -> Option<Mutex<File>> {
    let path = &*env::WARDEN_LOG_FILE;
    if let Some(parent) = path.parent()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("warden: could not create log dir {}: {err}", parent.display());
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(err) => {
            eprintln!("warden: could not open {}: {err}", path.display());
            None
        }
    }
}

pub fn init() {
    let logger = LOGGER.get_or_init(|| {
        let file_level = *env::WARDEN_LOG_FILE_LEVEL;
        let log_file = if file_level == LevelFilter::Off {
            None
        } else {
            open_log_file()
        };
        Logger {
            term_level: *env::WARDEN_LOG,
            file_level,
            log_file,
        }
    });
    if let Err(err) = log::set_logger(logger) {
        eprintln!("warden: logger already initialized: {err}");
        return;
    }
    log::set_max_level(logger.term_level.max(logger.file_level));
}

//! Process-wide logging for the satsuma workspace.
//!
//! The sink is installed once via [`init_logger`] and every crate logs
//! through the free function [`log`]. Messages are prefixed with the time
//! elapsed since the sink was created.

use std::{
    fs::File,
    io::{self, Write},
    sync::Mutex,
    time::Instant,
};

use chrono::Utc;
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Where log lines end up.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// Log to the console, the default choice.
    Stdout,

    /// Log to a file in `<temp-dir>/satsuma-<timestamp>.log`.
    File,
}

struct Sink {
    target: Box<dyn Write + Send>,
    started: Instant,
}

impl Sink {
    fn new(kind: LogKind) -> Self {
        let target: Box<dyn Write + Send> = match kind {
            LogKind::Stdout => Box::new(io::stdout()),
            LogKind::File => {
                let filename = format!("satsuma-{}.log", Utc::now().timestamp());
                let path = std::env::temp_dir().join(filename);
                Box::new(File::create(path).expect("cannot create log file"))
            }
        };

        Self {
            target,
            started: Instant::now(),
        }
    }

    fn log<T: std::fmt::Display>(&mut self, data: T) {
        let elapsed = self.started.elapsed();
        let seconds = elapsed.as_secs();
        let hours = seconds / 3600;
        let minutes = (seconds / 60) % 60;
        let seconds = seconds % 60;
        let milliseconds = elapsed.subsec_millis();

        writeln!(
            self.target,
            "[{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}] {data}"
        )
        .ok();
    }
}

struct Logger {
    sink: Mutex<Sink>,
}

impl Logger {
    fn new(kind: LogKind) -> Self {
        Self {
            sink: Mutex::new(Sink::new(kind)),
        }
    }

    fn log<T: std::fmt::Display>(&self, data: T) {
        if let Ok(mut sink) = self.sink.lock() {
            sink.log(data);
        }
    }
}

/// Installs the global sink. A second call is a no-op.
pub fn init_logger(kind: LogKind) {
    LOGGER.set(Logger::new(kind)).ok();
}

/// Writes one timestamped line to the installed sink.
///
/// Before [`init_logger`] has run this silently drops the message, so
/// library code can log unconditionally.
pub fn log<T: std::fmt::Display>(data: T) {
    if let Some(logger) = LOGGER.get() {
        logger.log(data);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{init_logger, log, LogKind};

    #[test]
    fn logs_to_file() {
        init_logger(LogKind::File);
        log("ok");

        let files = fs::read_dir(std::env::temp_dir()).unwrap();
        for f in files.flatten() {
            let path = f.path();
            let name = path.to_str().unwrap().to_string();
            if path.extension().is_some_and(|ext| ext == "log") && name.contains("satsuma") {
                let content = fs::read_to_string(&path).unwrap();
                fs::remove_file(&path).unwrap();
                assert_eq!(content, "[00:00:00.000] ok\n");
            }
        }
    }
}

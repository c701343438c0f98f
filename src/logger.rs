use std::io::Write;
use std::path::Path;
use std::time::Instant;

use log::{Log, Metadata, Record};
use parking_lot::Mutex;

struct XccLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: log::LevelFilter,
    start: Instant,
}

impl Log for XccLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        let line = format!(
            "[{elapsed:.3}s] [{}] {} - {}",
            record.level(),
            record.target(),
            record.args()
        );

        eprintln!("{line}");

        if let Some(ref file) = self.file {
            let _ = writeln!(file.lock(), "{line}");
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Initialize the global logger. Later calls are no-ops; the first
/// installed logger stays in place.
///
/// The level filter comes from `RUST_LOG` (default `warn`, so diagnostics
/// stay out of the way of the command output surface).
///
/// # Errors
///
/// Returns an IO error if `log_file` cannot be created.
pub fn init(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(log::LevelFilter::Warn);

    let file = match log_file {
        Some(path) => Some(Mutex::new(std::fs::File::create(path)?)),
        None => None,
    };

    let logger = XccLogger {
        file,
        filter,
        start: Instant::now(),
    };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(filter);
    }
    Ok(())
}

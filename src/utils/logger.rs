/*
 * Environment Logging
 *
 * Routes the `log` facade to the console, so library diagnostics (unknown
 * devices, bad open modes, and with the fd-debug feature every descriptor
 * lookup failure) show up next to the program's own output.
 *
 * Records are printed as "[LEVEL] message".
 */

use core::fmt::Write;

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use spin::Once;

use super::writer::Writer;
use crate::devices::Console;

/// Custom logger implementation for CluuLogger.
struct CluuLogger;

/// Where log records go once init() has run
static SINK: Once<&'static dyn Console> = Once::new();

impl log::Log for CluuLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Logs the record by printing it to the console.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = SINK.get() {
            let _ = writeln!(Writer::new(*console), "[{}] {}", record.level(), record.args());
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The CluuLogger instance used for logging.
static LOGGER: CluuLogger = CluuLogger;

/// Initializes the logger.
///
/// # Arguments
///
/// * `console` - Where records are written
/// * `level` - Most verbose level that gets printed
///
/// Fails if a logger was already installed in this environment.
pub fn init(console: &'static dyn Console, level: LevelFilter) -> Result<(), SetLoggerError> {
    SINK.call_once(|| console);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

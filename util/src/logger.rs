//! Logging setup
//!
//! Records go to stdout and to the session's log file, prefixed with the number of seconds since
//! the session started and a coloured level tag.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use fern::FormatCallback;
use log::{info, Level, Record};
use std::fmt::Arguments;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Targets logged at a lower verbosity than the rest of the executable.
///
/// The scripted collaborators report every band and planner call, which swamps `TRACE` sessions.
const TARGET_LEVELS: &[(&str, LevelFilter)] = &[("rsband_lib::sim", LevelFilter::Debug)];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The minimum log level must include INFO records, got `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Cannot open the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("Cannot install the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` must be `INFO` or more verbose. Only one logger can be installed per process, so
/// later calls fail with [`LoggerInitError::FernInitError`].
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file =
        fern::log_file(&session.log_file_path).map_err(LoggerInitError::LogFileInitError)?;

    TARGET_LEVELS
        .iter()
        .fold(
            fern::Dispatch::new().format(format_record).level(min_level),
            |dispatch, &(target, level)| dispatch.level_for(target, level),
        )
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Format a record, naming its target if it is more verbose than `INFO`.
fn format_record(out: FormatCallback, message: &Arguments, record: &Record) {
    let elapsed = session::get_elapsed_seconds();
    let tag = level_tag(record.level());

    match record.level() {
        Level::Debug | Level::Trace => out.finish(format_args!(
            "[{:10.6} {}] {}: {}",
            elapsed,
            tag,
            record.target(),
            message
        )),
        _ => out.finish(format_args!("[{:10.6} {}] {}", elapsed, tag, message)),
    }
}

/// Coloured three letter tag for a log level
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Error => "ERR".red().bold(),
        Level::Warn => "WRN".yellow(),
        Level::Info => "INF".normal(),
        Level::Debug => "DBG".dimmed(),
        Level::Trace => "TRC".dimmed().italic(),
    }
}

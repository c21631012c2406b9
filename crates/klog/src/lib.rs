//! A `log::Log` implementation over the serial port, for bare-metal
//! consumers of `taskctrl` (built with the `kernel` feature) to install as
//! the backend behind the `log` facade taskctrl's own modules log through.
#![no_std]

use log::{Level, Log, Metadata, Record};

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m",
        Level::Debug => "\x1b[36m",
        Level::Info => "\x1b[32m",
        Level::Warn => "\x1b[33m",
        Level::Error => "\x1b[31m",
    }
}

/// Serial-backed logger. `khal::serial::init()` must already have run.
pub struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        khal::serial::write_str(color(record.level()));
        khal::serial::write_str("[");
        khal::serial::write_str(record.level().as_str());
        khal::serial::write_str("]\x1b[0m ");
        khal::serial::write_fmt(*record.args());
        khal::serial::write_str("\n");
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Sets up the serial port and installs [`SerialLogger`] as the global
/// `log` backend at `level_filter`. Must be called at most once; a second
/// call returns the `log::SetLoggerError` from `log::set_logger`.
pub fn init(level_filter: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    khal::serial::init();
    log::set_logger(&LOGGER)?;
    log::set_max_level(level_filter);
    Ok(())
}

/// Writes directly to the serial port, bypassing the `log` facade — for
/// early boot output before [`init`] has run.
pub fn print(args: core::fmt::Arguments) {
    khal::serial::write_fmt(args);
}

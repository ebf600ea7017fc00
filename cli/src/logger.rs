use std::sync::Mutex;

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// Terminal logger for the CLI driver. Colors warnings yellow and errors
/// red; the engine itself only ever calls into the `log` facade, never
/// `println!`/`eprintln!` directly.
pub struct CliLogger {
    state: Mutex<LoggerState>,
}

struct LoggerState {
    level: LevelFilter,
}

static LOGGER: CliLogger = CliLogger {
    state: Mutex::new(LoggerState { level: LevelFilter::Warn }),
};

impl CliLogger {
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        LOGGER.state.lock().unwrap().level = level;
        log::set_logger(&LOGGER).expect("failed to set logger");
        log::set_max_level(level);
        Ok(())
    }
}

/// Maps `-v` occurrence count to a log level: 0 = warn, 1 = info,
/// 2 = debug, 3+ = trace.
pub fn level_for_verbosity(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl log::Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.state.lock().unwrap().level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error => eprintln!("\x1b[31m{}\x1b[0m", record.args()),
                Level::Warn => println!("\x1b[33m{}\x1b[0m", record.args()),
                Level::Info => println!("{}", record.args()),
                Level::Debug | Level::Trace => println!("\x1b[2m{}\x1b[0m", record.args()),
            }
        }
    }

    fn flush(&self) {}
}

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match record.level() {
            Level::Error | Level::Warn => {
                eprintln!("[mealway] {}: {}", record.level(), record.args())
            }
            _ => eprintln!("[mealway] {}", record.args()),
        }
    }

    fn flush(&self) {}
}

pub fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install the stderr logger; calling it again only adjusts the level
pub fn init(debug: bool) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level_for(debug));
}

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use crate::config::LogLevel;

/// Map a configured level onto the `log` filter
pub fn level_filter(level: &LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Initialize the logging system.
///
/// Returns an error instead of panicking when the embedding process has
/// already installed its own logger.
pub fn init(level: &LogLevel) -> Result<(), log::SetLoggerError> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level_filter(level))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_maps_every_level() {
        assert_eq!(level_filter(&LogLevel::Error), LevelFilter::Error);
        assert_eq!(level_filter(&LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(level_filter(&LogLevel::Info), LevelFilter::Info);
        assert_eq!(level_filter(&LogLevel::Debug), LevelFilter::Debug);
        assert_eq!(level_filter(&LogLevel::Trace), LevelFilter::Trace);
    }
}

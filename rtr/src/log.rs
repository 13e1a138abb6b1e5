use slog::{Drain, Level, Logger};

/// Create a bunyan style logger.
pub fn init_logger() -> Logger {
    init_logger_at(Level::Trace)
}

/// Create a bunyan style logger that drops records below `level`.
pub fn init_logger_at(level: Level) -> Logger {
    let drain = slog_bunyan::new(std::io::stdout()).build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x8000)
        .build()
        .fuse();
    let drain = drain.filter_level(level).fuse();
    Logger::root(drain, slog::o!())
}

/// Map a level name from the command line onto a slog level. Unknown
/// names fall back to info.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "debug" => Level::Debug,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::SubscriberBuilder;


/// Maps a `--log-level` value to a tracing level, falling back to INFO.
pub fn parse_level(raw: &str) -> Level {
    raw.trim().parse().unwrap_or(Level::INFO)
}


/*
    @@@
    @init_logging();
    . With a log directory: creates a daily-rotating file (<dir>/supervisor.log) behind a non-blocking writer and returns its guard.
    . Without one: writes to stdout.
    . The maximum level comes from the caller instead of being hard-wired.
*/
pub fn init_logging(level: Level, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let builder = SubscriberBuilder::default()
        .with_target(true)
        .with_level(true)
        .with_max_level(level);

    match log_dir {
        Some(dir) => {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "supervisor.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = builder.with_ansi(false).with_writer(non_blocking).finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = builder.with_writer(std::io::stdout).finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(None)
        }
    }
}

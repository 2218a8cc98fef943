use anyhow::Result;
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use std::path::Path;

const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}";

fn console_appender() -> ConsoleAppender {
    // Terminal lines are already formatted by `crate::terminal`.
    ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build()
}

/// Logs to `log_file` and to stderr at the same level.
pub fn setup_file_logging(log_file: &Path, log_level: LevelFilter) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(log_file)?;

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build("console", Box::new(console_appender())))
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}

/// Stderr-only logging, used when the run log is disabled.
pub fn setup_console_logging(log_level: LevelFilter) -> Result<()> {
    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console_appender())))
        .build(Root::builder().appender("console").build(log_level))?;

    log4rs::init_config(config)?;
    Ok(())
}

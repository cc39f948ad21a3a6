//! Logging setup for the training core.
//!
//! `flexi_logger` + `log` setup: level from the environment (`RUST_LOG`)
//! falling back to `info`, colored output on stderr, and a rotated on-disk
//! copy once a directory is configured.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, Naming};

use crate::{ChessRlError, Result};

/// Start the global logger.
///
/// `log_dir` is optional: when set, logs are additionally written to disk
/// with size-based rotation; the process always logs to stderr.
pub fn setup_logging(log_dir: Option<&str>) -> Result<()> {
    let mut logger = Logger::try_with_env_or_str("info")
        .map_err(|e| ChessRlError::ConfigInvalid(format!("logger init: {e}")))?
        .format(flexi_logger::colored_default_format);

    if let Some(dir) = log_dir {
        logger = logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(flexi_logger::Duplicate::Info)
            .rotate(
                Criterion::Size(10 * 1024 * 1024),
                Naming::Numbers,
                Cleanup::KeepLogFiles(10),
            );
    }

    logger
        .start()
        .map_err(|e| ChessRlError::ConfigInvalid(format!("logger start: {e}")))?;
    Ok(())
}

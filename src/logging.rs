/*!
 * Diagnostic output
 *
 * The session, handler and wrappers log through `tracing` and stay silent
 * until a subscriber is installed. [`init_logging`] installs one from a
 * [`ClientConfig`]: compact lines on stdout, or JSON records appended to the
 * configured log file.
 */

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ClientConfig, LogLevel};
use crate::error::{OmeroError, Result};

/// Directive enabling this crate and the gateway contract at `level`
fn directive(level: LogLevel) -> String {
    let level = level.to_tracing_level();
    format!("omero_client={},omero_gateway_interface={}", level, level)
}

/// `RUST_LOG` when set, otherwise the configured level
pub fn log_filter(config: &ClientConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive(config.log_level))
        .map_err(|e| OmeroError::precondition(format!("Invalid log level: {}", e)))
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            OmeroError::precondition(format!("Cannot open log file {}: {}", path.display(), e))
        })
}

/// Install the global subscriber described by `config`
///
/// Fails when the log file cannot be opened or a subscriber is already
/// installed.
pub fn init_logging(config: &ClientConfig) -> Result<()> {
    let filter = log_filter(config)?;

    let (stdout, json) = match &config.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let json = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(json))
        }
        None => (Some(fmt::layer().compact()), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(json)
        .try_init()
        .map_err(|e| OmeroError::precondition(format!("Logging already initialized: {}", e)))
}

/// Route logs through the test harness; repeated calls are no-ops
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(LogLevel::Debug)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer().without_time())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_directive_covers_both_crates() {
        assert_eq!(
            directive(LogLevel::Warn),
            "omero_client=WARN,omero_gateway_interface=WARN"
        );
    }

    #[test]
    fn test_filter_builds_for_every_level() {
        for log_level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            let config = ClientConfig {
                log_level,
                ..Default::default()
            };
            assert!(log_filter(&config).is_ok());
        }
    }

    #[test]
    fn test_log_file_is_appended() {
        let mut existing = NamedTempFile::new().unwrap();
        writeln!(existing, "earlier run").unwrap();

        let mut file = open_log_file(existing.path()).unwrap();
        writeln!(file, "this run").unwrap();

        let contents = std::fs::read_to_string(existing.path()).unwrap();
        assert_eq!(contents, "earlier run\nthis run\n");
    }

    #[test]
    fn test_unwritable_log_file_is_rejected() {
        let dir = tempdir().unwrap();
        let config = ClientConfig {
            log_file: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, OmeroError::Precondition(_)));
    }

    #[test]
    fn test_init_test_logging_is_reentrant() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("test logging initialized");
    }
}

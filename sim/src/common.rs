//! Common utility functions for the simulation front end.
//!
//! - Logger initialization
//! - Output path preparation

use std::error::Error;
use std::path::{Path, PathBuf};

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        ensure_parent_dir(log_path)?;
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Create the parent directory of `path` if it does not exist yet.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Reject output paths that point at an existing directory.
///
/// # Errors
/// Returns an error if `output` is a directory or its parent cannot be created.
pub fn validate_output_path(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.is_dir() {
        return Err(format!("Output path '{}' is a directory.", output.display()).into());
    }
    ensure_parent_dir(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("run.csv");
        validate_output_path(&output).unwrap();
        assert!(output.parent().unwrap().is_dir());
    }

    #[test]
    fn rejects_directory_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(dir.path()).is_err());
    }
}

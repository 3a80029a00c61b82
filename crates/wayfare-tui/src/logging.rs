//! File-backed tracing setup
//!
//! The terminal belongs to the UI, so log lines go to `wayfare.log` in the
//! data directory. `WAYFARE_LOG` takes an `EnvFilter` directive and wins over
//! the verbosity flag.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "WAYFARE_LOG";
pub const LOG_FILE: &str = "wayfare.log";

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "info,wayfare_core=debug,wayfare_tui=debug",
        _ => "trace",
    }
}

/// Install the global subscriber, returning the log file path
pub fn init(data_dir: &Path, verbose: u8) -> Result<PathBuf> {
    fs::create_dir_all(data_dir)?;
    let path = data_dir.join(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert_eq!(default_directive(0), "info");
        assert!(default_directive(1).contains("wayfare_core=debug"));
        assert_eq!(default_directive(5), "trace");
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = init(&data_dir, 0).unwrap();
        assert_eq!(path, data_dir.join(LOG_FILE));
        assert!(path.exists());
    }
}

// Logger setup: env_logger behind the `log` facade.
// RUST_LOG wins over the configured level. With a log directory configured,
// each subcommand appends to its own <dir>/<command>.log.

use std::fs::OpenOptions;
use std::path::PathBuf;

use env_logger::{Builder, Env, Target};

use crate::config::LogSettings;
use crate::constants::LOG_EXTENSION;
use crate::error::{MergeError, Result};

pub fn log_file_path(settings: &LogSettings, command: &str) -> Option<PathBuf> {
    settings
        .dir
        .as_ref()
        .map(|dir| dir.join(format!("{}.{}", command, LOG_EXTENSION)))
}

pub fn init(settings: &LogSettings, command: &str) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(settings.level.as_str()));

    if let Some(path) = log_file_path(settings, command) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| MergeError::Other(format!("Failed to initialize logging: {}", e)))?;

    log::info!("Starting up {}", command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_per_command() {
        let settings = LogSettings {
            dir: Some(PathBuf::from("/var/log/dashmerge")),
            level: "debug".to_string(),
        };
        assert_eq!(
            log_file_path(&settings, "merge"),
            Some(PathBuf::from("/var/log/dashmerge/merge.log"))
        );

        let stderr_only = LogSettings {
            dir: None,
            level: "info".to_string(),
        };
        assert_eq!(log_file_path(&stderr_only, "merge"), None);
    }
}

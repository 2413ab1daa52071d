// Moving footage in and out: share -> raw (mover), remote host -> raw
// (fetcher), upload folder -> cloud remote (uploader).

pub mod fetcher;
pub mod mover;
pub mod uploader;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{MergeError, Result};

/// Captured result of an external transfer command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    /// Exit 0 and nothing on stderr. ssh and scp report trouble on stderr
    /// even when the exit code says otherwise.
    pub fn is_clean(&self) -> bool {
        self.success && self.stderr.trim().is_empty()
    }
}

/// Runs an external program to completion.
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutcome>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutcome> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                MergeError::Transfer(format!("Failed to run {}: {}", program.display(), e))
            })?;

        Ok(CommandOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command, logging failures. Returns the outcome only if it was clean.
pub(crate) fn run_logged(
    runner: &dyn CommandRunner,
    program: &Path,
    args: &[String],
) -> Option<CommandOutcome> {
    log::debug!("Executing command: {} {}", program.display(), args.join(" "));
    match runner.run(program, args) {
        Ok(outcome) if outcome.is_clean() => Some(outcome),
        Ok(outcome) => {
            log::error!(
                "Error running {} {}, returncode: {:?}, stdout: {}, stderr: {}",
                program.display(),
                args.join(" "),
                outcome.exit_code,
                outcome.stdout.trim(),
                outcome.stderr.trim()
            );
            None
        }
        Err(e) => {
            log::error!("{}", e);
            None
        }
    }
}

/// Full BLAKE3 hash of a file, read in chunks.
pub fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_file_matches_in_memory_hash() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("clip.mp4");
        std::fs::write(&path, b"some clip bytes").unwrap();
        assert_eq!(hash_file(&path).unwrap(), blake3::hash(b"some clip bytes"));
    }

    #[test]
    fn test_stderr_makes_outcome_unclean() {
        let outcome = CommandOutcome {
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: "Permission denied".to_string(),
        };
        assert!(!outcome.is_clean());
    }
}

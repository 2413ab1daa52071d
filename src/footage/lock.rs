// Write-lock detection through an external checker (lsof)

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Reports whether a file is still open by some writer.
pub trait LockChecker {
    fn is_in_use(&self, path: &Path) -> bool;
}

/// Runs `lsof <path>`: any output on stdout means some process holds the file.
/// A checker that cannot be run reports "in use", so a partial file is never merged.
#[derive(Debug, Clone)]
pub struct LsofLockChecker {
    lsof: PathBuf,
}

impl LsofLockChecker {
    pub fn new(lsof: impl Into<PathBuf>) -> Self {
        Self { lsof: lsof.into() }
    }
}

impl LockChecker for LsofLockChecker {
    fn is_in_use(&self, path: &Path) -> bool {
        let output = Command::new(&self.lsof)
            .arg(path)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(o) => {
                let in_use = !o.stdout.is_empty();
                if in_use {
                    log::debug!("File {} still open for writing", path.display());
                }
                in_use
            }
            Err(e) => {
                log::debug!(
                    "Lock check for {} failed ({}), treating as in use",
                    path.display(),
                    e
                );
                true
            }
        }
    }
}

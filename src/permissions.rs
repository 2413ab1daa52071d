// Startup access checks for the directories a subcommand touches

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MergeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// Probe a directory for the requested access.
/// Write access is proven by creating and removing a probe file.
pub fn check_access(dir: &Path, access: Access) -> Result<()> {
    if !dir.is_dir() {
        return Err(MergeError::Permission(format!(
            "{} does not exist or is not a directory",
            dir.display()
        )));
    }

    fs::read_dir(dir).map_err(|e| {
        MergeError::Permission(format!("Cannot read {}: {}", dir.display(), e))
    })?;

    if access == Access::ReadWrite {
        let probe = dir.join(format!(".dashmerge_probe_{}", std::process::id()));
        fs::write(&probe, b"").map_err(|e| {
            MergeError::Permission(format!("Cannot write to {}: {}", dir.display(), e))
        })?;
        let _ = fs::remove_file(&probe);
    }

    Ok(())
}

/// Check every directory, logging each failure. Errors with all failures
/// joined if any check failed.
pub fn require_all(dirs: &[(PathBuf, Access)]) -> Result<()> {
    let mut failures = Vec::new();

    for (dir, access) in dirs {
        match check_access(dir, *access) {
            Ok(()) => log::debug!("Access {:?} ok for {}", access, dir.display()),
            Err(e) => {
                log::error!("{}", e);
                failures.push(e.to_string());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(MergeError::Permission(failures.join("; ")))
    }
}

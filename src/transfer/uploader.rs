// Uploader: hands closed files in the upload folder to `rclone move`

use std::fs;
use std::path::{Path, PathBuf};

use super::{run_logged, CommandRunner};
use crate::error::Result;
use crate::footage::lock::LockChecker;

pub struct Uploader<'a> {
    rclone: PathBuf,
    source_dir: PathBuf,
    remote: String,
    lock: &'a dyn LockChecker,
    runner: &'a dyn CommandRunner,
}

impl<'a> Uploader<'a> {
    pub fn new(
        rclone: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        remote: impl Into<String>,
        lock: &'a dyn LockChecker,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            rclone: rclone.into(),
            source_dir: source_dir.into(),
            remote: remote.into(),
            lock,
            runner,
        }
    }

    pub fn upload_file(&self, path: &Path) -> bool {
        log::info!("Uploading file {}", path.display());
        let args = vec![
            "move".to_string(),
            path.to_string_lossy().into_owned(),
            self.remote.clone(),
        ];
        let uploaded = run_logged(self.runner, &self.rclone, &args).is_some();
        if uploaded {
            log::info!("Uploaded file {}", path.display());
        } else {
            log::warn!("Failed to upload {}", path.display());
        }
        uploaded
    }

    /// Upload every regular file not held open. Returns how many went up.
    pub fn run_cycle(&self) -> Result<usize> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.source_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        files.sort();

        let mut uploaded = 0;
        for path in files {
            if self.lock.is_in_use(&path) {
                log::debug!("File {} still being written, skipping for now", path.display());
                continue;
            }
            if self.upload_file(&path) {
                uploaded += 1;
            }
        }

        Ok(uploaded)
    }
}

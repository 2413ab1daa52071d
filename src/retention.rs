// Retention sweeper: deletes footage older than the configured number of days
// and removes empty stamp-named event directories left on the share.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::footage::classify::classify_path;
use crate::footage::{FootageDirs, Stamp};

/// True once the stamp is more than `days` whole days old.
pub fn is_expired(stamp: &Stamp, now: NaiveDateTime, days: i64) -> bool {
    (now - stamp.at()).num_days() > days
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

pub struct Sweeper {
    days: i64,
}

impl Sweeper {
    pub fn new(days: i64) -> Self {
        Self { days }
    }

    /// Remove expired stamped files (clips, outputs, temps, events) from one folder.
    pub fn sweep_files(&self, dir: &Path, now: NaiveDateTime) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let stamp = match classify_path(&path).stamp() {
                Some(s) => s,
                None => {
                    log::debug!("Unrecognized name {}, skipping", path.display());
                    continue;
                }
            };
            if !is_expired(&stamp, now, self.days) {
                continue;
            }

            log::info!("Removing old file: {}", path.display());
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::error!("Error removing file {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Remove expired, empty, stamp-named directories directly under `dir`.
    pub fn sweep_empty_dirs(&self, dir: &Path, now: NaiveDateTime) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let stamp = match path.file_name().and_then(|n| n.to_str()).and_then(Stamp::parse) {
                Some(s) => s,
                None => {
                    log::debug!("Unrecognized directory name format: {}, skipping", path.display());
                    continue;
                }
            };
            if fs::read_dir(&path)?.next().is_some() {
                log::debug!("Directory {} not empty, skipping", path.display());
                continue;
            }
            if !is_expired(&stamp, now, self.days) {
                log::debug!("Directory {} is not ready for deletion, skipping", path.display());
                continue;
            }

            log::info!("Removing empty directory: {}", path.display());
            match fs::remove_dir(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::error!("Error removing directory {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Sweep every group's raw/full/fast folders plus the share folders.
    pub fn run_cycle(
        &self,
        groups: &[FootageDirs],
        share_dirs: &[&Path],
        now: NaiveDateTime,
    ) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();

        for dirs in groups {
            for dir in [&dirs.raw, &dirs.full, &dirs.fast] {
                summary.files_removed += self.sweep_files(dir, now)?;
            }
        }
        for dir in share_dirs {
            summary.dirs_removed += self.sweep_empty_dirs(dir, now)?;
        }

        Ok(summary)
    }
}

// Share -> raw folder mover
//
// Walks <share>/<group> bottom-up, picks files the classifier accepts and
// that no writer holds, and moves them into the group's raw folder.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::hash_file;
use crate::constants::EVENT_SUFFIX;
use crate::error::{MergeError, Result};
use crate::footage::classify::{classify, AuxFile, Classified};
use crate::footage::lock::LockChecker;
use crate::footage::Stamp;

/// Name a share file gets in the raw folder, or `None` if it is not footage.
///
/// Clips and stamped event files keep their names. A bare `event.json` takes
/// the stamp of the event directory it sits in.
pub fn destination_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;

    match classify(name) {
        Classified::Camera { .. } => Some(name.to_string()),
        Classified::Aux(AuxFile::EventMetadata(Some(_))) => Some(name.to_string()),
        Classified::Aux(AuxFile::EventMetadata(None)) => {
            let dir = path.parent()?.file_name()?.to_str()?;
            let stamp = Stamp::parse(dir)?;
            Some(format!("{}-{}", stamp, EVENT_SUFFIX))
        }
        _ => None,
    }
}

/// Copy to a sibling temp file, compare BLAKE3 hashes, then rename into place.
/// The source mtime is carried over.
pub fn copy_with_verify(source: &Path, dest: &Path) -> Result<()> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| MergeError::InvalidPath(dest.display().to_string()))?;
    let tmp = dest.with_file_name(format!(".{}.partial", file_name.to_string_lossy()));

    fs::copy(source, &tmp)?;

    let source_hash = hash_file(source)?;
    let copy_hash = hash_file(&tmp)?;
    if source_hash != copy_hash {
        let _ = fs::remove_file(&tmp);
        return Err(MergeError::Transfer(format!(
            "Verification failed for {}: hash mismatch",
            source.display()
        )));
    }

    if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
        let _ = filetime::set_file_mtime(&tmp, filetime::FileTime::from_system_time(modified));
    }

    fs::rename(&tmp, dest)?;
    Ok(())
}

/// Rename, or copy + verify + delete when the rename crosses filesystems.
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(MergeError::Transfer(format!(
            "Destination {} already exists",
            dest.display()
        )));
    }

    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!(
                "Rename {} failed ({}), falling back to copy",
                source.display(),
                e
            );
            copy_with_verify(source, dest)?;
            fs::remove_file(source)?;
            Ok(())
        }
    }
}

/// One share folder and the raw folder its files go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRoute {
    pub source: PathBuf,
    pub raw_dir: PathBuf,
}

pub struct Mover<'a> {
    routes: Vec<MoveRoute>,
    lock: &'a dyn LockChecker,
}

impl<'a> Mover<'a> {
    pub fn new(routes: Vec<MoveRoute>, lock: &'a dyn LockChecker) -> Self {
        Self { routes, lock }
    }

    /// Move everything movable right now. Returns how many files moved.
    pub fn run_cycle(&self) -> Result<usize> {
        let mut moved = 0;

        for route in &self.routes {
            if !route.source.is_dir() {
                log::debug!("Share folder {} not present", route.source.display());
                continue;
            }

            for entry in WalkDir::new(&route.source).contents_first(true) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!("Failed to read share entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let name = match destination_name(path) {
                    Some(n) => n,
                    None => {
                        log::warn!("File '{}' has invalid name, skipping", path.display());
                        continue;
                    }
                };

                if self.lock.is_in_use(path) {
                    log::debug!("File {} still being written, skipping for now", path.display());
                    continue;
                }

                log::info!("Moving file {}", path.display());
                match move_file(path, &route.raw_dir.join(&name)) {
                    Ok(()) => moved += 1,
                    Err(e) => log::error!("Failed to move {}: {}", path.display(), e),
                }
            }
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[derive(Default)]
    struct BusyFiles(HashSet<PathBuf>);

    impl LockChecker for BusyFiles {
        fn is_in_use(&self, path: &Path) -> bool {
            self.0.contains(path)
        }
    }

    #[test]
    fn test_destination_names() {
        assert_eq!(
            destination_name(Path::new("/s/2021-05-01_12-34-56-front.mp4")).as_deref(),
            Some("2021-05-01_12-34-56-front.mp4")
        );
        assert_eq!(
            destination_name(Path::new("/s/2021-05-01_12-40-00/event.json")).as_deref(),
            Some("2021-05-01_12-40-00-event.json")
        );
        assert_eq!(destination_name(Path::new("/s/misc/event.json")), None);
        assert_eq!(destination_name(Path::new("/s/thumb.png")), None);
        assert_eq!(destination_name(Path::new("/s/2021-05-01_12-34-56-full.mp4")), None);
    }

    #[test]
    fn test_copy_with_verify_keeps_content_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.mp4");
        let dest = tmp.path().join("b.mp4");
        fs::write(&source, b"clip").unwrap();
        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&source, mtime).unwrap();

        copy_with_verify(&source, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"clip");
        let copied = filetime::FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
        assert_eq!(copied, mtime);
        assert!(source.exists());
    }

    #[test]
    fn test_move_refuses_to_clobber() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.mp4");
        let dest = tmp.path().join("b.mp4");
        fs::write(&source, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        assert!(move_file(&source, &dest).is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(source.exists());
    }

    #[test]
    fn test_cycle_moves_clips_and_events_only() {
        let tmp = TempDir::new().unwrap();
        let share = tmp.path().join("share/SavedClips");
        let event_dir = share.join("2021-05-01_12-40-00");
        let raw = tmp.path().join("Footage/SavedClips/Raw");
        fs::create_dir_all(&event_dir).unwrap();
        fs::create_dir_all(&raw).unwrap();

        fs::write(event_dir.join("2021-05-01_12-34-56-front.mp4"), b"f").unwrap();
        fs::write(event_dir.join("2021-05-01_12-34-56-back.mp4"), b"b").unwrap();
        fs::write(event_dir.join("event.json"), b"{}").unwrap();
        fs::write(event_dir.join("thumb.png"), b"p").unwrap();

        let mut busy = BusyFiles::default();
        busy.0.insert(event_dir.join("2021-05-01_12-34-56-back.mp4"));

        let mover = Mover::new(
            vec![MoveRoute {
                source: share.clone(),
                raw_dir: raw.clone(),
            }],
            &busy,
        );
        assert_eq!(mover.run_cycle().unwrap(), 2);

        assert!(raw.join("2021-05-01_12-34-56-front.mp4").is_file());
        assert!(raw.join("2021-05-01_12-40-00-event.json").is_file());
        assert!(!raw.join("2021-05-01_12-34-56-back.mp4").exists());
        assert!(event_dir.join("2021-05-01_12-34-56-back.mp4").exists());
        assert!(event_dir.join("thumb.png").exists());
    }

    #[test]
    fn test_missing_share_folder_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let busy = BusyFiles::default();
        let mover = Mover::new(
            vec![MoveRoute {
                source: tmp.path().join("absent"),
                raw_dir: tmp.path().join("raw"),
            }],
            &busy,
        );
        assert_eq!(mover.run_cycle().unwrap(), 0);
    }
}

// Quarantine ledgers: persistent, sorted, deduplicated lists of known-bad inputs
//
// Two ledgers live in every raw directory:
// - corrupt sources, one bare filename per line
// - size mismatches, `<stamp>: <slot>=<bytes>, ...` per line
//
// Entries are permanent until an operator edits the file. Every insert
// rewrites the whole file sorted, via temp file + rename, so a crash mid-write
// never truncates the ledger.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{CameraSlot, FootageDirs, Stamp};
use crate::constants::LEDGER_TEMP_PREFIX;
use crate::error::{MergeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    CorruptSource,
    SizeMismatch,
}

#[derive(Debug, Clone)]
pub struct QuarantineLedger {
    path: PathBuf,
    kind: LedgerKind,
}

/// The key of a ledger line: text before the first `": "`, or the whole line.
pub fn entry_key(line: &str) -> &str {
    let line = line.trim();
    match line.split_once(": ") {
        Some((key, _)) => key.trim(),
        None => line,
    }
}

impl QuarantineLedger {
    pub fn new(path: impl Into<PathBuf>, kind: LedgerKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn corrupt_sources(dirs: &FootageDirs) -> Self {
        Self::new(dirs.bad_videos_path(), LedgerKind::CorruptSource)
    }

    pub fn size_mismatches(dirs: &FootageDirs) -> Self {
        Self::new(dirs.bad_sizes_path(), LedgerKind::SizeMismatch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    /// All non-empty lines. A missing ledger file is an empty ledger.
    pub fn entries(&self) -> Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MergeError::Ledger(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        Ok(content
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect())
    }

    /// True if some line's key equals `key` exactly.
    pub fn is_quarantined(&self, key: &str) -> Result<bool> {
        Ok(self.entries()?.iter().any(|line| entry_key(line) == key))
    }

    /// Insert `line` (whose key must be `key`) unless the key is already present.
    /// Returns whether anything was written.
    pub fn add(&self, key: &str, line: &str) -> Result<bool> {
        if line.contains('\n') || entry_key(line) != key {
            return Err(MergeError::Ledger(format!(
                "Ledger line '{}' does not carry key '{}'",
                line, key
            )));
        }

        let mut lines = self.entries()?;
        if lines.iter().any(|l| entry_key(l) == key) {
            return Ok(false);
        }

        lines.push(line.to_string());
        lines.sort();
        self.write_sorted(&lines)?;

        match self.kind {
            LedgerKind::CorruptSource => log::info!("Skipping over bad source file: {}", key),
            LedgerKind::SizeMismatch => log::warn!("Size issue at {}", line),
        }

        Ok(true)
    }

    fn write_sorted(&self, lines: &[String]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| MergeError::InvalidPath(self.path.display().to_string()))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| MergeError::InvalidPath(self.path.display().to_string()))?;
        let tmp_path = dir.join(format!("{}{}", LEDGER_TEMP_PREFIX, file_name.to_string_lossy()));

        {
            let mut file = fs::File::create(&tmp_path)?;
            for line in lines {
                writeln!(file, "{}", line)?;
            }
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Quarantine a corrupt raw clip by its bare filename.
pub fn quarantine_corrupt_source(ledger: &QuarantineLedger, filename: &str) -> Result<bool> {
    ledger.add(filename, filename)
}

/// Quarantine a stamp whose slot sizes disagree, recording every observed size.
pub fn quarantine_size_mismatch(
    ledger: &QuarantineLedger,
    stamp: &Stamp,
    sizes: &[(CameraSlot, u64)],
) -> Result<bool> {
    let key = stamp.to_string();
    let detail: Vec<String> = sizes
        .iter()
        .map(|(slot, size)| format!("{}={}", slot, size))
        .collect();
    let line = format!("{}: {}", key, detail.join(", "));
    ledger.add(&key, &line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger(tmp: &TempDir, kind: LedgerKind) -> QuarantineLedger {
        QuarantineLedger::new(tmp.path().join("ledger.txt"), kind)
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::CorruptSource);
        assert!(ledger.entries().unwrap().is_empty());
        assert!(!ledger.is_quarantined("anything").unwrap());
    }

    #[test]
    fn test_add_is_idempotent_and_sorted() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::CorruptSource);

        assert!(ledger.add("b-front.mp4", "b-front.mp4").unwrap());
        assert!(ledger.add("a-back.mp4", "a-back.mp4").unwrap());
        assert!(!ledger.add("b-front.mp4", "b-front.mp4").unwrap());

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "a-back.mp4\nb-front.mp4\n");
    }

    #[test]
    fn test_lookup_is_exact_not_substring() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::SizeMismatch);
        ledger
            .add("2021-05-01_12-34-56", "2021-05-01_12-34-56: front=1, back=900")
            .unwrap();

        assert!(ledger.is_quarantined("2021-05-01_12-34-56").unwrap());
        assert!(!ledger.is_quarantined("2021-05-01_12-34").unwrap());
        assert!(!ledger.is_quarantined("front=1").unwrap());
    }

    #[test]
    fn test_add_rejects_line_with_other_key() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::SizeMismatch);
        assert!(ledger.add("2021-05-01_12-34-56", "2021-05-01_12-35-56: x").is_err());
        assert!(ledger.add("a", "a\nb").is_err());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_hand_edited_ledger_is_respected() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::CorruptSource);
        std::fs::write(ledger.path(), "\nz-front.mp4\n\n").unwrap();

        assert!(ledger.is_quarantined("z-front.mp4").unwrap());
        ledger.add("c-back.mp4", "c-back.mp4").unwrap();
        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "c-back.mp4\nz-front.mp4\n");
    }

    #[test]
    fn test_size_mismatch_line_format() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp, LedgerKind::SizeMismatch);
        let stamp = Stamp::parse("2021-05-01_12-34-56").unwrap();

        let sizes = [(CameraSlot::Front, 1000), (CameraSlot::LeftRepeater, 10)];
        assert!(quarantine_size_mismatch(&ledger, &stamp, &sizes).unwrap());
        assert!(!quarantine_size_mismatch(&ledger, &stamp, &sizes).unwrap());

        assert_eq!(
            ledger.entries().unwrap(),
            vec!["2021-05-01_12-34-56: front=1000, left_repeater=10"]
        );
    }
}

// Service unit templating: fills placeholders in *.service files in place

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{MergeError, Result};

/// Ordered placeholder -> value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    pairs: Vec<(String, String)>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// One alternation over all keys, longest first, so a key that is a
    /// prefix of another never wins.
    fn pattern(&self) -> Result<Option<Regex>> {
        let mut keys: Vec<&str> = self
            .pairs
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }
        keys.sort_by(|a, b| b.len().cmp(&a.len()));

        let alternation: Vec<String> = keys.into_iter().map(regex::escape).collect();
        Regex::new(&alternation.join("|"))
            .map(Some)
            .map_err(|e| MergeError::Other(format!("Bad placeholder pattern: {}", e)))
    }

    /// Single pass substitution; replaced text is never rescanned.
    pub fn apply(&self, text: &str) -> Result<String> {
        let pattern = match self.pattern()? {
            Some(p) => p,
            None => return Ok(text.to_string()),
        };
        Ok(pattern
            .replace_all(text, |caps: &regex::Captures| {
                self.lookup(&caps[0]).unwrap_or(&caps[0]).to_string()
            })
            .into_owned())
    }
}

/// Rewrite one file via temp file + rename. Returns whether it changed.
pub fn process_service_file(path: &Path, replacements: &Replacements) -> Result<bool> {
    let original = fs::read_to_string(path)?;
    let updated = replacements.apply(&original)?;
    if updated == original {
        return Ok(false);
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| MergeError::InvalidPath(path.display().to_string()))?;
    let tmp = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp, updated)?;
    fs::rename(&tmp, path)?;

    log::info!("Updated service file {}", path.display());
    Ok(true)
}

/// Process every `*.service` file in `dir`, in name order.
pub fn process_dir(dir: &Path, replacements: &Replacements) -> Result<usize> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "service").unwrap_or(false))
        .collect();
    files.sort();

    let mut changed = 0;
    for path in files {
        if process_service_file(&path, replacements)? {
            changed += 1;
        }
    }
    Ok(changed)
}

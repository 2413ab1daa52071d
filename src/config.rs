// Configuration: TOML file over built-in defaults, then environment overrides,
// then validation.
//
// Lookup order for the file: --config, DASHMERGE_CONFIG, then
// <config_dir>/dashmerge/config.toml. Only an explicitly named file must exist.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    APP_NAME, CONFIG_ENV, CONFIG_FILENAME, DEFAULT_DAYS_TO_KEEP, DEFAULT_ENCODER_TIME_LIMIT,
    DEFAULT_EVENT_WINDOW_SECONDS, DEFAULT_FAST_FOLDER, DEFAULT_FOOTAGE_FOLDERS,
    DEFAULT_FOOTAGE_PATH, DEFAULT_FULL_FOLDER, DEFAULT_LOG_LEVEL, DEFAULT_RAW_FOLDER,
    DEFAULT_SHARE_PATH, DEFAULT_SIZE_RANGE, DEFAULT_SLEEP_SECONDS, DEFAULT_STATS_FILENAME,
    DEFAULT_STATS_MINUTES, DEFAULT_UPLOAD_FOLDER, DEFAULT_UPLOAD_REMOTE,
    WATERMARK_TIMESTAMP_FORMAT,
};
use crate::error::{MergeError, Result};
use crate::footage::merge::MergeSettings;
use crate::footage::{CameraSlot, FootageDirs, FootageGroup};
use crate::tools::{tool_path, Tool};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    paths: Option<PathsFile>,
    merge: Option<MergeFile>,
    tools: Option<ToolsFile>,
    upload: Option<UploadFile>,
    fetch: Option<FetchFile>,
    retention: Option<RetentionFile>,
    stats: Option<StatsFile>,
    log: Option<LogFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsFile {
    footage: Option<PathBuf>,
    folders: Option<Vec<String>>,
    raw: Option<String>,
    full: Option<String>,
    fast: Option<String>,
    share: Option<PathBuf>,
    upload: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MergeFile {
    slots: Option<Vec<CameraSlot>>,
    size_range: Option<f64>,
    sleep_seconds: Option<u64>,
    time_limit: Option<u64>,
    event_window_seconds: Option<i64>,
    watermark_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolsFile {
    ffmpeg: Option<PathBuf>,
    lsof: Option<PathBuf>,
    rclone: Option<PathBuf>,
    scp: Option<PathBuf>,
    ssh: Option<PathBuf>,
    df: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct UploadFile {
    remote: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FetchFile {
    host: Option<String>,
    source_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RetentionFile {
    days: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StatsFile {
    file_name: Option<String>,
    minutes: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LogFile {
    dir: Option<PathBuf>,
    level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub slots: Vec<CameraSlot>,
    pub size_range: f64,
    pub sleep: Duration,
    pub time_limit: u64,
    pub event_window_seconds: i64,
    pub watermark_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub lsof: PathBuf,
    pub rclone: PathBuf,
    pub scp: PathBuf,
    pub ssh: PathBuf,
    pub df: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub host: String,
    pub source_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSettings {
    pub file_name: String,
    pub minutes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub dir: Option<PathBuf>,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub footage_path: PathBuf,
    pub footage_folders: Vec<String>,
    pub raw_folder: String,
    pub full_folder: String,
    pub fast_folder: String,
    pub share_path: PathBuf,
    pub upload_path: PathBuf,
    pub merge: MergeConfig,
    pub tools: ToolPaths,
    pub upload_remote: String,
    pub fetch: Option<FetchSettings>,
    pub days_to_keep: i64,
    pub stats: StatsSettings,
    pub log: LogSettings,
}

/// Default location: <config_dir>/dashmerge/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join(APP_NAME).join(CONFIG_FILENAME))
}

impl Config {
    /// Resolve, read and validate the configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let file = match named {
            Some(path) => read_config_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => read_config_file(&path)?,
                _ => {
                    log::debug!("No config file found, using built-in defaults");
                    ConfigFile::default()
                }
            },
        };

        let mut cfg = Self::from_file(file);
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate TOML text without consulting the environment.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let paths = file.paths.unwrap_or_default();
        let merge = file.merge.unwrap_or_default();
        let tools = file.tools.unwrap_or_default();

        let footage_path = paths
            .footage
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FOOTAGE_PATH));
        let upload_path = paths
            .upload
            .unwrap_or_else(|| footage_path.join(DEFAULT_UPLOAD_FOLDER));

        let fetch = file.fetch.and_then(|f| {
            let host = f.host.filter(|h| !h.trim().is_empty())?;
            Some(FetchSettings {
                host,
                source_dir: f.source_dir.unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()),
            })
        });

        let stats = file.stats.unwrap_or_default();
        let log = file.log.unwrap_or_default();

        Self {
            footage_folders: paths.folders.unwrap_or_else(|| {
                DEFAULT_FOOTAGE_FOLDERS.iter().map(|f| f.to_string()).collect()
            }),
            raw_folder: paths.raw.unwrap_or_else(|| DEFAULT_RAW_FOLDER.to_string()),
            full_folder: paths.full.unwrap_or_else(|| DEFAULT_FULL_FOLDER.to_string()),
            fast_folder: paths.fast.unwrap_or_else(|| DEFAULT_FAST_FOLDER.to_string()),
            share_path: paths
                .share
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARE_PATH)),
            footage_path,
            upload_path,
            merge: MergeConfig {
                slots: merge.slots.unwrap_or_else(|| CameraSlot::ALL.to_vec()),
                size_range: merge.size_range.unwrap_or(DEFAULT_SIZE_RANGE),
                sleep: Duration::from_secs(merge.sleep_seconds.unwrap_or(DEFAULT_SLEEP_SECONDS)),
                time_limit: merge.time_limit.unwrap_or(DEFAULT_ENCODER_TIME_LIMIT),
                event_window_seconds: merge
                    .event_window_seconds
                    .unwrap_or(DEFAULT_EVENT_WINDOW_SECONDS),
                watermark_format: merge
                    .watermark_format
                    .unwrap_or_else(|| WATERMARK_TIMESTAMP_FORMAT.to_string()),
            },
            tools: ToolPaths {
                ffmpeg: tool_path(Tool::Ffmpeg, tools.ffmpeg.as_ref()),
                lsof: tool_path(Tool::Lsof, tools.lsof.as_ref()),
                rclone: tool_path(Tool::Rclone, tools.rclone.as_ref()),
                scp: tool_path(Tool::Scp, tools.scp.as_ref()),
                ssh: tool_path(Tool::Ssh, tools.ssh.as_ref()),
                df: tool_path(Tool::Df, tools.df.as_ref()),
            },
            upload_remote: file
                .upload
                .and_then(|u| u.remote)
                .unwrap_or_else(|| DEFAULT_UPLOAD_REMOTE.to_string()),
            fetch,
            days_to_keep: file
                .retention
                .and_then(|r| r.days)
                .unwrap_or(DEFAULT_DAYS_TO_KEEP),
            stats: StatsSettings {
                file_name: stats
                    .file_name
                    .unwrap_or_else(|| DEFAULT_STATS_FILENAME.to_string()),
                minutes: stats
                    .minutes
                    .unwrap_or_else(|| DEFAULT_STATS_MINUTES.to_vec()),
            },
            log: LogSettings {
                dir: log.dir,
                level: log.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            },
        }
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DASHMERGE_FOOTAGE_PATH") {
            if !path.trim().is_empty() {
                self.footage_path = PathBuf::from(path.trim());
            }
        }
        if let Some(range) = lookup("DASHMERGE_SIZE_RANGE") {
            self.merge.size_range = range.trim().parse().map_err(|_| {
                MergeError::Config("DASHMERGE_SIZE_RANGE must be a number".to_string())
            })?;
        }
        if let Some(secs) = lookup("DASHMERGE_SLEEP_SECS") {
            let seconds: u64 = secs.trim().parse().map_err(|_| {
                MergeError::Config(
                    "DASHMERGE_SLEEP_SECS must be an integer number of seconds".to_string(),
                )
            })?;
            self.merge.sleep = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.footage_folders.iter().all(|f| f.trim().is_empty()) {
            return Err(MergeError::Config(
                "at least one camera-group folder must be configured".to_string(),
            ));
        }
        if self.merge.slots.is_empty() {
            return Err(MergeError::Config(
                "at least one required camera slot must be configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for slot in &self.merge.slots {
            if !seen.insert(slot) {
                return Err(MergeError::Config(format!("camera slot {} listed twice", slot)));
            }
        }
        if self.merge.size_range.is_nan() || self.merge.size_range <= 0.0 {
            return Err(MergeError::Config("size_range must be greater than zero".to_string()));
        }
        if self.merge.sleep.is_zero() {
            return Err(MergeError::Config("sleep_seconds must be greater than zero".to_string()));
        }
        if self.merge.event_window_seconds <= 0 {
            return Err(MergeError::Config(
                "event_window_seconds must be greater than zero".to_string(),
            ));
        }
        if self.days_to_keep < 0 {
            return Err(MergeError::Config("retention days cannot be negative".to_string()));
        }
        if let Some(minute) = self.stats.minutes.iter().find(|m| **m > 59) {
            return Err(MergeError::Config(format!("stats minute {} is out of range", minute)));
        }
        Ok(())
    }

    /// Camera groups with blank folder names skipped.
    pub fn footage_groups(&self) -> Vec<FootageGroup> {
        self.footage_folders
            .iter()
            .filter(|f| !f.trim().is_empty())
            .map(|folder| {
                let root = self.footage_path.join(folder);
                FootageGroup {
                    name: folder.clone(),
                    dirs: FootageDirs::new(
                        root.join(&self.raw_folder),
                        root.join(&self.full_folder),
                        root.join(&self.fast_folder),
                    ),
                }
            })
            .collect()
    }

    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            slots: self.merge.slots.clone(),
            size_range: self.merge.size_range,
            time_limit: self.merge.time_limit,
            event_window: chrono::Duration::seconds(self.merge.event_window_seconds),
            watermark_format: self.merge.watermark_format.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        MergeError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw)
        .map_err(|e| MergeError::Config(format!("invalid config file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.footage_folders, vec!["SavedClips", "SentryClips"]);
        assert_eq!(cfg.merge.slots, CameraSlot::ALL.to_vec());
        assert_eq!(cfg.merge.size_range, DEFAULT_SIZE_RANGE);
        assert_eq!(cfg.merge.sleep, Duration::from_secs(DEFAULT_SLEEP_SECONDS));
        assert_eq!(cfg.upload_path, PathBuf::from(DEFAULT_FOOTAGE_PATH).join("Upload"));
        assert!(cfg.fetch.is_none());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [paths]
            footage = "/data/Footage"
            folders = ["SavedClips"]

            [merge]
            slots = ["front", "left_repeater", "right_repeater"]
            size_range = 0.5
            event_window_seconds = 120

            [tools]
            ffmpeg = "/opt/bin/ffmpeg"

            [fetch]
            host = "pi@car.local"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.merge.slots.len(), 3);
        assert_eq!(cfg.tools.ffmpeg, PathBuf::from("/opt/bin/ffmpeg"));
        assert_eq!(
            cfg.fetch,
            Some(FetchSettings {
                host: "pi@car.local".to_string(),
                source_dir: "Upload".to_string(),
            })
        );

        let groups = cfg.footage_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dirs.raw, PathBuf::from("/data/Footage/SavedClips/Raw"));
        assert_eq!(groups[0].dirs.fast, PathBuf::from("/data/Footage/SavedClips/Fast"));

        let settings = cfg.merge_settings();
        assert_eq!(settings.event_window, chrono::Duration::seconds(120));
        assert_eq!(settings.size_range, 0.5);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut cfg = Config::from_toml_str("[merge]\nsize_range = 0.5").unwrap();
        let env: HashMap<&str, &str> = [
            ("DASHMERGE_FOOTAGE_PATH", "/env/Footage"),
            ("DASHMERGE_SIZE_RANGE", "0.25"),
            ("DASHMERGE_SLEEP_SECS", "5"),
        ]
        .into_iter()
        .collect();

        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.footage_path, PathBuf::from("/env/Footage"));
        assert_eq!(cfg.merge.size_range, 0.25);
        assert_eq!(cfg.merge.sleep, Duration::from_secs(5));

        let bad = cfg.apply_env(|k| (k == "DASHMERGE_SLEEP_SECS").then(|| "soon".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Config::from_toml_str("[paths]\nfolders = []").is_err());
        assert!(Config::from_toml_str("[merge]\nslots = []").is_err());
        assert!(Config::from_toml_str("[merge]\nslots = [\"front\", \"front\"]").is_err());
        assert!(Config::from_toml_str("[merge]\nsize_range = 0.0").is_err());
        assert!(Config::from_toml_str("[merge]\nsleep_seconds = 0").is_err());
        assert!(Config::from_toml_str("[merge]\nevent_window_seconds = 0").is_err());
        assert!(Config::from_toml_str("[stats]\nminutes = [75]").is_err());
    }

    #[test]
    fn test_unknown_keys_and_slots_are_rejected() {
        assert!(Config::from_toml_str("[merge]\nslots = [\"pillar\"]").is_err());
        assert!(Config::from_toml_str("[merge]\nspeed = 2").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&tmp.path().join("missing.toml"))).is_err());
    }
}

// External tool resolver for ffmpeg, lsof, rclone, scp, ssh and df
//
// Resolution order (used when the config file leaves a tool unset):
// 1) Environment variable override (DASHMERGE_FFMPEG_PATH, etc.)
// 2) Binary next to the executable, or in its bin/ subdirectory
// 3) PATH fallback

use std::env;
use std::path::{Path, PathBuf};

/// An external executable the merge tools shell out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Lsof,
    Rclone,
    Scp,
    Ssh,
    Df,
}

impl Tool {
    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Lsof => "lsof",
            Tool::Rclone => "rclone",
            Tool::Scp => "scp",
            Tool::Ssh => "ssh",
            Tool::Df => "df",
        }
    }

    fn env_key(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "DASHMERGE_FFMPEG_PATH",
            Tool::Lsof => "DASHMERGE_LSOF_PATH",
            Tool::Rclone => "DASHMERGE_RCLONE_PATH",
            Tool::Scp => "DASHMERGE_SCP_PATH",
            Tool::Ssh => "DASHMERGE_SSH_PATH",
            Tool::Df => "DASHMERGE_DF_PATH",
        }
    }
}

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(default_name);
        if candidate.is_file() {
            return candidate;
        }

        let bin_candidate = dir.join("bin").join(default_name);
        if bin_candidate.is_file() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

/// Resolve the path of a tool, honoring an explicit configured path first.
pub fn tool_path(tool: Tool, configured: Option<&PathBuf>) -> PathBuf {
    match configured {
        Some(path) => path.clone(),
        None => resolve_tool(tool.env_key(), tool.binary_name()),
    }
}

/// Check if a tool is available at the resolved path
pub fn is_tool_available(path: &Path) -> bool {
    if path.is_file() {
        return true;
    }

    // PATH fallback: ask the binary itself
    std::process::Command::new(path)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// Plain-text storage report for the footage root

use std::fs;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use walkdir::WalkDir;

use crate::constants::STATS_TIMESTAMP_FORMAT;
use crate::error::{MergeError, Result};
use crate::transfer::CommandRunner;

const TABLE_RULE: &str = "----------------------------------";
const DISK_RULE: &str = "----------------------------------------------------------";

/// Human-readable size, right-aligned to a fixed width.
pub fn convert_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if size <= KB {
        format!("{:6}B", size)
    } else if size <= MB {
        format!("{:6.1}K", size as f64 / KB as f64)
    } else if size <= GB {
        format!("{:6.1}M", size as f64 / MB as f64)
    } else if size <= TB {
        format!("{:6.1}G", size as f64 / GB as f64)
    } else {
        format!("{:6.1}T", size as f64 / TB as f64)
    }
}

/// File count and total bytes under `dir`. Symlinks are not followed or counted.
pub fn folder_details(dir: &Path) -> (u64, u64) {
    let mut count = 0;
    let mut total = 0;

    for entry in WalkDir::new(dir).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            count += 1;
            total += meta.len();
        }
    }

    (count, total)
}

/// One row per entry of the footage root, the stats file itself excluded.
pub fn folders_table(footage: &Path, stats_file_name: &str) -> Result<String> {
    let mut names: Vec<String> = fs::read_dir(footage)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != stats_file_name)
        .collect();
    names.sort();

    let mut table = format!("{rule}\n Folder    | # of Files |    Size \n{rule}\n", rule = TABLE_RULE);
    for name in names {
        let (count, size) = folder_details(&footage.join(&name));
        table.push_str(&format!(" {:9} | {:10} | {} \n", name, count, convert_file_size(size)));
    }
    table.push_str(TABLE_RULE);
    table.push('\n');

    Ok(table)
}

/// `df -h` output framed for the report; a failure yields a placeholder.
pub fn disk_usage(runner: &dyn CommandRunner, df: &Path, footage: &Path) -> String {
    let args = vec!["-h".to_string(), footage.to_string_lossy().into_owned()];
    let outcome = match runner.run(df, &args) {
        Ok(o) if o.is_clean() => o,
        Ok(o) => {
            log::error!(
                "Error running df command, returncode: {:?}, stderr: {}",
                o.exit_code,
                o.stderr.trim()
            );
            return format!("{}\nDisk space usage numbers are unavailable at the moment", DISK_RULE);
        }
        Err(e) => {
            log::error!("{}", e);
            return format!("{}\nDisk space usage numbers are unavailable at the moment", DISK_RULE);
        }
    };

    let mut result = String::new();
    for line in outcome.stdout.lines() {
        result.push_str(DISK_RULE);
        result.push('\n');
        result.push_str(&format!(" {} \n", line));
    }
    result.push_str(DISK_RULE);
    result.push('\n');
    result
}

/// Regenerate only at the configured minutes of the hour, unless forced.
pub fn should_generate(now: NaiveDateTime, minutes: &[u32], force: bool) -> bool {
    force || minutes.contains(&now.minute())
}

pub fn render_report(folders: &str, disk: &str, now: NaiveDateTime) -> String {
    format!(
        "Footage Details\n{}\n\nDisk Space Details\n{}\n\nGenerated at {}\n",
        folders,
        disk,
        now.format(STATS_TIMESTAMP_FORMAT)
    )
}

/// Build and write the report to `<footage>/<stats_file_name>`.
pub fn write_stats(
    footage: &Path,
    stats_file_name: &str,
    runner: &dyn CommandRunner,
    df: &Path,
    now: NaiveDateTime,
) -> Result<()> {
    if stats_file_name.is_empty() || stats_file_name.contains('/') {
        return Err(MergeError::InvalidPath(format!(
            "stats file name '{}' must be a bare file name",
            stats_file_name
        )));
    }

    log::debug!("Generating stats in {}", stats_file_name);
    let folders = folders_table(footage, stats_file_name)?;
    let disk = disk_usage(runner, df, footage);
    let content = render_report(&folders, &disk, now);

    let target = footage.join(stats_file_name);
    let tmp = footage.join(format!(".{}.tmp", stats_file_name));
    fs::write(&tmp, &content)?;
    fs::rename(&tmp, &target)?;

    log::info!("Updated stats");
    Ok(())
}

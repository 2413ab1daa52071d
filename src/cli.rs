// Dashcam Merge CLI binary

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDateTime, Timelike};
use clap::{Parser, Subcommand};

use dashcam_merge_lib::config::{self, Config, LogSettings};
use dashcam_merge_lib::constants::{DEFAULT_LOG_LEVEL, SPECIAL_EXIT_CODE};
use dashcam_merge_lib::footage::classify::scan_stamps;
use dashcam_merge_lib::footage::encoder::FfmpegEncoder;
use dashcam_merge_lib::footage::ledger::QuarantineLedger;
use dashcam_merge_lib::footage::lock::LsofLockChecker;
use dashcam_merge_lib::footage::merge::MergeOrchestrator;
use dashcam_merge_lib::footage::FootageGroup;
use dashcam_merge_lib::logging;
use dashcam_merge_lib::permissions::{require_all, Access};
use dashcam_merge_lib::retention::Sweeper;
use dashcam_merge_lib::scheduler::{run_loop, Shutdown};
use dashcam_merge_lib::services::{process_dir, Replacements};
use dashcam_merge_lib::stats::{should_generate, write_stats};
use dashcam_merge_lib::tools::is_tool_available;
use dashcam_merge_lib::transfer::fetcher::Fetcher;
use dashcam_merge_lib::transfer::mover::{MoveRoute, Mover};
use dashcam_merge_lib::transfer::uploader::Uploader;
use dashcam_merge_lib::transfer::SystemRunner;

#[derive(Parser)]
#[command(name = "dashmerge")]
#[command(about = "Dashcam Merge - composites multi-camera dashcam clips", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $DASHMERGE_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge raw clips into composite and fast-preview videos
    Merge {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show the state of every stamp
    Status,

    /// List quarantined inputs
    Quarantine,

    /// Move clips from the share into the raw folders
    Load {
        #[arg(long)]
        once: bool,
    },

    /// Pull clips from the remote host
    Fetch {
        #[arg(long)]
        once: bool,
    },

    /// Send the upload folder to the cloud remote
    Upload {
        #[arg(long)]
        once: bool,
    },

    /// Delete footage past the retention period
    Sweep {
        #[arg(long)]
        once: bool,
    },

    /// Write the storage report
    Stats {
        #[arg(long)]
        once: bool,
        /// Ignore the configured minutes and write now
        #[arg(long)]
        force: bool,
    },

    /// Fill placeholders in the *.service templates of a directory
    Services {
        /// Directory holding the templates
        dir: PathBuf,
        /// Value for PROJECT_PATH (defaults to the executable's directory)
        #[arg(long)]
        project_path: Option<PathBuf>,
        /// Value for PROJECT_USER (defaults to $USER)
        #[arg(long)]
        user: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Merge { .. } => "merge",
            Commands::Status => "status",
            Commands::Quarantine => "quarantine",
            Commands::Load { .. } => "load",
            Commands::Fetch { .. } => "fetch",
            Commands::Upload { .. } => "upload",
            Commands::Sweep { .. } => "sweep",
            Commands::Stats { .. } => "stats",
            Commands::Services { .. } => "services",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let name = cli.command.name();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            let fallback = LogSettings {
                dir: None,
                level: DEFAULT_LOG_LEVEL.to_string(),
            };
            let _ = logging::init(&fallback, name);
            fatal(&format!("Invalid configuration: {}", e))
        }
    };
    logging::init(&cfg.log, name)?;

    match cli.command {
        Commands::Merge { once } => cmd_merge(&cfg, once),
        Commands::Status => cmd_status(&cfg),
        Commands::Quarantine => cmd_quarantine(&cfg),
        Commands::Load { once } => cmd_load(&cfg, once),
        Commands::Fetch { once } => cmd_fetch(&cfg, once),
        Commands::Upload { once } => cmd_upload(&cfg, once),
        Commands::Sweep { once } => cmd_sweep(&cfg, once),
        Commands::Stats { once, force } => cmd_stats(&cfg, once, force),
        Commands::Services { dir, project_path, user } => {
            cmd_services(&cfg, cli.config, dir, project_path, user)
        }
    }
}

/// Log and exit with the code service units treat as "do not restart".
fn fatal(message: &str) -> ! {
    log::error!("{}", message);
    eprintln!("dashmerge: {}", message);
    std::process::exit(SPECIAL_EXIT_CODE);
}

fn groups_or_exit(cfg: &Config) -> Vec<FootageGroup> {
    let groups = cfg.footage_groups();
    if groups.is_empty() {
        fatal("No camera-group folders configured");
    }
    groups
}

fn require_or_exit(dirs: &[(PathBuf, Access)]) {
    if require_all(dirs).is_err() {
        fatal("Missing some required permissions, exiting");
    }
}

/// Run `cycle` once, or forever until SIGINT/SIGTERM.
fn run_daemon<F>(name: &str, once: bool, interval: Duration, mut cycle: F) -> Result<()>
where
    F: FnMut() -> dashcam_merge_lib::Result<()>,
{
    if once {
        cycle()?;
        return Ok(());
    }

    let shutdown = Shutdown::install()?;
    run_loop(name, interval, &shutdown, cycle);
    Ok(())
}

fn cmd_merge(cfg: &Config, once: bool) -> Result<()> {
    let groups = groups_or_exit(cfg);

    let mut required = Vec::new();
    for group in &groups {
        required.push((group.dirs.raw.clone(), Access::ReadWrite));
        required.push((group.dirs.full.clone(), Access::ReadWrite));
        required.push((group.dirs.fast.clone(), Access::ReadWrite));
    }
    require_or_exit(&required);

    if !is_tool_available(&cfg.tools.ffmpeg) {
        log::warn!("ffmpeg not found at {}", cfg.tools.ffmpeg.display());
    }

    let settings = cfg.merge_settings();
    let encoder = FfmpegEncoder::new(cfg.tools.ffmpeg.clone());
    let lock = LsofLockChecker::new(cfg.tools.lsof.clone());

    for group in &groups {
        let orchestrator = MergeOrchestrator::new(&group.dirs, &settings, &encoder, &lock);
        let removed = orchestrator.remove_stale_temporaries()?;
        if removed > 0 {
            log::info!("Removed {} interrupted output(s) in {}", removed, group.name);
        }
    }

    run_daemon("merge", once, cfg.merge.sleep, || {
        for group in &groups {
            let orchestrator = MergeOrchestrator::new(&group.dirs, &settings, &encoder, &lock);
            match orchestrator.run_cycle() {
                Ok(summary) => log::debug!("{}: {:?}", group.name, summary),
                Err(e) => log::error!("Merge cycle for {} failed: {}", group.name, e),
            }
        }
        Ok(())
    })
}

fn cmd_status(cfg: &Config) -> Result<()> {
    let settings = cfg.merge_settings();
    let encoder = FfmpegEncoder::new(cfg.tools.ffmpeg.clone());
    let lock = LsofLockChecker::new(cfg.tools.lsof.clone());

    for group in cfg.footage_groups() {
        println!("{} ({})", group.name, group.dirs.raw.display());
        println!("{}", "-".repeat(50));

        if !group.dirs.raw.is_dir() {
            println!("  raw folder missing");
            println!();
            continue;
        }

        let orchestrator = MergeOrchestrator::new(&group.dirs, &settings, &encoder, &lock);
        let stamps = scan_stamps(&group.dirs.raw)?;
        if stamps.is_empty() {
            println!("  no clips");
        }
        for stamp in stamps {
            println!("  {}  {}", stamp, orchestrator.current_state(&stamp)?);
        }

        let corrupt = QuarantineLedger::corrupt_sources(&group.dirs).entries()?;
        let sizes = QuarantineLedger::size_mismatches(&group.dirs).entries()?;
        println!();
        println!("  Quarantined sources: {}", corrupt.len());
        println!("  Size mismatches:     {}", sizes.len());
        println!();
    }

    Ok(())
}

fn cmd_quarantine(cfg: &Config) -> Result<()> {
    for group in cfg.footage_groups() {
        for ledger in [
            QuarantineLedger::corrupt_sources(&group.dirs),
            QuarantineLedger::size_mismatches(&group.dirs),
        ] {
            let entries = ledger.entries()?;
            println!("{} ({} entries)", ledger.path().display(), entries.len());
            for entry in entries {
                println!("  {}", entry);
            }
        }
    }
    Ok(())
}

fn cmd_load(cfg: &Config, once: bool) -> Result<()> {
    let groups = groups_or_exit(cfg);

    let routes: Vec<MoveRoute> = groups
        .iter()
        .map(|group| MoveRoute {
            source: cfg.share_path.join(&group.name),
            raw_dir: group.dirs.raw.clone(),
        })
        .collect();

    let mut required = Vec::new();
    for route in &routes {
        required.push((route.source.clone(), Access::ReadWrite));
        required.push((route.raw_dir.clone(), Access::ReadWrite));
    }
    require_or_exit(&required);

    let lock = LsofLockChecker::new(cfg.tools.lsof.clone());
    let mover = Mover::new(routes, &lock);

    run_daemon("load", once, cfg.merge.sleep, || {
        let moved = mover.run_cycle()?;
        if moved > 0 {
            log::info!("Moved {} file(s)", moved);
        }
        Ok(())
    })
}

fn cmd_fetch(cfg: &Config, once: bool) -> Result<()> {
    let remote = match cfg.fetch.as_ref() {
        Some(remote) => remote,
        None => fatal("No [fetch] host configured"),
    };
    let groups = groups_or_exit(cfg);
    let raw_dir = groups[0].dirs.raw.clone();
    require_or_exit(&[(raw_dir.clone(), Access::ReadWrite)]);

    let runner = SystemRunner;
    let fetcher = Fetcher::new(cfg.tools.ssh.clone(), cfg.tools.scp.clone(), remote, raw_dir, &runner);

    run_daemon("fetch", once, cfg.merge.sleep, || {
        let fetched = fetcher.run_cycle();
        if fetched > 0 {
            log::info!("Fetched {} file(s)", fetched);
        }
        Ok(())
    })
}

fn cmd_upload(cfg: &Config, once: bool) -> Result<()> {
    require_or_exit(&[(cfg.upload_path.clone(), Access::ReadWrite)]);

    let lock = LsofLockChecker::new(cfg.tools.lsof.clone());
    let runner = SystemRunner;
    let uploader = Uploader::new(
        cfg.tools.rclone.clone(),
        cfg.upload_path.clone(),
        cfg.upload_remote.clone(),
        &lock,
        &runner,
    );

    run_daemon("upload", once, cfg.merge.sleep, || {
        uploader.run_cycle()?;
        Ok(())
    })
}

fn cmd_sweep(cfg: &Config, once: bool) -> Result<()> {
    let groups = groups_or_exit(cfg);
    require_or_exit(&[
        (cfg.footage_path.clone(), Access::ReadWrite),
        (cfg.share_path.clone(), Access::ReadWrite),
    ]);

    let dirs: Vec<_> = groups.iter().map(|g| g.dirs.clone()).collect();
    let share_dirs: Vec<PathBuf> = groups.iter().map(|g| cfg.share_path.join(&g.name)).collect();
    let share_refs: Vec<&Path> = share_dirs.iter().map(PathBuf::as_path).collect();
    let sweeper = Sweeper::new(cfg.days_to_keep);

    run_daemon("sweep", once, cfg.merge.sleep, || {
        let summary = sweeper.run_cycle(&dirs, &share_refs, Local::now().naive_local())?;
        log::debug!("Sweep: {:?}", summary);
        Ok(())
    })
}

fn cmd_stats(cfg: &Config, once: bool, force: bool) -> Result<()> {
    require_or_exit(&[(cfg.footage_path.clone(), Access::ReadWrite)]);

    let runner = SystemRunner;
    let mut last: Option<NaiveDateTime> = None;

    run_daemon("stats", once, Duration::from_secs(60), || {
        let now = Local::now().naive_local();
        let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0));
        if !should_generate(now, &cfg.stats.minutes, force || once) || minute == last {
            return Ok(());
        }
        write_stats(&cfg.footage_path, &cfg.stats.file_name, &runner, &cfg.tools.df, now)?;
        last = minute;
        Ok(())
    })
}

fn cmd_services(
    cfg: &Config,
    explicit_config: Option<PathBuf>,
    dir: PathBuf,
    project_path: Option<PathBuf>,
    user: Option<String>,
) -> Result<()> {
    let project_path = match project_path {
        Some(p) => p,
        None => std::env::current_exe()?
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine executable directory"))?,
    };
    let user = user
        .or_else(|| std::env::var("USER").ok())
        .ok_or_else(|| anyhow::anyhow!("No user given and $USER is not set"))?;
    let mount_point = cfg
        .footage_path
        .parent()
        .unwrap_or(&cfg.footage_path)
        .to_path_buf();
    let config_path = explicit_config
        .or_else(config::default_config_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine config file location"))?;

    let replacements = Replacements::new()
        .with("PROJECT_PATH", project_path.to_string_lossy())
        .with("PROJECT_USER", user)
        .with("SSD_MOUNT_POINT", mount_point.to_string_lossy())
        .with("CONFIG_PATH", config_path.to_string_lossy());

    let changed = process_dir(&dir, &replacements)?;
    println!("Updated {} service file(s) in {}", changed, dir.display());
    Ok(())
}

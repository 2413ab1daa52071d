// Dashcam Merge Constants
// Defaults for every tunable live here; config.rs layers the file and env on top.

// Exit code for fatal startup conditions. Service units list it in
// RestartPreventExitStatus= so the supervisor does not restart into a loop.
pub const SPECIAL_EXIT_CODE: i32 = 200;

// Filenames
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const FILENAME_STAMP_REGEX: &str = r"^(\d{4}(?:-\d\d){2}_(?:\d\d-){2}\d\d)-(.+)$";
pub const FULL_SUFFIX: &str = "full.mp4";
pub const FAST_SUFFIX: &str = "fast.mp4";
pub const EVENT_SUFFIX: &str = "event.json";
pub const TEMP_SUFFIX: &str = "tmp.mp4";

// Quarantine ledgers, stored alongside the raw camera files
pub const BAD_VIDEOS_FILENAME: &str = "bad_videos.txt";
pub const BAD_SIZES_FILENAME: &str = "bad_sizes.txt";
// Prefix of a ledger being rewritten; renamed over the ledger when complete
pub const LEDGER_TEMP_PREFIX: &str = ".tmp_";

// Folder layout under the footage root
pub const DEFAULT_FOOTAGE_PATH: &str = "/mnt/ssd/Footage";
pub const DEFAULT_SHARE_PATH: &str = "/samba/dashcam";
pub const DEFAULT_FOOTAGE_FOLDERS: [&str; 2] = ["SavedClips", "SentryClips"];
pub const DEFAULT_RAW_FOLDER: &str = "Raw";
pub const DEFAULT_FULL_FOLDER: &str = "Full";
pub const DEFAULT_FAST_FOLDER: &str = "Fast";
pub const DEFAULT_UPLOAD_FOLDER: &str = "Upload";

// Merge loop
pub const DEFAULT_SLEEP_SECONDS: u64 = 60;
pub const DEFAULT_SIZE_RANGE: f64 = 0.99;
pub const DEFAULT_ENCODER_TIME_LIMIT: u64 = 9000;
pub const DEFAULT_EVENT_WINDOW_SECONDS: i64 = 600;
pub const WATERMARK_TIMESTAMP_FORMAT: &str = "%b %-d, %Y %-I:%M:%S %p";
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// Encoder tuning
pub const OVERLAY_FONT_SIZE: u32 = 48;
pub const FAST_SPEEDUP_PTS: f64 = 0.09;
pub const FAST_CRF: u32 = 28;

// Remote side of the fetcher and uploader
pub const DEFAULT_UPLOAD_REMOTE: &str = "gdrive:/TeslaCam";

// Retention
pub const DEFAULT_DAYS_TO_KEEP: i64 = 30;

// Stats
pub const DEFAULT_STATS_FILENAME: &str = "stats.txt";
pub const DEFAULT_STATS_MINUTES: [u32; 4] = [0, 15, 30, 45];
pub const STATS_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Shutdown polling granularity while sleeping between cycles
pub const SHUTDOWN_POLL_MILLIS: u64 = 250;

// Hashing
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const LOG_EXTENSION: &str = "log";

// Config discovery
pub const CONFIG_ENV: &str = "DASHMERGE_CONFIG";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const APP_NAME: &str = "dashmerge";

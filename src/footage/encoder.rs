// FFmpeg invocation for the composite and fast-preview passes.
// Builds the argument lists, runs the encoder, and pulls the names of
// rejected inputs out of its diagnostics.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;

use super::CameraSlot;
use crate::constants::{FAST_CRF, FAST_SPEEDUP_PTS, OVERLAY_FONT_SIZE};
use crate::error::{MergeError, Result};

const INVALID_DATA_MESSAGE: &str = "Invalid data found when processing input";

// ffmpeg prints "<path>: Invalid data ..."; some builds and wrappers put the path last
static INVALID_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(.+): Invalid data found when processing input|Invalid data found when processing input: (.+))$")
        .expect("invalid data pattern is valid")
});

// ffmpeg 6.1+ names the file on its own line next to an "Invalid data" summary
static OPEN_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Error opening input file (.+?)\.?$").expect("open failed pattern is valid")
});

/// What came back from one encoder process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl EncoderRun {
    /// Input paths the encoder reported as unreadable.
    pub fn invalid_inputs(&self) -> Vec<PathBuf> {
        invalid_inputs(&self.stderr)
    }
}

/// Runs the external encoder with a full argument list.
pub trait Encoder {
    fn run(&self, args: &[String]) -> Result<EncoderRun>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn run(&self, args: &[String]) -> Result<EncoderRun> {
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MergeError::Encoder(format!("Failed to run ffmpeg: {}", e)))?;

        Ok(EncoderRun {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Paths the encoder rejected as invalid data, in order of first mention.
pub fn invalid_inputs(stderr: &str) -> Vec<PathBuf> {
    if !stderr.contains(INVALID_DATA_MESSAGE) {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = Vec::new();
    for line in stderr.lines().map(str::trim) {
        let named = if let Some(caps) = INVALID_DATA.captures(line) {
            caps.get(1).or_else(|| caps.get(2))
        } else if let Some(caps) = OPEN_FAILED.captures(line) {
            caps.get(1)
        } else {
            None
        };

        let candidate = match named {
            Some(m) => m.as_str().trim(),
            None => continue,
        };
        if looks_like_path(candidate) && !found.iter().any(|p| p.as_os_str() == candidate) {
            found.push(PathBuf::from(candidate));
        }
    }
    found
}

/// Rejects component prefixes like `[in#0 @ 0x55]` and ffmpeg's own summaries.
fn looks_like_path(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.starts_with('[')
        && !candidate.starts_with("Error opening input")
}

fn base_args(time_limit: u64) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(), "error".into(),
        "-timelimit".into(), time_limit.to_string(),
        "-y".into(),
    ]
}

/// Escape text for a drawtext `text='...'` value
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace('%', "\\%")
}

fn overlay_filter(text: &str) -> String {
    format!(
        "drawtext=text='{text}':fontcolor=white:fontsize={size}:box=1:boxcolor=black@0.5:\
         boxborderw=5:x=(w-text_w)/2",
        text = escape_drawtext(text),
        size = OVERLAY_FONT_SIZE,
    )
}

/// Filtergraph stacking the slots: input 0 scaled large on top, the others
/// scaled down side by side beneath it. Produces the `[full]` label.
pub fn composite_filter(input_count: usize, overlay_text: &str) -> String {
    let overlay = overlay_filter(overlay_text);

    if input_count <= 1 {
        return format!("[0:v]{}[full]", overlay);
    }

    let secondary_count = input_count - 1;
    let secondary_scale = if secondary_count >= 3 { 0.5 } else { 0.6 };
    let primary_scale = secondary_scale * secondary_count as f64;

    let mut parts = vec![format!(
        "[0:v]scale=w={s:.2}*iw:h={s:.2}*ih[top]",
        s = primary_scale
    )];

    for i in 1..input_count {
        parts.push(format!(
            "[{i}:v]scale=w={s:.2}*iw:h={s:.2}*ih[s{i}]",
            i = i,
            s = secondary_scale
        ));
    }

    let bottom = if secondary_count == 1 {
        "s1".to_string()
    } else {
        let labels: String = (1..input_count).map(|i| format!("[s{}]", i)).collect();
        parts.push(format!("{}hstack=inputs={}[bottom]", labels, secondary_count));
        "bottom".to_string()
    };

    parts.push(format!("[top][{}]vstack=inputs=2[stack]", bottom));
    parts.push(format!("[stack]{}[full]", overlay));

    parts.join(";")
}

/// Arguments for the composite pass. `inputs` must already be in stacking order.
pub fn composite_args(
    inputs: &[(CameraSlot, PathBuf)],
    overlay_text: &str,
    output: &Path,
    time_limit: u64,
) -> Result<Vec<String>> {
    if inputs.is_empty() {
        return Err(MergeError::Encoder("No inputs to merge".to_string()));
    }

    let mut args = base_args(time_limit);

    for (_, path) in inputs {
        args.extend_from_slice(&["-i".into(), path_str(path)?]);
    }

    args.extend_from_slice(&[
        "-filter_complex".into(), composite_filter(inputs.len(), overlay_text),
        "-map".into(), "[full]".into(),
        "-movflags".into(), "+faststart".into(),
        "-threads".into(), "0".into(),
    ]);
    args.push(path_str(output)?);

    Ok(args)
}

/// Arguments for the fast-preview pass over a finished composite.
pub fn preview_args(composite: &Path, output: &Path, time_limit: u64) -> Result<Vec<String>> {
    let mut args = base_args(time_limit);

    args.extend_from_slice(&[
        "-i".into(), path_str(composite)?,
        "-vf".into(), format!("setpts={}*PTS", FAST_SPEEDUP_PTS),
        "-c:v".into(), "libx264".into(),
        "-crf".into(), FAST_CRF.to_string(),
        "-profile:v".into(), "main".into(),
        "-tune".into(), "fastdecode".into(),
        "-movflags".into(), "+faststart".into(),
        "-threads".into(), "0".into(),
    ]);
    args.push(path_str(output)?);

    Ok(args)
}

/// Convert a Path to a String, failing on non-UTF8
fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| MergeError::InvalidPath(format!("{} is not valid UTF-8", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_inputs_extracts_paths() {
        let stderr = "\
[mov,mp4,m4a,3gp,3g2,mj2 @ 0x55] moov atom not found
/footage/Raw/2021-05-01_12-34-56-front.mp4: Invalid data found when processing input
some other line";
        assert_eq!(
            invalid_inputs(stderr),
            vec![PathBuf::from("/footage/Raw/2021-05-01_12-34-56-front.mp4")]
        );
        assert!(invalid_inputs("Conversion failed!").is_empty());
        assert_eq!(
            invalid_inputs("Invalid data found when processing input: /r/x-back.mp4"),
            vec![PathBuf::from("/r/x-back.mp4")]
        );
    }

    #[test]
    fn test_invalid_inputs_from_ffmpeg_6_1_summary() {
        let stderr = "\
[in#0 @ 0x5581] Error opening input: Invalid data found when processing input
Error opening input file /footage/Raw/2021-05-01_12-34-56-front.mp4.
Error opening input files: Invalid data found when processing input";
        assert_eq!(
            invalid_inputs(stderr),
            vec![PathBuf::from("/footage/Raw/2021-05-01_12-34-56-front.mp4")]
        );
    }

    #[test]
    fn test_open_failure_without_invalid_data_names_nothing() {
        let stderr = "\
[in#0 @ 0x5581] Error opening input: Permission denied
Error opening input file /footage/Raw/2021-05-01_12-34-56-front.mp4.
Error opening input files: Permission denied";
        assert!(invalid_inputs(stderr).is_empty());
    }

    #[test]
    fn test_invalid_inputs_are_deduplicated() {
        let stderr = "\
/r/a-back.mp4: Invalid data found when processing input
Error opening input file /r/a-back.mp4.";
        assert_eq!(invalid_inputs(stderr), vec![PathBuf::from("/r/a-back.mp4")]);
    }

    #[test]
    fn test_four_slot_filter_layout() {
        let filter = composite_filter(4, "May 1, 2021");
        assert!(filter.starts_with("[0:v]scale=w=1.50*iw:h=1.50*ih[top]"));
        assert!(filter.contains("[3:v]scale=w=0.50*iw:h=0.50*ih[s3]"));
        assert!(filter.contains("[s1][s2][s3]hstack=inputs=3[bottom]"));
        assert!(filter.contains("[top][bottom]vstack=inputs=2[stack]"));
        assert!(filter.ends_with("x=(w-text_w)/2[full]"));
    }

    #[test]
    fn test_three_slot_filter_matches_classic_layout() {
        let filter = composite_filter(3, "t");
        assert!(filter.starts_with("[0:v]scale=w=1.20*iw:h=1.20*ih[top]"));
        assert!(filter.contains("[1:v]scale=w=0.60*iw:h=0.60*ih[s1]"));
        assert!(filter.contains("[s1][s2]hstack=inputs=2[bottom]"));
    }

    #[test]
    fn test_two_and_one_slot_filters_skip_hstack() {
        let two = composite_filter(2, "t");
        assert!(!two.contains("hstack"));
        assert!(two.contains("[top][s1]vstack=inputs=2[stack]"));

        let one = composite_filter(1, "t");
        assert!(one.starts_with("[0:v]drawtext="));
        assert!(one.ends_with("[full]"));
    }

    #[test]
    fn test_overlay_text_is_escaped() {
        let filter = composite_filter(1, "12:30 PM, Bob's car 100%");
        assert!(filter.contains("text='12\\:30 PM, Bob\\'s car 100\\%'"));
    }

    #[test]
    fn test_composite_args_order() {
        let inputs = vec![
            (CameraSlot::Front, PathBuf::from("/r/a-front.mp4")),
            (CameraSlot::Back, PathBuf::from("/r/a-back.mp4")),
        ];
        let args = composite_args(&inputs, "t", Path::new("/f/a-full.tmp.mp4"), 9000).unwrap();

        assert_eq!(&args[..7], ["-hide_banner", "-loglevel", "error", "-timelimit", "9000", "-y", "-i"]);
        assert_eq!(args[7], "/r/a-front.mp4");
        assert_eq!(args[9], "/r/a-back.mp4");
        assert_eq!(args.last().unwrap(), "/f/a-full.tmp.mp4");
        assert!(composite_args(&[], "t", Path::new("/f/x.mp4"), 1).is_err());
    }

    #[test]
    fn test_preview_args() {
        let args = preview_args(Path::new("/f/a-full.mp4"), Path::new("/q/a-fast.tmp.mp4"), 60).unwrap();
        assert!(args.windows(2).any(|w| w == ["-i", "/f/a-full.mp4"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "setpts=0.09*PTS"]));
        assert_eq!(args.last().unwrap(), "/q/a-fast.tmp.mp4");
    }
}

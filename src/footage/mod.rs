// Footage core: stamps, camera slots, directory layout and per-stamp state.
//
// Nothing here is cached across cycles. Every pass re-derives state from the
// files on disk, so a restart at any point converges on the same answer.

pub mod classify;
pub mod encoder;
pub mod events;
pub mod ledger;
pub mod lock;
pub mod merge;
pub mod readiness;


use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::constants::{
    BAD_SIZES_FILENAME, BAD_VIDEOS_FILENAME, FAST_SUFFIX, FILENAME_TIMESTAMP_FORMAT, FULL_SUFFIX,
    TEMP_SUFFIX,
};

/// The recording moment shared by every slot file of one clip set.
///
/// Parsed from the exact `YYYY-MM-DD_HH-MM-SS` filename fragment. Ordering is
/// chronological, and `Display` reproduces the fragment byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(NaiveDateTime);

impl Stamp {
    /// Parse a filename fragment. Anything but the exact format is rejected,
    /// including valid dates written with different padding.
    pub fn parse(text: &str) -> Option<Self> {
        let at = NaiveDateTime::parse_from_str(text, FILENAME_TIMESTAMP_FORMAT).ok()?;
        let stamp = Stamp(at);
        if stamp.to_string() == text {
            Some(stamp)
        } else {
            None
        }
    }

    pub fn at(&self) -> NaiveDateTime {
        self.0
    }

    /// Human-readable form burned into the composite overlay.
    pub fn watermark(&self, format: &str) -> String {
        self.0.format(format).to_string()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FILENAME_TIMESTAMP_FORMAT))
    }
}

/// One fixed camera input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraSlot {
    Front,
    LeftRepeater,
    RightRepeater,
    Back,
}

impl CameraSlot {
    pub const ALL: [CameraSlot; 4] = [
        CameraSlot::Front,
        CameraSlot::LeftRepeater,
        CameraSlot::RightRepeater,
        CameraSlot::Back,
    ];

    /// Filename suffix following `<stamp>-`.
    pub fn suffix(self) -> &'static str {
        match self {
            CameraSlot::Front => "front.mp4",
            CameraSlot::LeftRepeater => "left_repeater.mp4",
            CameraSlot::RightRepeater => "right_repeater.mp4",
            CameraSlot::Back => "back.mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CameraSlot::Front => "front",
            CameraSlot::LeftRepeater => "left_repeater",
            CameraSlot::RightRepeater => "right_repeater",
            CameraSlot::Back => "back",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.suffix() == suffix)
    }

    /// Position in the composite: front on top, then the bottom row from
    /// left to right.
    pub fn stack_position(self) -> u8 {
        match self {
            CameraSlot::Front => 0,
            CameraSlot::LeftRepeater => 1,
            CameraSlot::Back => 2,
            CameraSlot::RightRepeater => 3,
        }
    }

    pub fn filename(self, stamp: &Stamp) -> String {
        format!("{}-{}", stamp, self.suffix())
    }
}

impl fmt::Display for CameraSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived artifacts produced by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Composite,
    Preview,
}

impl OutputKind {
    pub fn suffix(self) -> &'static str {
        match self {
            OutputKind::Composite => FULL_SUFFIX,
            OutputKind::Preview => FAST_SUFFIX,
        }
    }

    /// Suffix of the in-progress file the encoder writes before the rename.
    pub fn temp_suffix(self) -> String {
        let stem = self.suffix().trim_end_matches(".mp4");
        format!("{}.{}", stem, TEMP_SUFFIX)
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        [OutputKind::Composite, OutputKind::Preview]
            .into_iter()
            .find(|kind| kind.suffix() == suffix)
    }

    pub fn from_temp_suffix(suffix: &str) -> Option<Self> {
        [OutputKind::Composite, OutputKind::Preview]
            .into_iter()
            .find(|kind| kind.temp_suffix() == suffix)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Composite => f.write_str("composite"),
            OutputKind::Preview => f.write_str("preview"),
        }
    }
}

/// Raw input and output directories of one camera group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootageDirs {
    pub raw: PathBuf,
    pub full: PathBuf,
    pub fast: PathBuf,
}

impl FootageDirs {
    pub fn new(raw: impl Into<PathBuf>, full: impl Into<PathBuf>, fast: impl Into<PathBuf>) -> Self {
        Self {
            raw: raw.into(),
            full: full.into(),
            fast: fast.into(),
        }
    }

    pub fn slot_path(&self, stamp: &Stamp, slot: CameraSlot) -> PathBuf {
        self.raw.join(slot.filename(stamp))
    }

    pub fn output_dir(&self, kind: OutputKind) -> &Path {
        match kind {
            OutputKind::Composite => &self.full,
            OutputKind::Preview => &self.fast,
        }
    }

    pub fn output_path(&self, stamp: &Stamp, kind: OutputKind) -> PathBuf {
        self.output_dir(kind)
            .join(format!("{}-{}", stamp, kind.suffix()))
    }

    pub fn temp_path(&self, stamp: &Stamp, kind: OutputKind) -> PathBuf {
        self.output_dir(kind)
            .join(format!("{}-{}", stamp, kind.temp_suffix()))
    }

    pub fn bad_videos_path(&self) -> PathBuf {
        self.raw.join(BAD_VIDEOS_FILENAME)
    }

    pub fn bad_sizes_path(&self) -> PathBuf {
        self.raw.join(BAD_SIZES_FILENAME)
    }
}

/// A named camera group (e.g. SavedClips) and its directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootageGroup {
    pub name: String,
    pub dirs: FootageDirs,
}

/// Where a stamp sits in the merge lifecycle.
///
/// `Unseen -> Ready -> Composing -> Composed -> Previewing -> Done`, with
/// `Quarantined` reachable from `Unseen` and `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampState {
    Unseen,
    Ready,
    Composing,
    Composed,
    Previewing,
    Done,
    Quarantined,
}

impl fmt::Display for StampState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StampState::Unseen => "unseen",
            StampState::Ready => "ready",
            StampState::Composing => "composing",
            StampState::Composed => "composed",
            StampState::Previewing => "previewing",
            StampState::Done => "done",
            StampState::Quarantined => "quarantined",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_stamp_round_trips_filename_fragment() {
        let stamp = Stamp::parse("2021-05-01_12-34-56").unwrap();
        assert_eq!(stamp.to_string(), "2021-05-01_12-34-56");
    }

    #[test]
    fn test_stamp_rejects_inexact_formats() {
        assert!(Stamp::parse("2021-5-01_12-34-56").is_none());
        assert!(Stamp::parse("2021-05-01 12-34-56").is_none());
        assert!(Stamp::parse("2021-13-01_12-34-56").is_none());
        assert!(Stamp::parse("2021-05-01_12-34-56-").is_none());
        assert!(Stamp::parse("").is_none());
    }

    #[test]
    fn test_stamp_ordering_is_chronological() {
        let earlier = Stamp::parse("2020-12-31_23-59-59").unwrap();
        let later = Stamp::parse("2021-01-01_00-00-00").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_slot_suffix_lookup() {
        assert_eq!(CameraSlot::from_suffix("left_repeater.mp4"), Some(CameraSlot::LeftRepeater));
        assert_eq!(CameraSlot::from_suffix("full.mp4"), None);
        assert_eq!(CameraSlot::Back.filename(&Stamp::parse("2021-05-01_12-34-56").unwrap()), "2021-05-01_12-34-56-back.mp4");
    }

    #[test]
    fn test_output_paths() {
        let dirs = FootageDirs::new("/f/Raw", "/f/Full", "/f/Fast");
        let stamp = Stamp::parse("2021-05-01_12-34-56").unwrap();
        assert_eq!(
            dirs.output_path(&stamp, OutputKind::Composite),
            PathBuf::from("/f/Full/2021-05-01_12-34-56-full.mp4")
        );
        assert_eq!(
            dirs.temp_path(&stamp, OutputKind::Preview),
            PathBuf::from("/f/Fast/2021-05-01_12-34-56-fast.tmp.mp4")
        );
        assert_eq!(
            dirs.slot_path(&stamp, CameraSlot::Back),
            PathBuf::from("/f/Raw/2021-05-01_12-34-56-back.mp4")
        );
    }
}

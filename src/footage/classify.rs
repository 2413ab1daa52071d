// Filename classification for the raw footage directory
//
// A name is a camera clip, a derived output, an in-progress temp file, an
// auxiliary file (quarantine ledgers, event metadata) or unrecognized.
// Unrecognized is a normal result, never an error.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{CameraSlot, OutputKind, Stamp};
use crate::constants::{
    BAD_SIZES_FILENAME, BAD_VIDEOS_FILENAME, EVENT_SUFFIX, FILENAME_STAMP_REGEX, LEDGER_TEMP_PREFIX,
};
use crate::error::Result;

static STAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(FILENAME_STAMP_REGEX).expect("filename stamp pattern is valid")
});

/// Files that live next to the clips but are not clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxFile {
    BadVideosLedger,
    BadSizesLedger,
    /// A ledger rewrite that never got renamed into place.
    LedgerTemp,
    /// Event side-file. Bare `event.json` carries no stamp in its name.
    EventMetadata(Option<Stamp>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    Camera { stamp: Stamp, slot: CameraSlot },
    Output { stamp: Stamp, kind: OutputKind },
    Temp { stamp: Stamp, kind: OutputKind },
    Aux(AuxFile),
    Unrecognized,
}

impl Classified {
    pub fn stamp(&self) -> Option<Stamp> {
        match self {
            Classified::Camera { stamp, .. }
            | Classified::Output { stamp, .. }
            | Classified::Temp { stamp, .. } => Some(*stamp),
            Classified::Aux(AuxFile::EventMetadata(stamp)) => *stamp,
            Classified::Aux(_) | Classified::Unrecognized => None,
        }
    }
}

/// Classify a bare file name (no directory component).
pub fn classify(name: &str) -> Classified {
    match name {
        BAD_VIDEOS_FILENAME => return Classified::Aux(AuxFile::BadVideosLedger),
        BAD_SIZES_FILENAME => return Classified::Aux(AuxFile::BadSizesLedger),
        EVENT_SUFFIX => return Classified::Aux(AuxFile::EventMetadata(None)),
        _ => {}
    }

    if let Some(ledger) = name.strip_prefix(LEDGER_TEMP_PREFIX) {
        if ledger == BAD_VIDEOS_FILENAME || ledger == BAD_SIZES_FILENAME {
            return Classified::Aux(AuxFile::LedgerTemp);
        }
    }

    let caps = match STAMP_PREFIX.captures(name) {
        Some(c) => c,
        None => return Classified::Unrecognized,
    };
    let stamp = match Stamp::parse(&caps[1]) {
        Some(s) => s,
        None => return Classified::Unrecognized,
    };
    let suffix = &caps[2];

    if let Some(slot) = CameraSlot::from_suffix(suffix) {
        Classified::Camera { stamp, slot }
    } else if let Some(kind) = OutputKind::from_suffix(suffix) {
        Classified::Output { stamp, kind }
    } else if let Some(kind) = OutputKind::from_temp_suffix(suffix) {
        Classified::Temp { stamp, kind }
    } else if suffix == EVENT_SUFFIX {
        Classified::Aux(AuxFile::EventMetadata(Some(stamp)))
    } else {
        Classified::Unrecognized
    }
}

/// Classify the final component of a path.
pub fn classify_path(path: &Path) -> Classified {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => classify(name),
        None => Classified::Unrecognized,
    }
}

/// True for names the footage pipeline accepts from the outside world:
/// camera clips and event side-files.
pub fn is_proper_name(name: &str) -> bool {
    matches!(
        classify(name),
        Classified::Camera { .. } | Classified::Aux(AuxFile::EventMetadata(_))
    )
}

/// List the distinct stamps that have at least one camera clip in `raw_dir`.
/// Unrecognized names are logged and skipped.
pub fn scan_stamps(raw_dir: &Path) -> Result<BTreeSet<Stamp>> {
    let mut stamps = BTreeSet::new();

    for entry in std::fs::read_dir(raw_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        match classify(&name) {
            Classified::Camera { stamp, .. } => {
                stamps.insert(stamp);
            }
            Classified::Unrecognized => {
                log::warn!("Unrecognized filename: {}", name);
            }
            _ => {}
        }
    }

    Ok(stamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> Stamp {
        Stamp::parse("2021-05-01_12-34-56").unwrap()
    }

    #[test]
    fn test_classify_camera_files() {
        assert_eq!(
            classify("2021-05-01_12-34-56-front.mp4"),
            Classified::Camera { stamp: stamp(), slot: CameraSlot::Front }
        );
        assert_eq!(
            classify("2021-05-01_12-34-56-right_repeater.mp4"),
            Classified::Camera { stamp: stamp(), slot: CameraSlot::RightRepeater }
        );
    }

    #[test]
    fn test_classify_outputs_and_temps() {
        assert_eq!(
            classify("2021-05-01_12-34-56-full.mp4"),
            Classified::Output { stamp: stamp(), kind: OutputKind::Composite }
        );
        assert_eq!(
            classify("2021-05-01_12-34-56-fast.tmp.mp4"),
            Classified::Temp { stamp: stamp(), kind: OutputKind::Preview }
        );
    }

    #[test]
    fn test_classify_aux_files() {
        assert_eq!(classify("bad_videos.txt"), Classified::Aux(AuxFile::BadVideosLedger));
        assert_eq!(classify("bad_sizes.txt"), Classified::Aux(AuxFile::BadSizesLedger));
        assert_eq!(classify(".tmp_bad_sizes.txt"), Classified::Aux(AuxFile::LedgerTemp));
        assert_eq!(classify(".tmp_bad_videos.txt"), Classified::Aux(AuxFile::LedgerTemp));
        assert_eq!(classify(".tmp_notes.txt"), Classified::Unrecognized);
        assert_eq!(classify("event.json"), Classified::Aux(AuxFile::EventMetadata(None)));
        assert_eq!(
            classify("2021-05-01_12-34-56-event.json"),
            Classified::Aux(AuxFile::EventMetadata(Some(stamp())))
        );
    }

    #[test]
    fn test_classify_rejects_malformed_names() {
        assert_eq!(classify("front.mp4"), Classified::Unrecognized);
        assert_eq!(classify("2021-05-01_12-34-56front.mp4"), Classified::Unrecognized);
        assert_eq!(classify("2021-05-01_12-34-56-side.mp4"), Classified::Unrecognized);
        assert_eq!(classify("2021-02-30_12-34-56-front.mp4"), Classified::Unrecognized);
        assert_eq!(classify("2021-05-01_1-34-56-front.mp4"), Classified::Unrecognized);
        assert_eq!(classify("notes"), Classified::Unrecognized);
    }

    #[test]
    fn test_is_proper_name() {
        assert!(is_proper_name("2021-05-01_12-34-56-back.mp4"));
        assert!(is_proper_name("event.json"));
        assert!(!is_proper_name("2021-05-01_12-34-56-full.mp4"));
        assert!(!is_proper_name("thumb.png"));
    }

    #[test]
    fn test_scan_stamps_dedups_and_skips_unrecognized() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in [
            "2021-05-01_12-34-56-front.mp4",
            "2021-05-01_12-34-56-back.mp4",
            "2021-05-01_12-35-56-front.mp4",
            "2021-99-01_12-34-56-front.mp4",
            "bad_videos.txt",
            "junk.bin",
        ] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }

        let stamps: Vec<String> = scan_stamps(tmp.path())
            .unwrap()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(stamps, vec!["2021-05-01_12-34-56", "2021-05-01_12-35-56"]);
    }
}

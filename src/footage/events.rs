// Event side-file annotation
//
// The recorder drops an event.json next to saved/sentry clips. When one lies
// within the configured window of a stamp, its reason, camera and location
// become the caption burned into the composite.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

use super::classify::{classify, AuxFile, Classified};
use super::Stamp;
use crate::constants::EVENT_TIMESTAMP_FORMAT;
use crate::error::{MergeError, Result};

pub const NO_EVENT_CAPTION: &str = "no event information";

#[derive(Debug, Deserialize)]
struct EventFile {
    timestamp: Option<String>,
    city: Option<String>,
    street: Option<String>,
    est_lat: Option<serde_json::Value>,
    est_lon: Option<serde_json::Value>,
    reason: Option<String>,
    camera: Option<serde_json::Value>,
}

/// One parsed event side-file.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    pub at: NaiveDateTime,
    pub reason: Option<String>,
    pub camera: Option<String>,
    pub location: Option<String>,
}

impl EventMetadata {
    /// Reason, camera and location, mapped to readable text where known.
    pub fn caption(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref reason) = self.reason {
            parts.push(reason_text(reason));
        }
        if let Some(ref camera) = self.camera {
            parts.push(format!("{} camera", camera_text(camera)));
        }
        if let Some(ref location) = self.location {
            parts.push(location.clone());
        }

        if parts.is_empty() {
            NO_EVENT_CAPTION.to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Closed table of recorder reason codes. Unknown codes come back verbatim.
pub fn reason_text(code: &str) -> String {
    let text = match code {
        "user_interaction_honk" => "Saved by honk",
        "user_interaction_dashcam_icon_tapped" => "Saved from dashcam icon",
        "user_interaction_dashcam_panel_save" => "Saved from dashcam panel",
        "user_interaction_dashcam_launcher_action_tapped" => "Saved from app launcher",
        "sentry_aware_object_detection" => "Sentry: object detected",
        "sentry_locked_handle_pulled" => "Sentry: door handle pulled",
        "sentry_panic_accel" => "Sentry: strong impact",
        c if c.starts_with("sentry_aware_accel") => "Sentry: vehicle bumped",
        other => other,
    };
    text.to_string()
}

/// Closed table of recorder camera codes. Unknown codes come back verbatim.
pub fn camera_text(code: &str) -> String {
    let text = match code {
        "0" => "Front",
        "1" => "Front fisheye",
        "2" => "Front narrow",
        "3" => "Left pillar",
        "4" => "Right pillar",
        "5" => "Left repeater",
        "6" => "Right repeater",
        "7" => "Back",
        "8" => "Cabin",
        other => other,
    };
    text.to_string()
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse an event side-file. Files without a usable timestamp are errors.
pub fn parse_event(content: &str) -> Result<EventMetadata> {
    let file: EventFile = serde_json::from_str(content)?;

    let raw_ts = file
        .timestamp
        .ok_or_else(|| MergeError::Other("event has no timestamp".to_string()))?;
    let at = NaiveDateTime::parse_from_str(raw_ts.trim(), EVENT_TIMESTAMP_FORMAT)
        .map_err(|e| MergeError::Other(format!("bad event timestamp '{}': {}", raw_ts, e)))?;

    let place = match (non_empty(file.street), non_empty(file.city)) {
        (Some(street), Some(city)) => Some(format!("{}, {}", street, city)),
        (street, city) => street.or(city),
    };
    let coordinates = match (
        file.est_lat.as_ref().and_then(value_text),
        file.est_lon.as_ref().and_then(value_text),
    ) {
        (Some(lat), Some(lon)) => Some(format!("{}, {}", lat, lon)),
        _ => None,
    };

    Ok(EventMetadata {
        at,
        reason: non_empty(file.reason),
        camera: file.camera.as_ref().and_then(value_text),
        location: place.or(coordinates),
    })
}

/// Finds the event side-file that falls within a window around a stamp.
pub struct EventAnnotator {
    dir: PathBuf,
    window: Duration,
}

impl EventAnnotator {
    pub fn new(dir: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            dir: dir.into(),
            window,
        }
    }

    fn event_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_event_file(p))
            .collect();
        files.sort();
        Ok(files)
    }

    /// First event (in name order) whose timestamp is within the window.
    pub fn event_for(&self, stamp: &Stamp) -> Result<Option<EventMetadata>> {
        for path in self.event_files()? {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    log::debug!("Could not read event file {}: {}", path.display(), e);
                    continue;
                }
            };
            let event = match parse_event(&content) {
                Ok(ev) => ev,
                Err(e) => {
                    log::debug!("Skipping event file {}: {}", path.display(), e);
                    continue;
                }
            };

            if (event.at - stamp.at()).abs() <= self.window {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Caption for a stamp, `None` meaning "no event information".
    /// Read failures of the directory degrade to `None`.
    pub fn caption_for(&self, stamp: &Stamp) -> Option<String> {
        match self.event_for(stamp) {
            Ok(Some(event)) => Some(event.caption()),
            Ok(None) => None,
            Err(e) => {
                log::debug!("Event lookup for {} failed: {}", stamp, e);
                None
            }
        }
    }
}

fn is_event_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| matches!(classify(n), Classified::Aux(AuxFile::EventMetadata(_))))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HONK: &str = r#"{
        "timestamp": "2021-05-01T12:40:00",
        "city": "Springfield",
        "est_lat": "39.7817",
        "est_lon": "-89.6501",
        "reason": "user_interaction_honk",
        "camera": "0"
    }"#;

    fn stamp(s: &str) -> Stamp {
        Stamp::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_caption() {
        let event = parse_event(HONK).unwrap();
        assert_eq!(event.location.as_deref(), Some("Springfield"));
        assert_eq!(event.caption(), "Saved by honk, Front camera, Springfield");
    }

    #[test]
    fn test_unknown_codes_fall_back_to_raw_value() {
        let event = parse_event(
            r#"{"timestamp":"2021-05-01T12:40:00","reason":"mystery_reason","camera":42}"#,
        )
        .unwrap();
        assert_eq!(event.caption(), "mystery_reason, 42 camera");
        assert_eq!(reason_text("sentry_aware_accel_0.53"), "Sentry: vehicle bumped");
    }

    #[test]
    fn test_coordinates_used_without_city() {
        let event = parse_event(
            r#"{"timestamp":"2021-05-01T12:40:00","est_lat":"1.5","est_lon":"2.5"}"#,
        )
        .unwrap();
        assert_eq!(event.location.as_deref(), Some("1.5, 2.5"));
    }

    #[test]
    fn test_event_without_timestamp_is_rejected() {
        assert!(parse_event(r#"{"reason":"user_interaction_honk"}"#).is_err());
        assert!(parse_event("not json").is_err());
    }

    #[test]
    fn test_caption_within_window_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("2021-05-01_12-39-00-event.json"), HONK).unwrap();
        std::fs::write(tmp.path().join("2021-05-01_12-39-00-front.mp4"), b"x").unwrap();

        let annotator = EventAnnotator::new(tmp.path(), Duration::seconds(600));
        assert_eq!(
            annotator.caption_for(&stamp("2021-05-01_12-34-56")).as_deref(),
            Some("Saved by honk, Front camera, Springfield")
        );
        assert_eq!(
            annotator.caption_for(&stamp("2021-05-01_12-50-00")).as_deref(),
            Some("Saved by honk, Front camera, Springfield")
        );
        assert_eq!(annotator.caption_for(&stamp("2021-05-01_12-50-01")), None);
        assert_eq!(annotator.caption_for(&stamp("2021-05-01_12-29-59")), None);
    }

    #[test]
    fn test_malformed_event_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("2021-05-01_12-00-00-event.json"), "{broken").unwrap();
        std::fs::write(tmp.path().join("2021-05-01_12-40-00-event.json"), HONK).unwrap();

        let annotator = EventAnnotator::new(tmp.path(), Duration::seconds(600));
        assert!(annotator.caption_for(&stamp("2021-05-01_12-35-00")).is_some());
    }
}

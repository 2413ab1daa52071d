// Merge orchestration: one composite and one preview per stamp, at most once each.
//
// Per stamp and cycle:
// 1. Both artifacts present -> Done, nothing else is touched.
// 2. Readiness gate (quarantine, presence, write locks, size consistency).
// 3. Composite pass if the composite is missing.
// 4. Preview pass once the composite exists and is closed.
//
// Each pass encodes into a temp file and renames it into place on success,
// so the artifact path only ever holds a complete file. Artifact existence is
// the completion marker; there is no other record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;

use super::classify::{classify, scan_stamps, AuxFile, Classified};
use super::encoder::{composite_args, preview_args, Encoder, EncoderRun};
use super::events::EventAnnotator;
use super::ledger::{quarantine_corrupt_source, QuarantineLedger};
use super::lock::LockChecker;
use super::readiness::{NotReadyReason, Readiness, ReadinessEvaluator};
use super::{CameraSlot, FootageDirs, OutputKind, Stamp, StampState};
use crate::constants::{
    DEFAULT_ENCODER_TIME_LIMIT, DEFAULT_EVENT_WINDOW_SECONDS, DEFAULT_SIZE_RANGE,
    WATERMARK_TIMESTAMP_FORMAT,
};
use crate::error::Result;

/// Tunables of the merge loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSettings {
    pub slots: Vec<CameraSlot>,
    pub size_range: f64,
    pub time_limit: u64,
    pub event_window: Duration,
    pub watermark_format: String,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            slots: CameraSlot::ALL.to_vec(),
            size_range: DEFAULT_SIZE_RANGE,
            time_limit: DEFAULT_ENCODER_TIME_LIMIT,
            event_window: Duration::seconds(DEFAULT_EVENT_WINDOW_SECONDS),
            watermark_format: WATERMARK_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// Tally of one merge cycle over a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub stamps: usize,
    pub done: usize,
    pub waiting: usize,
    pub quarantined: usize,
    pub failed: usize,
}

/// How one encoder pass ended.
enum PassResult {
    Produced,
    /// The encoder named these files as invalid input.
    Corrupt(Vec<String>),
    Transient,
}

pub struct MergeOrchestrator<'a> {
    dirs: &'a FootageDirs,
    settings: &'a MergeSettings,
    encoder: &'a dyn Encoder,
    lock: &'a dyn LockChecker,
}

impl<'a> MergeOrchestrator<'a> {
    pub fn new(
        dirs: &'a FootageDirs,
        settings: &'a MergeSettings,
        encoder: &'a dyn Encoder,
        lock: &'a dyn LockChecker,
    ) -> Self {
        Self {
            dirs,
            settings,
            encoder,
            lock,
        }
    }

    fn evaluator(&self) -> ReadinessEvaluator<'_> {
        ReadinessEvaluator::new(self.dirs, &self.settings.slots, self.settings.size_range, self.lock)
    }

    /// Drive one stamp as far as it can go this cycle.
    /// Returns the state it settled in.
    pub fn process(&self, stamp: &Stamp) -> Result<StampState> {
        let composite = self.dirs.output_path(stamp, OutputKind::Composite);
        let preview = self.dirs.output_path(stamp, OutputKind::Preview);

        if composite.is_file() && preview.is_file() {
            return Ok(StampState::Done);
        }

        match self.evaluator().evaluate(stamp)? {
            Readiness::Ready(_) => {
                log::debug!("Stamp {} is ready to go", stamp);
            }
            Readiness::NotReady(NotReadyReason::Missing(slot)) => {
                log::debug!("Stamp {} not yet ready: {} missing", stamp, slot);
                return Ok(StampState::Unseen);
            }
            Readiness::NotReady(NotReadyReason::InUse(slot)) => {
                log::debug!("Stamp {} not yet ready: {} still being written", stamp, slot);
                return Ok(StampState::Unseen);
            }
            Readiness::Quarantined(reason) => {
                log::debug!("Stamp {} is quarantined: {:?}", stamp, reason);
                return Ok(StampState::Quarantined);
            }
        }

        if composite.is_file() {
            log::debug!("Full file exists for stamp {}", stamp);
        } else {
            match self.compose(stamp)? {
                PassResult::Produced => {}
                PassResult::Corrupt(names) => {
                    let ledger = QuarantineLedger::corrupt_sources(self.dirs);
                    let inputs: Vec<String> = self
                        .settings
                        .slots
                        .iter()
                        .map(|slot| slot.filename(stamp))
                        .collect();
                    let mut quarantined = false;
                    for name in names {
                        if inputs.contains(&name) {
                            quarantine_corrupt_source(&ledger, &name)?;
                            quarantined = true;
                        } else {
                            log::warn!("Encoder rejected unexpected input {} for {}", name, stamp);
                        }
                    }
                    return Ok(if quarantined {
                        StampState::Quarantined
                    } else {
                        StampState::Ready
                    });
                }
                PassResult::Transient => return Ok(StampState::Ready),
            }
        }

        if self.lock.is_in_use(&composite) {
            log::warn!(
                "Full file {} not ready for read, postponing fast preview",
                composite.display()
            );
            return Ok(StampState::Composed);
        }

        if preview.is_file() {
            log::debug!("Fast file exists for stamp {}", stamp);
            return Ok(StampState::Done);
        }

        match self.make_preview(stamp)? {
            PassResult::Produced => Ok(StampState::Done),
            PassResult::Corrupt(names) => {
                let composite_name = file_name_of(&composite);
                if names.iter().any(|n| *n == composite_name) {
                    log::warn!("Removing bad merged file {}", composite.display());
                    if let Err(e) = fs::remove_file(&composite) {
                        log::warn!("Failed to remove bad file {}: {}", composite.display(), e);
                        return Ok(StampState::Composed);
                    }
                    Ok(StampState::Ready)
                } else {
                    Ok(StampState::Composed)
                }
            }
            PassResult::Transient => Ok(StampState::Composed),
        }
    }

    fn overlay_text(&self, stamp: &Stamp) -> String {
        let when = stamp.watermark(&self.settings.watermark_format);
        let annotator = EventAnnotator::new(&self.dirs.raw, self.settings.event_window);
        match annotator.caption_for(stamp) {
            Some(caption) => format!("{} - {}", when, caption),
            None => when,
        }
    }

    fn compose(&self, stamp: &Stamp) -> Result<PassResult> {
        let mut slots = self.settings.slots.clone();
        slots.sort_by_key(|slot| slot.stack_position());
        let inputs: Vec<(CameraSlot, PathBuf)> = slots
            .into_iter()
            .map(|slot| (slot, self.dirs.slot_path(stamp, slot)))
            .collect();

        let tmp = self.dirs.temp_path(stamp, OutputKind::Composite);
        let args = composite_args(&inputs, &self.overlay_text(stamp), &tmp, self.settings.time_limit)?;

        log::info!("Merge started: {}...", stamp);
        let result = self.run_pass(stamp, OutputKind::Composite, &args)?;
        if let PassResult::Produced = result {
            log::info!("Merge completed: {}.", stamp);
        }
        Ok(result)
    }

    fn make_preview(&self, stamp: &Stamp) -> Result<PassResult> {
        let composite = self.dirs.output_path(stamp, OutputKind::Composite);
        let tmp = self.dirs.temp_path(stamp, OutputKind::Preview);
        let args = preview_args(&composite, &tmp, self.settings.time_limit)?;

        log::info!("Fast preview started: {}...", stamp);
        let result = self.run_pass(stamp, OutputKind::Preview, &args)?;
        if let PassResult::Produced = result {
            log::info!("Fast preview completed: {}.", stamp);
        }
        Ok(result)
    }

    /// Run the encoder into the temp path and publish the artifact on success.
    fn run_pass(&self, stamp: &Stamp, kind: OutputKind, args: &[String]) -> Result<PassResult> {
        let tmp = self.dirs.temp_path(stamp, kind);
        let output = self.dirs.output_path(stamp, kind);

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        log::debug!("Command: {:?}", args);
        let run = match self.encoder.run(args) {
            Ok(run) => run,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                log::warn!("Encoder could not run for {} {}: {}", kind, stamp, e);
                return Ok(PassResult::Transient);
            }
        };

        let invalid: Vec<String> = run
            .invalid_inputs()
            .iter()
            .map(|p| file_name_of(p))
            .collect();

        if !run.success || !invalid.is_empty() {
            let _ = fs::remove_file(&tmp);
            log_failed_run(stamp, kind, &run);
            return Ok(if invalid.is_empty() {
                PassResult::Transient
            } else {
                PassResult::Corrupt(invalid)
            });
        }

        if !run.stderr.trim().is_empty() {
            log::debug!("Encoder stderr for {} {}: {}", kind, stamp, run.stderr.trim());
        }

        let size = fs::metadata(&tmp).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = fs::remove_file(&tmp);
            log::warn!("Encoder produced no {} output for {}", kind, stamp);
            return Ok(PassResult::Transient);
        }

        fs::rename(&tmp, &output)?;
        Ok(PassResult::Produced)
    }

    /// Process every stamp with a clip in the raw directory.
    /// Per-stamp errors are logged and counted; they never abort the cycle.
    pub fn run_cycle(&self) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        for stamp in scan_stamps(&self.dirs.raw)? {
            summary.stamps += 1;
            match self.process(&stamp) {
                Ok(StampState::Done) => summary.done += 1,
                Ok(StampState::Quarantined) => summary.quarantined += 1,
                Ok(_) => summary.waiting += 1,
                Err(e) => {
                    summary.failed += 1;
                    log::error!("Failed to process stamp {}: {}", stamp, e);
                }
            }
        }

        Ok(summary)
    }

    /// Read-only state of a stamp, derived from artifacts, temp files and ledgers.
    /// Runs no lock checks and never writes a ledger.
    pub fn current_state(&self, stamp: &Stamp) -> Result<StampState> {
        let exists = |kind| self.dirs.output_path(stamp, kind).is_file();
        let in_progress = |kind| self.dirs.temp_path(stamp, kind).is_file();

        if exists(OutputKind::Preview) {
            return Ok(StampState::Done);
        }
        if in_progress(OutputKind::Preview) {
            return Ok(StampState::Previewing);
        }
        if exists(OutputKind::Composite) {
            return Ok(StampState::Composed);
        }
        if in_progress(OutputKind::Composite) {
            return Ok(StampState::Composing);
        }
        if self.evaluator().quarantine_reason(stamp)?.is_some() {
            return Ok(StampState::Quarantined);
        }

        let complete = self
            .settings
            .slots
            .iter()
            .all(|slot| self.dirs.slot_path(stamp, *slot).is_file());
        Ok(if complete {
            StampState::Ready
        } else {
            StampState::Unseen
        })
    }

    /// Delete temp files left behind by an interrupted encoder or ledger write.
    /// Only safe while no other orchestrator works on the same tree.
    pub fn remove_stale_temporaries(&self) -> Result<usize> {
        let mut removed = 0;

        for kind in [OutputKind::Composite, OutputKind::Preview] {
            let dir = self.dirs.output_dir(kind);
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if let Classified::Temp { .. } = classify(&file_name_of(&path)) {
                    log::info!("Removing interrupted output {}", path.display());
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        if self.dirs.raw.is_dir() {
            for entry in fs::read_dir(&self.dirs.raw)? {
                let path = entry?.path();
                let stale = matches!(
                    classify(&file_name_of(&path)),
                    Classified::Aux(AuxFile::LedgerTemp)
                );
                if stale && path.is_file() {
                    log::info!("Removing interrupted ledger write {}", path.display());
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn log_failed_run(stamp: &Stamp, kind: OutputKind, run: &EncoderRun) {
    log::error!(
        "Error running ffmpeg {} pass for {}, returncode: {:?}, stderr: {}",
        kind,
        stamp,
        run.exit_code,
        run.stderr.trim()
    );
}

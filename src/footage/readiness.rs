// Readiness evaluation: is a stamp's slot set complete, closed and consistent?

use std::fs;
use std::io::ErrorKind;

use super::ledger::{quarantine_size_mismatch, QuarantineLedger};
use super::lock::LockChecker;
use super::{CameraSlot, FootageDirs, Stamp};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    Missing(CameraSlot),
    InUse(CameraSlot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// A raw clip of this stamp is in the corrupt-source ledger.
    CorruptSource(String),
    /// The stamp is in the size-mismatch ledger.
    SizeMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(Vec<(CameraSlot, u64)>),
    NotReady(NotReadyReason),
    Quarantined(QuarantineReason),
}

/// Relative difference of two sizes, scaled by the larger one.
pub fn relative_difference(a: u64, b: u64) -> f64 {
    let larger = a.max(b);
    if larger == 0 {
        return 0.0;
    }
    a.abs_diff(b) as f64 / larger as f64
}

/// False if any size is zero or any pair differs by more than `size_range`.
pub fn sizes_consistent(sizes: &[(CameraSlot, u64)], size_range: f64) -> bool {
    if sizes.iter().any(|(_, size)| *size == 0) {
        return false;
    }

    for (i, (_, a)) in sizes.iter().enumerate() {
        for (_, b) in &sizes[i + 1..] {
            if relative_difference(*a, *b) > size_range {
                return false;
            }
        }
    }

    true
}

pub struct ReadinessEvaluator<'a> {
    dirs: &'a FootageDirs,
    slots: &'a [CameraSlot],
    size_range: f64,
    lock: &'a dyn LockChecker,
    corrupt: QuarantineLedger,
    sizes: QuarantineLedger,
}

impl<'a> ReadinessEvaluator<'a> {
    pub fn new(
        dirs: &'a FootageDirs,
        slots: &'a [CameraSlot],
        size_range: f64,
        lock: &'a dyn LockChecker,
    ) -> Self {
        Self {
            dirs,
            slots,
            size_range,
            lock,
            corrupt: QuarantineLedger::corrupt_sources(dirs),
            sizes: QuarantineLedger::size_mismatches(dirs),
        }
    }

    /// Ledger lookups only; no filesystem probing of the clips themselves.
    pub fn quarantine_reason(&self, stamp: &Stamp) -> Result<Option<QuarantineReason>> {
        for slot in self.slots {
            let name = slot.filename(stamp);
            if self.corrupt.is_quarantined(&name)? {
                return Ok(Some(QuarantineReason::CorruptSource(name)));
            }
        }

        if self.sizes.is_quarantined(&stamp.to_string())? {
            return Ok(Some(QuarantineReason::SizeMismatch));
        }

        Ok(None)
    }

    pub fn evaluate(&self, stamp: &Stamp) -> Result<Readiness> {
        if let Some(reason) = self.quarantine_reason(stamp)? {
            return Ok(Readiness::Quarantined(reason));
        }

        for slot in self.slots {
            if !self.dirs.slot_path(stamp, *slot).is_file() {
                return Ok(Readiness::NotReady(NotReadyReason::Missing(*slot)));
            }
        }

        for slot in self.slots {
            if self.lock.is_in_use(&self.dirs.slot_path(stamp, *slot)) {
                return Ok(Readiness::NotReady(NotReadyReason::InUse(*slot)));
            }
        }

        let mut sizes = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            match fs::metadata(self.dirs.slot_path(stamp, *slot)) {
                Ok(meta) => sizes.push((*slot, meta.len())),
                // Moved away between the checks above and now
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Ok(Readiness::NotReady(NotReadyReason::Missing(*slot)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !sizes_consistent(&sizes, self.size_range) {
            quarantine_size_mismatch(&self.sizes, stamp, &sizes)?;
            return Ok(Readiness::Quarantined(QuarantineReason::SizeMismatch));
        }

        Ok(Readiness::Ready(sizes))
    }
}

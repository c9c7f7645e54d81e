//! Data migrations triggered by tracking consent transitions.
//!
//! | previous  | current      | action                          |
//! |-----------|--------------|---------------------------------|
//! | pending   | granted      | move every pending batch over   |
//! | pending   | not_granted  | wipe the pending bucket         |
//! | anything else            | nothing                         |
//!
//! Already granted data is never touched by a transition.

use std::path::{Path, PathBuf};

use bv_common::id::{metadata_file_name, parse_batch_timestamp};
use bv_common::{ConsentState, Result};
use tracing::{info, Level};

use crate::fs_util;
use crate::logging::{log_internal, LogTarget};
use crate::orchestrator::BatchFileOrchestrator;

/// What a consent transition does to the on-disk data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    MovePendingToGranted,
    WipePending,
    None,
}

impl MigrationAction {
    pub fn for_transition(previous: ConsentState, current: ConsentState) -> Self {
        match (previous, current) {
            (ConsentState::Pending, ConsentState::Granted) => MigrationAction::MovePendingToGranted,
            (ConsentState::Pending, ConsentState::NotGranted) => MigrationAction::WipePending,
            _ => MigrationAction::None,
        }
    }
}

/// Apply the migration for `previous → current`.
pub fn migrate(
    previous: ConsentState,
    current: ConsentState,
    pending: &mut BatchFileOrchestrator,
    granted: &mut BatchFileOrchestrator,
) {
    match MigrationAction::for_transition(previous, current) {
        MigrationAction::MovePendingToGranted => {
            let moved = move_all(pending, granted);
            info!(moved, "pending batches moved to granted");
        }
        MigrationAction::WipePending => {
            let wiped = pending.wipe();
            info!(wiped, "pending batches wiped");
        }
        MigrationAction::None => {}
    }
}

/// Move every batch (and its metadata) from `from` into `to`.
///
/// Returns the number of batches moved. A batch whose name is already
/// taken in `to` gets the next free timestamp.
pub fn move_all(from: &mut BatchFileOrchestrator, to: &mut BatchFileOrchestrator) -> usize {
    let files = from.get_all_files();
    if files.is_empty() {
        return 0;
    }
    if let Err(e) = fs_util::ensure_writable_dir(to.root_dir()) {
        log_internal(
            Level::ERROR,
            &[LogTarget::Maintainer, LogTarget::Telemetry],
            &format!("Unable to migrate pending batches: {}", e),
        );
        return 0;
    }

    let mut moved = 0;
    for batch in files {
        let meta = from.get_metadata_file(&batch).filter(|m| m.exists());
        match move_batch(&batch, meta.as_deref(), to.root_dir()) {
            Ok(_) => moved += 1,
            Err(e) => log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!("Unable to move batch {}: {}", batch.display(), e),
            ),
        }
    }
    moved
}

/// Move one batch into `dest_dir`, metadata first so the batch never
/// shows up without it. Returns the new batch path.
fn move_batch(batch: &Path, meta: Option<&Path>, dest_dir: &Path) -> Result<PathBuf> {
    let name = batch
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| bv_common::Error::NotBatchFile(batch.display().to_string()))?;
    let timestamp = parse_batch_timestamp(name)
        .ok_or_else(|| bv_common::Error::NotBatchFile(name.to_string()))?;

    let dest_name = free_batch_name(dest_dir, timestamp);
    let dest = dest_dir.join(&dest_name);
    let dest_meta = dest_dir.join(metadata_file_name(&dest_name));

    if let Some(meta) = meta {
        fs_util::move_file(meta, &dest_meta)?;
    }
    if let Err(e) = fs_util::move_file(batch, &dest) {
        // Put the metadata back so the batch stays whole in its bucket
        if let Some(meta) = meta {
            if let Err(undo) = fs_util::move_file(&dest_meta, meta) {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::Maintainer, LogTarget::Telemetry],
                    &format!(
                        "Unable to restore metadata {} after a failed move: {}",
                        meta.display(),
                        undo
                    ),
                );
            }
        }
        return Err(e);
    }
    Ok(dest)
}

/// First timestamp name at or after `timestamp` unused in `dir`.
fn free_batch_name(dir: &Path, timestamp: u64) -> String {
    let mut candidate = timestamp;
    loop {
        let name = candidate.to_string();
        if !dir.join(&name).exists() && !dir.join(metadata_file_name(&name)).exists() {
            return name;
        }
        candidate += 1;
    }
}

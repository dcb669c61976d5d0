//! Tree-level synchronization of a directory pair.
//!
//! One pass runs these phases in order, for the reasons spelled out on each
//! phase function: refresh both records, reconcile names known to both
//! sides, revive files re-created over a tombstone, detect and propagate
//! deletions, recurse into common subdirectories, and finally carry
//! one-sided files and subtrees across. Records are persisted at the end of
//! every phase that changed them, so each sidecar always describes
//! mutations that have already happened.
//!
//! Failures on a single file are reported, counted, and skipped; the pass
//! keeps going and a re-run converges from whatever state was reached.

use crate::io::{copy_file_with_mtime, copy_tree};
use crate::reconcile::{self, Outcome};
use crate::record::{self, FileHistory, HistoryEntry, Replica};
use crate::scan::{self, Listing};
use crate::timestamp::ZonedTimestamp;
use ahash::HashSet;
use anyhow::Result;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors that abort the current directory pair (per-file trouble is
/// reported and skipped instead).
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read directory: {0}")]
    DirectoryRead(String),

    #[error("Failed to persist sync record: {0}")]
    RecordWrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What one pass did, summed over the whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Files copied between the sides.
    pub copied: usize,
    /// Files removed by deletion propagation.
    pub deleted: usize,
    /// Files whose drifted mtimes were rewound to the recorded time.
    pub aligned: usize,
    /// Conflicts resolved in favor of the later head.
    pub conflicts: usize,
    /// Files re-propagated over a tombstone.
    pub revived: usize,
    /// Per-file failures that were skipped.
    pub warnings: usize,
}

impl SyncStats {
    /// True when the pass changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.copied == 0
            && self.deleted == 0
            && self.aligned == 0
            && self.conflicts == 0
            && self.revived == 0
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Unchanged => {},
            Outcome::TimestampAligned => self.aligned += 1,
            Outcome::Updated => self.copied += 1,
            Outcome::DeletionPropagated => self.deleted += 1,
            Outcome::ConflictResolved => self.conflicts += 1,
        }
    }
}

/// Synchronize a directory pair, recursing into common subdirectories.
pub fn sync_pair(dir1: &Path, dir2: &Path) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    sync_dirs(dir1, dir2, &mut stats)?;
    Ok(stats)
}

fn sync_dirs(dir1: &Path, dir2: &Path, stats: &mut SyncStats) -> Result<()> {
    // Records must reflect on-disk reality before any decision is made.
    let refresh1 = record::refresh(dir1)?;
    let refresh2 = record::refresh(dir2)?;
    stats.aligned += refresh1.repaired + refresh2.repaired;

    let mut a = Replica::new(dir1, refresh1.record);
    let mut b = Replica::new(dir2, refresh2.record);

    reconcile_shared(&mut a, &mut b, stats)?;
    revive_tombstoned(&mut a, &mut b, stats)?;
    detect_deletions(&mut a, &mut b, stats)?;
    recurse_common(dir1, dir2, stats)?;
    propagate_one_sided(&mut a, &mut b, stats)?;

    Ok(())
}

/// Apply the per-file decision procedure to every name both records know.
///
/// Runs before deletion detection so that a file modified on one side and
/// deleted on the other has its modification considered first — the newer
/// content is restored rather than removed.
fn reconcile_shared(a: &mut Replica, b: &mut Replica, stats: &mut SyncStats) -> Result<()> {
    let shared: Vec<String> =
        a.record.names().filter(|n| b.record.contains(n)).cloned().collect();

    let mut changed = false;
    for name in &shared {
        match reconcile::reconcile_file(name, a, b) {
            Ok(Outcome::Unchanged) => {},
            Ok(outcome) => {
                stats.apply(outcome);
                changed = true;
            },
            Err(e) => {
                eprintln!("Warning: failed to reconcile {name}: {e:#}");
                stats.warnings += 1;
            },
        }
    }

    if changed {
        persist_both(a, b)?;
    }
    Ok(())
}

/// Copy back files that were re-created after both sides agreed they were
/// deleted. Runs before deletion detection so a revived file is not
/// immediately re-tombstoned.
fn revive_tombstoned(a: &mut Replica, b: &mut Replica, stats: &mut SyncStats) -> Result<()> {
    let listing1 = list_dir(&a.dir)?;
    let listing2 = list_dir(&b.dir)?;

    let mut changed = false;
    for name in &listing1.files {
        if b.record.head_is_tombstone(name) {
            match reconcile::revive_file(name, a, b) {
                Ok(()) => {
                    stats.revived += 1;
                    changed = true;
                },
                Err(e) => {
                    eprintln!("Warning: failed to revive {name}: {e:#}");
                    stats.warnings += 1;
                },
            }
        }
    }
    for name in &listing2.files {
        if a.record.head_is_tombstone(name) {
            match reconcile::revive_file(name, b, a) {
                Ok(()) => {
                    stats.revived += 1;
                    changed = true;
                },
                Err(e) => {
                    eprintln!("Warning: failed to revive {name}: {e:#}");
                    stats.warnings += 1;
                },
            }
        }
    }

    if changed {
        persist_both(a, b)?;
    }
    Ok(())
}

/// A recorded name missing from its own directory but still present on the
/// other side was deleted since the last sync: remove the survivor and
/// tombstone both histories. Names whose head is already a tombstone are
/// never tombstoned again, and the current-file sets are updated as files
/// go away so the symmetric pass sees its own effects.
fn detect_deletions(a: &mut Replica, b: &mut Replica, stats: &mut SyncStats) -> Result<()> {
    let mut current1: HashSet<String> = list_dir(&a.dir)?.files.into_iter().collect();
    let mut current2: HashSet<String> = list_dir(&b.dir)?.files.into_iter().collect();
    let now = ZonedTimestamp::now();
    let mut changed = false;

    let recorded1: Vec<String> = a.record.names().cloned().collect();
    for name in &recorded1 {
        if a.record.head_is_tombstone(name) {
            continue;
        }
        if !current1.contains(name) && current2.contains(name) {
            match reconcile::propagate_deletion(name, now, a, b) {
                Ok(()) => {
                    stats.deleted += 1;
                    current2.remove(name);
                    changed = true;
                },
                Err(e) => {
                    eprintln!("Warning: failed to propagate deletion of {name}: {e:#}");
                    stats.warnings += 1;
                },
            }
        }
    }

    let recorded2: Vec<String> = b.record.names().cloned().collect();
    for name in &recorded2 {
        if b.record.head_is_tombstone(name) {
            continue;
        }
        if !current2.contains(name) && current1.contains(name) {
            match reconcile::propagate_deletion(name, now, b, a) {
                Ok(()) => {
                    stats.deleted += 1;
                    current1.remove(name);
                    changed = true;
                },
                Err(e) => {
                    eprintln!("Warning: failed to propagate deletion of {name}: {e:#}");
                    stats.warnings += 1;
                },
            }
        }
    }

    if changed {
        persist_both(a, b)?;
    }
    Ok(())
}

/// Recurse into subdirectories that exist on both sides. A failing subtree
/// is reported and skipped; its siblings still sync.
fn recurse_common(dir1: &Path, dir2: &Path, stats: &mut SyncStats) -> Result<()> {
    let dirs1 = list_dir(dir1)?.dirs;
    let dirs2: HashSet<String> = list_dir(dir2)?.dirs.into_iter().collect();

    for sub in dirs1.iter().filter(|d| dirs2.contains(*d)) {
        if let Err(e) = sync_dirs(&dir1.join(sub), &dir2.join(sub), stats) {
            eprintln!("Warning: failed to sync subdirectory {sub}: {e:#}");
            stats.warnings += 1;
        }
    }
    Ok(())
}

/// Carry files and whole subtrees that exist on only one side across,
/// history included. Runs last so it is not confused by files created or
/// removed earlier in the pass.
fn propagate_one_sided(a: &mut Replica, b: &mut Replica, stats: &mut SyncStats) -> Result<()> {
    let listing1 = list_dir(&a.dir)?;
    let listing2 = list_dir(&b.dir)?;
    let files1: HashSet<&String> = listing1.files.iter().collect();
    let files2: HashSet<&String> = listing2.files.iter().collect();

    let mut changed = false;
    for name in listing1.files.iter().filter(|n| !files2.contains(*n)) {
        match carry_over(name, a, b) {
            Ok(()) => {
                stats.copied += 1;
                changed = true;
            },
            Err(e) => {
                eprintln!("Warning: failed to propagate {name}: {e:#}");
                stats.warnings += 1;
            },
        }
    }
    for name in listing2.files.iter().filter(|n| !files1.contains(*n)) {
        match carry_over(name, b, a) {
            Ok(()) => {
                stats.copied += 1;
                changed = true;
            },
            Err(e) => {
                eprintln!("Warning: failed to propagate {name}: {e:#}");
                stats.warnings += 1;
            },
        }
    }

    let dirs1: HashSet<&String> = listing1.dirs.iter().collect();
    let dirs2: HashSet<&String> = listing2.dirs.iter().collect();
    for sub in listing1.dirs.iter().filter(|d| !dirs2.contains(*d)) {
        match copy_tree(&a.dir.join(sub), &b.dir.join(sub)) {
            Ok(n) => stats.copied += n,
            Err(e) => {
                eprintln!("Warning: failed to copy subtree {sub}: {e}");
                stats.warnings += 1;
            },
        }
    }
    for sub in listing2.dirs.iter().filter(|d| !dirs1.contains(*d)) {
        match copy_tree(&b.dir.join(sub), &a.dir.join(sub)) {
            Ok(n) => stats.copied += n,
            Err(e) => {
                eprintln!("Warning: failed to copy subtree {sub}: {e}");
                stats.warnings += 1;
            },
        }
    }

    if changed {
        persist_both(a, b)?;
    }
    Ok(())
}

/// Copy a one-sided file and its history to the other replica. A name the
/// refresh could not record gets a fresh observation instead.
fn carry_over(name: &str, from: &mut Replica, to: &mut Replica) -> Result<()> {
    copy_file_with_mtime(&from.file_path(name), &to.file_path(name))?;

    let history = match from.record.get(name) {
        Some(history) if !history.is_empty() => history.clone(),
        _ => {
            let fresh = FileHistory::single(HistoryEntry::observe(&from.file_path(name))?);
            from.record.insert(name.to_string(), fresh.clone());
            fresh
        },
    };
    to.record.insert(name.to_string(), history);
    Ok(())
}

fn list_dir(dir: &Path) -> Result<Listing> {
    scan::list(dir)
        .map_err(|e| SyncError::DirectoryRead(format!("{}: {e}", dir.display())).into())
}

fn persist_both(a: &Replica, b: &Replica) -> Result<()> {
    a.persist()
        .map_err(|e| SyncError::RecordWrite(format!("{}: {e}", a.dir.display())))?;
    b.persist()
        .map_err(|e| SyncError::RecordWrite(format!("{}: {e}", b.dir.display())))?;
    Ok(())
}

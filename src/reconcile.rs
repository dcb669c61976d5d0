//! Per-file reconciliation between two replicas.
//!
//! `reconcile_file` is the decision procedure for a name present in both
//! records. It looks at the two head entries and at where each head's digest
//! sits in the opposite history, and picks exactly one action:
//!
//! - both heads are tombstones: nothing to do;
//! - same content, different mtimes: the earlier instant is canonical and
//!   the later side is rewound to it;
//! - one side's current content appears below the other side's head: that
//!   side is stale and adopts the newer head (file and entry);
//! - neither current digest is known to the other side: a true conflict,
//!   resolved in favor of the later head; a tie leaves both sides alone.
//!
//! Adopting a head means copying the file across when the head carries
//! content, or unlinking the local file when it is a tombstone. Files are
//! touched before records, so a persisted record never describes a
//! mutation that has not happened.
//!
//! The revival and tombstone-propagation protocols live here too; the
//! directory syncer decides when to invoke them.

use crate::io::copy_file_with_mtime;
use crate::record::{HistoryEntry, Replica};
use crate::timestamp::ZonedTimestamp;
use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

/// What `reconcile_file` did for one name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Heads agree, or both sides are tombstoned, or a conflict tied.
    Unchanged,
    /// Same content on both sides; the later mtime was rewound to the
    /// earlier, canonical one.
    TimestampAligned,
    /// One side was stale and adopted the other side's newer file.
    Updated,
    /// The adopted head was a tombstone; the local file was removed.
    DeletionPropagated,
    /// Divergent heads with no common ground; the later head won.
    ConflictResolved,
}

/// Reconcile one name that appears in both records.
pub fn reconcile_file(name: &str, a: &mut Replica, b: &mut Replica) -> Result<Outcome> {
    let (head_a, head_b) = match (a.record.head(name), b.record.head(name)) {
        (Some(x), Some(y)) => (x.clone(), y.clone()),
        // An empty history only arrives from a hand-edited sidecar; the
        // next refresh replaces it, so leave the pair alone for now.
        _ => return Ok(Outcome::Unchanged),
    };

    // Both sides agree the file is gone.
    if head_a.digest.is_tombstone() && head_b.digest.is_tombstone() {
        return Ok(Outcome::Unchanged);
    }

    // Same content: any mtime disagreement is drift, and the earlier
    // instant is almost certainly the true modification time.
    if head_a.digest == head_b.digest {
        if head_a.timestamp == head_b.timestamp {
            return Ok(Outcome::Unchanged);
        }
        if head_a.timestamp < head_b.timestamp {
            rewind_to_canonical(name, head_a.timestamp, b)?;
        } else {
            rewind_to_canonical(name, head_b.timestamp, a)?;
        }
        return Ok(Outcome::TimestampAligned);
    }

    // One side's current content sits below the other side's head: the
    // other side has seen it and moved on. Side 1's check runs first; in a
    // well-formed pair at most one direction can match.
    if b.record.get(name).is_some_and(|h| h.tail_contains(&head_a.digest)) {
        return adopt_head(name, b, a);
    }
    if a.record.get(name).is_some_and(|h| h.tail_contains(&head_b.digest)) {
        return adopt_head(name, a, b);
    }

    // Neither current digest is known to the other side: a true conflict.
    // The later head wins; a tie leaves both sides as they are.
    match head_a.timestamp.cmp(&head_b.timestamp) {
        Ordering::Greater => {
            adopt_head(name, a, b)?;
            Ok(Outcome::ConflictResolved)
        },
        Ordering::Less => {
            adopt_head(name, b, a)?;
            Ok(Outcome::ConflictResolved)
        },
        Ordering::Equal => Ok(Outcome::Unchanged),
    }
}

/// Make `to` mirror `from`'s head: copy the file across for a content head,
/// unlink for a tombstone, then prepend the adopted entry.
fn adopt_head(name: &str, from: &Replica, to: &mut Replica) -> Result<Outcome> {
    let entry = from
        .record
        .head(name)
        .cloned()
        .ok_or_else(|| anyhow!("no history head for {name} in {}", from.dir.display()))?;

    let outcome = if entry.digest.is_tombstone() {
        unlink_if_present(&to.file_path(name))?;
        Outcome::DeletionPropagated
    } else {
        copy_file_with_mtime(&from.file_path(name), &to.file_path(name))?;
        Outcome::Updated
    };
    to.record.prepend(name, entry);
    Ok(outcome)
}

/// Rewrite the head timestamp on the drifted side and rewind its file's
/// mtime to the canonical instant.
fn rewind_to_canonical(name: &str, canonical: ZonedTimestamp, drifted: &mut Replica) -> Result<()> {
    canonical.restore(&drifted.file_path(name))?;
    if let Some(history) = drifted.record.get_mut(name) {
        history.set_head_timestamp(canonical);
    }
    Ok(())
}

/// Re-propagate a file that was re-created after deletion: `from` has the
/// file on disk while `to`'s record still ends in a tombstone. Copies the
/// file across and stamps a fresh observation onto both histories.
pub fn revive_file(name: &str, from: &mut Replica, to: &mut Replica) -> Result<()> {
    let source = from.file_path(name);
    let entry = HistoryEntry::observe(&source)?;
    copy_file_with_mtime(&source, &to.file_path(name))?;
    from.record.prepend(name, entry.clone());
    to.record.prepend(name, entry);
    Ok(())
}

/// The file vanished from `deleted_side` since the last sync: remove the
/// surviving copy and tombstone both histories at the same instant.
pub fn propagate_deletion(
    name: &str,
    now: ZonedTimestamp,
    deleted_side: &mut Replica,
    survivor: &mut Replica,
) -> Result<()> {
    unlink_if_present(&survivor.file_path(name))?;
    deleted_side.record.prepend(name, HistoryEntry::tombstone(now));
    survivor.record.prepend(name, HistoryEntry::tombstone(now));
    Ok(())
}

/// Unlink one replica's copy of a file. A copy that is already gone counts
/// as removed; propagating the same deletion twice must not fail.
fn unlink_if_present(path: &Path) -> io::Result<()> {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            return Err(e);
        }
    }
    Ok(())
}

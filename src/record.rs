//! The per-directory sync record and its `.sync` sidecar.
//!
//! A record maps each filename (basename only) to its history: a
//! newest-first list of `(timestamp, digest)` observations. The sidecar is
//! pretty-printed JSON so a user can read their own audit trail; a missing,
//! empty, or unparseable sidecar loads as an empty record and the next
//! refresh rebuilds it from the directory contents.

use crate::hash::{self, Digest};
use crate::scan;
use crate::timestamp::ZonedTimestamp;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sidecar filename, one per synchronized directory.
pub const SIDECAR_NAME: &str = ".sync";

/// One observation of a file: when it was seen and what its content was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: ZonedTimestamp,
    pub digest: Digest,
}

impl HistoryEntry {
    /// Observe a file as it currently exists on disk.
    pub fn observe(path: &Path) -> io::Result<Self> {
        Ok(Self {
            timestamp: ZonedTimestamp::from_mtime(path)?,
            digest: hash::hash_file(path)?,
        })
    }

    pub fn tombstone(timestamp: ZonedTimestamp) -> Self {
        Self { timestamp, digest: Digest::Tombstone }
    }
}

// Entries are stored as two-element `[timestamp, digest]` arrays.
impl Serialize for HistoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.timestamp, &self.digest).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HistoryEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (timestamp, digest) = <(ZonedTimestamp, Digest)>::deserialize(deserializer)?;
        Ok(Self { timestamp, digest })
    }
}

/// Newest-first history of one filename.
///
/// Well-formed histories are non-empty; an empty one can only arrive from a
/// hand-edited sidecar and is treated as missing by the updater.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHistory(Vec<HistoryEntry>);

impl FileHistory {
    pub fn single(entry: HistoryEntry) -> Self {
        Self(vec![entry])
    }

    pub fn head(&self) -> Option<&HistoryEntry> {
        self.0.first()
    }

    pub fn prepend(&mut self, entry: HistoryEntry) {
        self.0.insert(0, entry);
    }

    /// Whether `digest` appears strictly below the head.
    pub fn tail_contains(&self, digest: &Digest) -> bool {
        self.0.iter().skip(1).any(|e| e.digest == *digest)
    }

    /// Rewrite the head's timestamp, keeping its digest.
    pub fn set_head_timestamp(&mut self, timestamp: ZonedTimestamp) {
        if let Some(head) = self.0.first_mut() {
            head.timestamp = timestamp;
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mapping from filename to history for one directory.
///
/// Keys are sorted so the sidecar serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRecord(BTreeMap<String, FileHistory>);

impl SyncRecord {
    /// Read `<dir>/.sync`. Missing, empty, and malformed sidecars all load
    /// as an empty record; malformed ones are reported on stderr first.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let path = dir.join(SIDECAR_NAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str(&contents) {
            Ok(record) => Ok(record),
            Err(e) => {
                eprintln!("Warning: malformed sync record in {}: {e}", dir.display());
                Ok(Self::default())
            },
        }
    }

    /// Write the record back to `<dir>/.sync`, replacing what was there.
    pub fn store(&self, dir: &Path) -> io::Result<()> {
        let mut text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        text.push('\n');
        fs::write(dir.join(SIDECAR_NAME), text)
    }

    pub fn get(&self, name: &str) -> Option<&FileHistory> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FileHistory> {
        self.0.get_mut(name)
    }

    pub fn head(&self, name: &str) -> Option<&HistoryEntry> {
        self.0.get(name).and_then(FileHistory::head)
    }

    pub fn head_is_tombstone(&self, name: &str) -> bool {
        self.head(name).is_some_and(|e| e.digest.is_tombstone())
    }

    pub fn insert(&mut self, name: String, history: FileHistory) {
        self.0.insert(name, history);
    }

    /// Prepend `entry` to `name`'s history, creating the history if the
    /// name was never recorded.
    pub fn prepend(&mut self, name: &str, entry: HistoryEntry) {
        self.0.entry(name.to_string()).or_default().prepend(entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One side of a sync: a directory and the record that describes it.
///
/// Each replica owns its record; the reconciler couples replicas only by
/// copying entries across explicitly.
#[derive(Debug, Clone)]
pub struct Replica {
    pub dir: PathBuf,
    pub record: SyncRecord,
}

impl Replica {
    pub fn new(dir: impl Into<PathBuf>, record: SyncRecord) -> Self {
        Self { dir: dir.into(), record }
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn persist(&self) -> io::Result<()> {
        self.record.store(&self.dir)
    }
}

/// Result of refreshing a directory's record against the filesystem.
pub struct Refresh {
    pub record: SyncRecord,
    /// Files whose drifted mtime was restored from the recorded time.
    pub repaired: usize,
}

/// Bring a directory's record up to date with what is on disk.
///
/// For every listed regular file: an unrecorded name (or one with an empty
/// history) gets a fresh single-entry history; changed content gets a new
/// head entry; unchanged content with a drifted mtime gets its mtime
/// restored from the recorded canonical time instead of a new entry.
/// Tombstone-headed names are left alone — revival is the syncer's call.
/// Missing files are also left alone; deletion detection owns those.
///
/// Per-file failures are reported and skipped. The sidecar is rewritten
/// only when the record changed or did not exist yet.
pub fn refresh(dir: &Path) -> Result<Refresh> {
    let mut record = SyncRecord::load(dir)
        .with_context(|| format!("Failed to load sync record in {}", dir.display()))?;
    let listing = scan::list(dir)
        .with_context(|| format!("Failed to list directory {}", dir.display()))?;

    let mut repaired = 0;
    let mut dirty = !dir.join(SIDECAR_NAME).exists();

    for name in &listing.files {
        let path = dir.join(name);
        let observed = match HistoryEntry::observe(&path) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("Warning: failed to read {}: {e}", path.display());
                continue;
            },
        };

        match record.head(name).cloned() {
            None => {
                record.insert(name.clone(), FileHistory::single(observed));
                dirty = true;
            },
            Some(head) => {
                if head.digest != observed.digest && !head.digest.is_tombstone() {
                    record.prepend(name, observed);
                    dirty = true;
                } else if head.digest == observed.digest && head.timestamp != observed.timestamp {
                    match head.timestamp.restore(&path) {
                        Ok(()) => repaired += 1,
                        Err(e) => {
                            eprintln!("Warning: failed to restore mtime of {}: {e}", path.display())
                        },
                    }
                }
            },
        }
    }

    if dirty {
        record
            .store(dir)
            .with_context(|| format!("Failed to store sync record in {}", dir.display()))?;
    }

    Ok(Refresh { record, repaired })
}

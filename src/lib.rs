//! Bidirectional directory synchronization with a per-file history trail.
//!
//! Two directories are reconciled symmetrically: neither side is the
//! source. Each directory carries a `.sync` sidecar recording, per file, a
//! newest-first list of `(timestamp, digest)` observations; the reconciler
//! uses those histories to tell stale copies from conflicts, propagate
//! deletions as tombstones, and revive files re-created after a delete.

pub mod hash;
pub mod io;
pub mod reconcile;
pub mod record;
pub mod scan;
pub mod sync;
pub mod timestamp;

pub use hash::{hash_bytes, hash_file, Digest, Hasher};
pub use record::{FileHistory, HistoryEntry, Replica, SyncRecord, SIDECAR_NAME};
pub use sync::{sync_pair, SyncStats};
pub use timestamp::ZonedTimestamp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

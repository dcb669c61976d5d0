//! Single-level directory listings.

use std::fs;
use std::io;
use std::path::Path;

/// Contents of one directory level, split into regular files and
/// subdirectories. Both lists are sorted.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// List a directory, skipping names that begin with `.` (which excludes the
/// sidecar). Symlinks count as whatever they resolve to; dangling links and
/// special files are ignored. Non-UTF-8 names cannot be recorded and are
/// skipped with a warning.
pub fn list(dir: &Path) -> io::Result<Listing> {
    let mut listing = Listing::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                eprintln!("Warning: skipping non-UTF-8 name {raw:?} in {}", dir.display());
                continue;
            },
        };
        if name.starts_with('.') {
            continue;
        }

        // fs::metadata follows symlinks
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if metadata.is_file() {
            listing.files.push(name);
        } else if metadata.is_dir() {
            listing.dirs.push(name);
        }
    }

    listing.files.sort();
    listing.dirs.sort();
    Ok(listing)
}

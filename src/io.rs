//! Filesystem primitives: streaming copy with timestamp preservation and
//! whole-subtree copies.

use crate::record::SIDECAR_NAME;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

// 256KB: optimal for modern SSD throughput
const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Copy a file's bytes and carry its access and modification times along
/// (`copy2` semantics). The write is streamed through a bounded buffer and
/// synced before the timestamps are applied.
pub fn copy_file_with_mtime(source: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;

    let source_file = File::open(source)?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    io::copy(&mut reader, &mut writer)?;

    writer.flush()?;
    writer.into_inner()?.sync_all()?;

    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(dest, atime, mtime)
}

/// Copy a whole subtree: every non-hidden regular file and subdirectory,
/// plus each directory's sidecar so the copied tree keeps its history.
/// Other hidden entries stay behind, matching what the engine syncs.
///
/// Returns the number of non-sidecar files copied.
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<usize> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        let hidden = name.to_string_lossy().starts_with('.');
        if hidden && name != SIDECAR_NAME {
            continue;
        }

        let from = entry.path();
        let to = dest.join(&name);
        let metadata = match fs::metadata(&from) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };

        if metadata.is_dir() {
            copied += copy_tree(&from, &to)?;
        } else if metadata.is_file() {
            copy_file_with_mtime(&from, &to)?;
            if !hidden {
                copied += 1;
            }
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_preserves_bytes_and_mtime() -> io::Result<()> {
        let src_dir = tempdir()?;
        let dst_dir = tempdir()?;
        let source = src_dir.path().join("source.txt");
        let dest = dst_dir.path().join("dest.txt");

        fs::write(&source, b"payload")?;
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(&source, stamp, stamp)?;

        copy_file_with_mtime(&source, &dest)?;

        assert_eq!(fs::read(&dest)?, b"payload");
        let copied_mtime = FileTime::from_last_modification_time(&fs::metadata(&dest)?);
        assert_eq!(copied_mtime.unix_seconds(), 1_600_000_000);
        Ok(())
    }

    #[test]
    fn test_copy_large_file() -> io::Result<()> {
        let src_dir = tempdir()?;
        let source = src_dir.path().join("big.bin");
        let dest = src_dir.path().join("big_copy.bin");

        let data = vec![0x42u8; COPY_BUFFER_SIZE * 2 + 11];
        fs::write(&source, &data)?;

        copy_file_with_mtime(&source, &dest)?;
        assert_eq!(fs::read(&dest)?, data);
        Ok(())
    }

    #[test]
    fn test_copy_tree_creates_a_missing_destination() -> io::Result<()> {
        let src_dir = tempdir()?;
        let dst_dir = tempdir()?;
        let dest = dst_dir.path().join("deeply").join("nested").join("copy");

        fs::write(src_dir.path().join("a.txt"), b"a")?;
        let copied = copy_tree(src_dir.path(), &dest)?;

        assert_eq!(copied, 1);
        assert_eq!(fs::read(dest.join("a.txt"))?, b"a");
        Ok(())
    }

    #[test]
    fn test_copy_tree_carries_sidecar_and_skips_other_hidden() -> io::Result<()> {
        let src_dir = tempdir()?;
        let dst_dir = tempdir()?;
        let dest = dst_dir.path().join("copy");

        fs::write(src_dir.path().join("a.txt"), b"a")?;
        fs::write(src_dir.path().join(SIDECAR_NAME), b"{}")?;
        fs::write(src_dir.path().join(".hidden"), b"no")?;
        fs::create_dir(src_dir.path().join("sub"))?;
        fs::write(src_dir.path().join("sub").join("b.txt"), b"b")?;
        fs::write(src_dir.path().join("sub").join(SIDECAR_NAME), b"{}")?;

        let copied = copy_tree(src_dir.path(), &dest)?;

        assert_eq!(copied, 2);
        assert_eq!(fs::read(dest.join("a.txt"))?, b"a");
        assert_eq!(fs::read(dest.join("sub").join("b.txt"))?, b"b");
        assert!(dest.join(SIDECAR_NAME).exists());
        assert!(dest.join("sub").join(SIDECAR_NAME).exists());
        assert!(!dest.join(".hidden").exists());
        Ok(())
    }
}

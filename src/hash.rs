//! Content digests over streaming SHA-256.
//!
//! A digest is either the SHA-256 of a file's bytes or the tombstone marker
//! for a deleted file. The tombstone is a distinct variant, not a magic hash
//! value, so the reconciler can match on it directly.
//!
//! Files are read in fixed 4 KiB blocks to bound memory regardless of size.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Block size for streaming reads.
const HASH_BLOCK_SIZE: usize = 4096;

/// Textual form of the tombstone variant.
const TOMBSTONE_TOKEN: &str = "deleted";

/// The recorded identity of a file's content at one point in time.
///
/// `Content` holds a SHA-256 and renders as 64 lowercase hex characters;
/// `Tombstone` marks the file as deleted and renders as the literal token
/// `deleted`. The two textual forms are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Digest {
    Content([u8; 32]),
    Tombstone,
}

impl Digest {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Digest::Tombstone)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Digest::Content(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            },
            Digest::Tombstone => f.write_str(TOMBSTONE_TOKEN),
        }
    }
}

/// Error returned when a digest string is neither `deleted` nor 64 lowercase
/// hex characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid digest: {0:?}")]
pub struct ParseDigestError(String);

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == TOMBSTONE_TOKEN {
            return Ok(Digest::Tombstone);
        }
        if s.len() != 64 {
            return Err(ParseDigestError(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| ParseDigestError(s.to_string()))?;
            if pair.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(ParseDigestError(s.to_string()));
            }
            bytes[i] =
                u8::from_str_radix(pair, 16).map_err(|_| ParseDigestError(s.to_string()))?;
        }
        Ok(Digest::Content(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 hasher.
///
/// ## Example
///
/// ```no_run
/// use twinsync::hash::Hasher;
/// use std::path::Path;
///
/// # fn main() -> std::io::Result<()> {
/// let mut hasher = Hasher::new();
/// hasher.hash_file(Path::new("file.txt"))?;
/// let digest = hasher.finalize();
/// println!("{digest}");
/// # Ok(())
/// # }
/// ```
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha256::new() }
    }

    /// Update the hasher with a byte slice.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feed the hasher from a file in fixed 4 KiB blocks.
    pub fn hash_file(&mut self, path: &Path) -> io::Result<()> {
        let mut file = File::open(path)?;
        let mut buffer = [0u8; HASH_BLOCK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            self.inner.update(&buffer[..bytes_read]);
        }

        Ok(())
    }

    /// Consume the hasher and return the content digest.
    pub fn finalize(self) -> Digest {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.inner.finalize());
        Digest::Content(bytes)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a file's bytes and return its content digest.
pub fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut hasher = Hasher::new();
    hasher.hash_file(path)?;
    Ok(hasher.finalize())
}

/// Hash in-memory data and return its content digest.
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_vectors() {
        assert_eq!(hash_bytes(b"").to_string(), EMPTY_SHA256);
        assert_eq!(hash_bytes(b"abc").to_string(), ABC_SHA256);
    }

    #[test]
    fn test_hash_consistency() {
        let data = b"The quick brown fox jumps over the lazy dog";
        assert_eq!(hash_bytes(data), hash_bytes(data));
        assert_ne!(hash_bytes(b"foo"), hash_bytes(b"bar"));
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        let text = hash_bytes(b"test").to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tombstone_round_trip() {
        assert_eq!(Digest::Tombstone.to_string(), "deleted");
        assert_eq!("deleted".parse::<Digest>().unwrap(), Digest::Tombstone);
        assert!(Digest::Tombstone.is_tombstone());
        assert!(!hash_bytes(b"x").is_tombstone());
    }

    #[test]
    fn test_hex_round_trip() {
        let digest = hash_bytes(b"round trip");
        let parsed: Digest = digest.to_string().parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Digest>().is_err());
        assert!("abc".parse::<Digest>().is_err());
        assert!("zz".repeat(32).parse::<Digest>().is_err());
        // Uppercase hex is not the recorded form
        assert!(EMPTY_SHA256.to_uppercase().parse::<Digest>().is_err());
    }

    #[test]
    fn test_serde_string_forms() {
        let digest = hash_bytes(b"abc");
        assert_eq!(serde_json::to_string(&digest).unwrap(), format!("\"{ABC_SHA256}\""));
        assert_eq!(serde_json::to_string(&Digest::Tombstone).unwrap(), "\"deleted\"");

        let back: Digest = serde_json::from_str(&format!("\"{ABC_SHA256}\"")).unwrap();
        assert_eq!(back, digest);
        let tomb: Digest = serde_json::from_str("\"deleted\"").unwrap();
        assert_eq!(tomb, Digest::Tombstone);
    }

    #[test]
    fn test_hash_file_streaming() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        let data = b"streaming hash test data";
        temp_file.write_all(data)?;
        temp_file.flush()?;

        assert_eq!(hash_file(temp_file.path())?, hash_bytes(data));
        Ok(())
    }

    #[test]
    fn test_hash_file_larger_than_block() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        let data = vec![0x42u8; HASH_BLOCK_SIZE * 3 + 7];
        temp_file.write_all(&data)?;
        temp_file.flush()?;

        assert_eq!(hash_file(temp_file.path())?, hash_bytes(&data));
        Ok(())
    }

    #[test]
    fn test_incremental_hashing() {
        let mut hasher = Hasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.finalize(), hash_bytes(b"Hello, World!"));
    }
}

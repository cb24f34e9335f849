use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use engine_logging::engine_debug;
use sha2::{Digest, Sha256};

/// SHA-256 of an asset's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn of_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub fn of_file(path: &Path) -> io::Result<Self> {
        Self::of_reader(File::open(path)?)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Remembers which asset bodies were already stored.
#[derive(Debug, Default)]
pub struct Deduplicator {
    known: HashSet<ContentDigest>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digests every file below `root`. A missing root is an empty set.
    pub fn seed_from(root: &Path) -> io::Result<Self> {
        let mut dedup = Self::new();
        if root.exists() {
            dedup.scan(root)?;
        }
        engine_debug!("Deduplicator seeded with {} files from {}", dedup.len(), root.display());
        Ok(dedup)
    }

    fn scan(&mut self, dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let kind = entry.file_type()?;
            if kind.is_dir() {
                self.scan(&entry.path())?;
            } else if kind.is_file() {
                self.known.insert(ContentDigest::of_file(&entry.path())?);
            }
        }
        Ok(())
    }

    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.known.contains(digest)
    }

    pub fn is_duplicate(&self, bytes: &[u8]) -> bool {
        self.contains(&ContentDigest::of(bytes))
    }

    /// Records `digest`; false when it was already known.
    pub fn remember(&mut self, digest: ContentDigest) -> bool {
        self.known.insert(digest)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{ContentDigest, Deduplicator};

    #[test]
    fn seeded_files_are_duplicates() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mug")).unwrap();
        std::fs::write(dir.path().join("mug/a.webp"), b"same bytes").unwrap();

        let mut dedup = Deduplicator::seed_from(dir.path()).unwrap();
        assert!(dedup.is_duplicate(b"same bytes"));
        assert!(!dedup.is_duplicate(b"other bytes"));
        assert!(dedup.remember(ContentDigest::of(b"other bytes")));
        assert!(!dedup.remember(ContentDigest::of(b"other bytes")));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            ContentDigest::of(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

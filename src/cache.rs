//! Validator cache.
//!
//! The cache is a tree of file fingerprints keyed by path hash.  It is
//! built once at startup by walking `{webroot}/webpages` and replaced
//! wholesale on refresh; a tree is never mutated while workers hold a
//! reference to it.  Workers use entries to answer conditional requests
//! (`If-None-Match` against the content hash, `If-Modified-Since` against
//! the preformatted `Last-Modified` string).
use crate::time::FormatTime;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const HASH_SEED: u32 = 5381;
const HASH_BLOCK_SIZE: usize = 4096;

/// Directories matching this substring are served but never indexed.
const UNCACHED_DIR: &str = "/videos/";

/// Hashes a path string with djb2, `h = h * 33 + c`.
#[must_use]
pub fn hash_path(path: &str) -> u32 {
    let mut hash = HASH_SEED;
    for &byte in path.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
    }
    hash
}

/// Hashes file contents by summing byte values into a 32-bit accumulator,
/// streaming the file in fixed-size blocks.
///
/// # Errors
/// Returns an error when it fails to open or read the file.
pub fn hash_file(path: &Path) -> Result<u32, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hash = HASH_SEED;
    let mut block = [0_u8; HASH_BLOCK_SIZE];
    loop {
        match file.read(&mut block) {
            Ok(0) => return Ok(hash),
            Ok(n) => {
                for &byte in &block[..n] {
                    hash = hash.wrapping_add(u32::from(byte));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// One cacheable file: path, content hash, path hash, and the
/// `Last-Modified` timestamp preformatted as an HTTP-date.
/// Immutable after construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub path: String,
    pub file_hash: u32,
    pub path_hash: u32,
    pub last_modified: Option<String>,
}
impl CacheEntry {
    /// Fingerprints the file at `path`.
    ///
    /// # Errors
    /// Returns an error when it fails to read the file.
    pub fn new(path: &Path) -> Result<Self, std::io::Error> {
        let path_string = path.to_string_lossy().into_owned();
        let file_hash = hash_file(path)?;
        let last_modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(|time| time.http_date())
            .ok();
        Ok(Self {
            path_hash: hash_path(&path_string),
            path: path_string,
            file_hash,
            last_modified,
        })
    }
}

/// Ordered map from path hash to [`CacheEntry`].
#[derive(Debug, Default)]
pub struct CacheTree {
    entries: BTreeMap<u32, CacheEntry>,
}
impl CacheTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Walks `{webroot}/webpages` recursively and fingerprints every
    /// regular file, skipping paths under `/videos/`.  Files that vanish
    /// or fail to read mid-walk are skipped.
    ///
    /// # Errors
    /// Returns an error when the webpages directory cannot be read.
    pub fn build(webroot: &str) -> Result<Self, std::io::Error> {
        let mut files = Vec::new();
        walk(Path::new(&format!("{webroot}/webpages")), &mut files)?;
        let mut tree = Self::new();
        for path in files {
            if path.to_string_lossy().contains(UNCACHED_DIR) {
                continue;
            }
            if let Ok(entry) = CacheEntry::new(&path) {
                tree.insert(entry);
            }
        }
        Ok(tree)
    }

    /// Inserts an entry keyed by its path hash.  A duplicate path hash is
    /// ignored; the first insertion wins.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.entry(entry.path_hash).or_insert(entry);
    }

    /// Point lookup by the hash of `path`.  A hash collision with a
    /// different path is reported as a miss, so colliding files are served
    /// without cache metadata rather than with another file's validators.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&CacheEntry> {
        self.entries
            .get(&hash_path(path))
            .filter(|entry| entry.path == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for dir_entry in std::fs::read_dir(dir)? {
        let path = dir_entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

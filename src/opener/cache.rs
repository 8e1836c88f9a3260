//! Where rewritten batches are stored.
//!
//! ```text
//! <cache_dir>/<archive stem>-<archive key>/classes<N>.zip      rewritten dex, zipped as classes.dex
//! <cache_dir>/<archive stem>-<archive key>/classes<N>.zip.dex  written by the loader
//! ```
//!
//! `N` is the 1-based index of the batch within its archive. A second source
//! opened over the same archive while the first is alive gets its own
//! directory, `<archive stem>-<archive key>-<k>`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use once_cell::sync::Lazy;
use sha1::{Digest, Sha1};

use crate::android::zip::ApkFile;
use crate::error::OpenerError;

/// Cache directories held by live layouts of this process.
static CLAIMED_DIRS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Hex digits of the archive path hash kept in the directory name.
const ARCHIVE_KEY_LEN: usize = 12;

/// Releases its directory when the last layout using it is dropped.
#[derive(Debug)]
struct DirClaim {
    dir: PathBuf,
}

impl DirClaim {
    fn acquire(base: PathBuf) -> DirClaim {
        let mut claimed = CLAIMED_DIRS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dir = base.clone();
        let mut k = 2;
        while claimed.contains(&dir) {
            let mut name = base.as_os_str().to_owned();
            name.push(format!("-{}", k));
            dir = PathBuf::from(name);
            k += 1;
        }
        claimed.insert(dir.clone());
        DirClaim { dir }
    }
}

impl Drop for DirClaim {
    fn drop(&mut self) {
        CLAIMED_DIRS.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.dir);
    }
}

/// The cache directory of one archive.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    claim: Arc<DirClaim>,
}

/// The pair of files of one materialized batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub source: PathBuf,
    pub optimized: PathBuf,
}

impl CacheLayout {
    pub fn for_archive(cache_dir: &Path, archive: &Path) -> CacheLayout {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let absolute = fs::canonicalize(archive).unwrap_or_else(|_| archive.to_path_buf());
        let digest = Sha1::digest(absolute.to_string_lossy().as_bytes());
        let key: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let base = cache_dir.join(format!("{}-{}", stem, &key[..ARCHIVE_KEY_LEN]));
        CacheLayout { claim: Arc::new(DirClaim::acquire(base)) }
    }

    pub fn dir(&self) -> &Path {
        &self.claim.dir
    }

    /// The file names of batch `index`. Nothing is created on disk.
    pub fn entry(&self, index: usize) -> CacheEntry {
        CacheEntry {
            source: self.dir().join(format!("classes{}.zip", index)),
            optimized: self.dir().join(format!("classes{}.zip.dex", index)),
        }
    }
}

impl CacheEntry {
    /// Writes the rewritten dex as the `classes.dex` of the source archive and
    /// clears any optimized file left over from an earlier process.
    pub fn store(&self, dex: Vec<u8>) -> Result<(), OpenerError> {
        let mut archive = ApkFile::new();
        archive.replace_entry("classes.dex", dex)?;
        archive.write_to_file(&self.source)?;
        match fs::remove_file(&self.optimized) {
            Ok(()) => debug!("removed stale {}", self.optimized.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("cached {}", self.source.display());
        Ok(())
    }
}

//! Artifact resolution and per-file transforms
//!
//! An [`Artifact`] is any file referenced by the manifest. It is resolved
//! once against an ordered list of search directories (first match wins)
//! and then carries two names: the `filename` the manifest used to refer
//! to it, which stays fixed and serves as the dedup identity, and the
//! `archived_filename`, which accumulates a suffix for every transform
//! applied (`.zlib`/`.zstd` for compression, `.enc` for encryption).
//! `staged_path` always points at the current bytes, wherever the last
//! transform left them.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::{debug, error};

/// Chunk size for streaming hashes; artifacts can be large disk images.
const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// A manifest-referenced file and its processing state.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Name as referenced by the manifest. Dedup identity; never rewritten.
    pub filename: String,
    /// First search-directory match, if any.
    pub source_path: Option<PathBuf>,
    /// Name inside the output container, extended by transform suffixes.
    pub archived_filename: String,
    /// Current on-disk location of the (possibly transformed) bytes.
    pub staged_path: Option<PathBuf>,
    /// IV recorded when the artifact was encrypted, hex-encoded.
    pub ivt: Option<String>,
}

impl Artifact {
    /// Resolve `filename` against `search_dirs` in order, first match wins.
    ///
    /// Resolution failure is not an error here; callers check [`exists`]
    /// and decide. Hash and size queries on an unresolved artifact return
    /// `None` / 0.
    ///
    /// [`exists`]: Artifact::exists
    pub fn resolve(filename: &str, search_dirs: &[PathBuf]) -> Self {
        let source_path = search_dirs
            .iter()
            .map(|dir| dir.join(filename))
            .find(|candidate| candidate.is_file());

        if let Some(ref path) = source_path {
            debug!(filename, path = %path.display(), "resolved artifact");
        }

        Self {
            filename: filename.to_string(),
            source_path: source_path.clone(),
            archived_filename: filename.to_string(),
            staged_path: source_path,
            ivt: None,
        }
    }

    /// A pseudo-artifact staged at a known path, with no source lookup.
    ///
    /// The manifest and its signature are produced by the pipeline itself
    /// and registered this way before any real artifact is processed.
    pub fn staged(filename: &str, staged_path: PathBuf) -> Self {
        Self {
            filename: filename.to_string(),
            source_path: None,
            archived_filename: filename.to_string(),
            staged_path: Some(staged_path),
            ivt: None,
        }
    }

    /// Whether the resolved source is still present on disk.
    ///
    /// Re-checks the filesystem on every call; the file may have been
    /// removed between resolution and processing.
    pub fn exists(&self) -> bool {
        self.source_path
            .as_deref()
            .is_some_and(|path| path.is_file())
    }

    /// SHA-256 of the current staged bytes, or `None` if there is no
    /// staged file to hash.
    pub fn sha256(&self) -> Option<String> {
        let path = self.staged_path.as_deref()?;
        sha256_file(path).ok()
    }

    /// Size in bytes of the resolved source, 0 if absent.
    pub fn size(&self) -> u64 {
        if !self.exists() {
            return 0;
        }
        self.source_path
            .as_deref()
            .and_then(|path| path.metadata().ok())
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    /// Encrypt the current staged bytes into `dest` with AES-256-CBC.
    ///
    /// Invokes `openssl enc` with the hex key and IV and no salt. Returns
    /// `false` on a missing source or a nonzero exit; the failure is
    /// logged, never raised. Callers decide whether a `false` is fatal.
    pub fn encrypt(&self, dest: &Path, key: &str, iv: &str) -> bool {
        let Some(source) = self.staged_path.as_deref() else {
            error!(filename = %self.filename, "cannot encrypt artifact without a source");
            return false;
        };

        let status = Command::new("openssl")
            .arg("enc")
            .arg("-aes-256-cbc")
            .arg("-in")
            .arg(source)
            .arg("-out")
            .arg(dest)
            .arg("-K")
            .arg(key)
            .arg("-iv")
            .arg(iv)
            .arg("-nosalt")
            .status();

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!(source = %source.display(), %status, "unable to encrypt artifact");
                false
            }
            Err(err) => {
                error!(source = %source.display(), %err, "failed to spawn openssl");
                false
            }
        }
    }
}

/// SHA-256 of a file's contents as a lowercase hex string.
///
/// Streams the file in fixed-size chunks rather than reading it whole.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

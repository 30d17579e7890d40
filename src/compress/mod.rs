//! Compression algorithm allow-list and external compressor invocation
//!
//! Compression is delegated to the system `gzip` and `zstd` tools; the
//! crate treats them as opaque, all-or-nothing operations. A manifest
//! entry selects an algorithm with `compressed: true` (the zlib default)
//! or by naming one explicitly; anything outside the allow-list is a
//! fatal configuration error with its own exit code.

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;

use crate::manifest::Scalar;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("cannot compress {file} with {tool}")]
    ToolFailed { tool: &'static str, file: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zlib,
    Zstd,
}

impl Compression {
    /// Interpret the `compressed` attribute of a manifest entry.
    ///
    /// `true` selects the default algorithm (zlib); a string must name a
    /// supported algorithm. Every other value, including `false`, is
    /// rejected.
    pub fn from_entry(value: &Scalar) -> Result<Self, CompressError> {
        match value {
            Scalar::Bool(true) => Ok(Compression::Zlib),
            Scalar::Str(tag) if tag == "zlib" => Ok(Compression::Zlib),
            Scalar::Str(tag) if tag == "zstd" => Ok(Compression::Zstd),
            Scalar::Str(tag) => Err(CompressError::UnknownAlgorithm(tag.clone())),
            other => Err(CompressError::UnknownAlgorithm(format!("{other:?}"))),
        }
    }

    /// Suffix appended to the archived filename.
    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::Zlib => "zlib",
            Compression::Zstd => "zstd",
        }
    }

    fn tool(&self) -> &'static str {
        match self {
            Compression::Zlib => "gzip",
            Compression::Zstd => "zstd",
        }
    }

    /// Compress `source` into `dest` with the external tool.
    ///
    /// The tool writes to stdout, redirected into `dest`; a nonzero exit
    /// is fatal to the build.
    pub fn compress(&self, source: &Path, dest: &Path) -> Result<(), CompressError> {
        let out = File::create(dest)?;

        let mut command = Command::new(self.tool());
        match self {
            Compression::Zlib => {
                command.args(["-f", "-9", "-n", "-c", "--rsyncable"]);
            }
            Compression::Zstd => {
                command.args(["-z", "-k", "-T0", "-c"]);
            }
        }
        let status = command.arg(source).stdout(out).status()?;

        if !status.success() {
            return Err(CompressError::ToolFailed {
                tool: self.tool(),
                file: source.display().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Stdio;
    use tempfile::TempDir;

    #[test]
    fn test_boolean_true_selects_default_algorithm() {
        let algo = Compression::from_entry(&Scalar::Bool(true)).unwrap();
        assert_eq!(algo, Compression::Zlib);
        assert_eq!(algo.suffix(), "zlib");
    }

    #[test]
    fn test_named_algorithms() {
        assert_eq!(
            Compression::from_entry(&Scalar::Str("zlib".into())).unwrap(),
            Compression::Zlib
        );
        assert_eq!(
            Compression::from_entry(&Scalar::Str("zstd".into())).unwrap(),
            Compression::Zstd
        );
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = Compression::from_entry(&Scalar::Str("lzma".into())).unwrap_err();
        assert!(matches!(err, CompressError::UnknownAlgorithm(tag) if tag == "lzma"));
    }

    #[test]
    fn test_boolean_false_rejected() {
        let err = Compression::from_entry(&Scalar::Bool(false)).unwrap_err();
        assert!(matches!(err, CompressError::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("payload.bin");
        let dest = dir.path().join("payload.bin.zlib");
        fs::write(&source, b"payload payload payload payload").unwrap();

        Compression::Zlib.compress(&source, &dest).unwrap();
        assert!(dest.exists());

        // gzip output starts with the gzip magic
        let compressed = fs::read(&dest).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        // decompressing reproduces the original bytes
        let output = Command::new("gzip")
            .args(["-d", "-c"])
            .arg(&dest)
            .stdout(Stdio::piped())
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"payload payload payload payload");
    }

    #[test]
    fn test_compress_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = Compression::Zlib.compress(
            &dir.path().join("does-not-exist"),
            &dir.path().join("out.zlib"),
        );
        assert!(result.is_err());
    }
}

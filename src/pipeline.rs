//! Package-assembly pipeline
//!
//! Orchestrates one build end to end:
//! - expand template directives and parse the manifest tree
//! - register the manifest (and signature) pseudo-artifacts first
//! - walk the tree, processing each artifact entry exactly once per
//!   distinct filename and rewriting the entry in place
//! - serialize the mutated tree, sign and/or encrypt the manifest
//! - hand every artifact to the container writer in first-seen order
//!
//! All intermediate files live in a scoped temporary directory that is
//! removed on every exit path, including fatal aborts. Processing is
//! strictly sequential; a failing external tool aborts the whole build
//! and the output container is never created.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use rand::Rng;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::artifact::Artifact;
use crate::compress::{CompressError, Compression};
use crate::config::ConfigError;
use crate::manifest::{self, for_each_entry, Mapping, Node, Scalar};
use crate::sign::{SignError, SignTool};
use crate::swu::SwuWriter;
use crate::template::{TemplateEngine, TemplateError, VariableMap};

/// Archived name of the manifest inside the container.
pub const MANIFEST_NAME: &str = "sw-description";

/// Archived name of the detached manifest signature.
pub const SIGNATURE_NAME: &str = "sw-description.sig";

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("{0} must be encrypted, but no encryption key is given")]
    MissingEncryptionKey(String),

    #[error("unable to encrypt {0}")]
    EncryptFailed(String),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("compression error: {0}")]
    Compress(#[from] CompressError),

    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("configuration file error: {0}")]
    ConfigFile(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Get the process exit code for this error.
    ///
    /// Calling automation distinguishes a bad manifest reference (22) and
    /// a bad compression algorithm (23) from generic failures (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::ArtifactNotFound(_) => 22,
            PipelineError::Template(TemplateError::ArtifactNotFound(_)) => 22,
            PipelineError::Compress(CompressError::UnknownAlgorithm(_)) => 23,
            _ => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// One build invocation's configuration, read-only while the build runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the sw-description template.
    pub template: PathBuf,

    /// Path of the SWU container to produce.
    pub output: PathBuf,

    /// Ordered artifact search directories, first match wins.
    pub search_dirs: Vec<PathBuf>,

    /// Template variables.
    pub variables: VariableMap,

    /// Manifest signing backend, if any.
    pub sign: Option<SignTool>,

    /// AES-256 key, hex-encoded.
    pub aes_key: Option<String>,

    /// The run's fixed initial IV, hex-encoded.
    pub first_iv: Option<String>,

    /// Encrypt the serialized manifest itself.
    pub encrypt_manifest: bool,

    /// Global override: skip compression even where entries request it.
    pub no_compress: bool,

    /// Global override: skip encryption even where entries request it.
    pub no_encrypt: bool,

    /// Reuse the fixed initial IV instead of generating one per artifact.
    pub no_ivt: bool,
}

impl PipelineConfig {
    pub fn new(template: PathBuf, output: PathBuf) -> Self {
        Self {
            template,
            output,
            search_dirs: vec![PathBuf::from(".")],
            variables: VariableMap::new(),
            sign: None,
            aes_key: None,
            first_iv: None,
            encrypt_manifest: false,
            no_compress: false,
            no_encrypt: false,
            no_ivt: false,
        }
    }
}

/// Pipeline execution context for one build.
pub struct Pipeline {
    config: PipelineConfig,
    temp: TempDir,
    registry: Vec<Artifact>,
}

impl Pipeline {
    /// Create a pipeline with a fresh scoped temporary directory.
    pub fn new(config: PipelineConfig) -> io::Result<Self> {
        Ok(Self {
            config,
            temp: TempDir::new()?,
            registry: Vec::new(),
        })
    }

    /// The processed artifacts in first-seen order.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.registry
    }

    /// Run the whole build.
    pub fn run(&mut self) -> PipelineResult<()> {
        let raw = fs::read_to_string(&self.config.template)?;

        let expanded = {
            let engine = TemplateEngine::new(&self.config.variables, &self.config.search_dirs);
            engine.expand(&raw)?
        };

        let mut tree = manifest::parse_str(&expanded)?;

        // The manifest and its signature always lead packaging order, so
        // they are registered before any real artifact.
        let manifest_staged = self.temp.path().join(MANIFEST_NAME);
        self.registry
            .push(Artifact::staged(MANIFEST_NAME, manifest_staged.clone()));
        if self.config.sign.is_some() {
            self.registry.push(Artifact::staged(
                SIGNATURE_NAME,
                self.temp.path().join(SIGNATURE_NAME),
            ));
        }

        let software = tree
            .as_mapping_mut()
            .and_then(|map| map.get_mut("software"))
            .ok_or_else(|| {
                PipelineError::Config("manifest has no software section".to_string())
            })?;

        for_each_entry(software, &mut |entry| self.process_entry(entry))?;

        let text = normalize_escapes(&manifest::to_text(&tree)?);
        fs::write(&manifest_staged, &text)?;
        debug!(path = %manifest_staged.display(), "wrote manifest");

        if let Some(tool) = &self.config.sign {
            tool.sign(&manifest_staged, &self.temp.path().join(SIGNATURE_NAME))?;
        }

        if self.config.encrypt_manifest {
            self.encrypt_manifest(&manifest_staged)?;
        }

        self.write_container()
    }

    /// Process one manifest entry, deduplicating on the filename value.
    ///
    /// Repeated references reuse the already-processed artifact; every
    /// entry is rewritten to the final archived name, the hash of the
    /// post-transform bytes, and the recorded IV where applicable.
    fn process_entry(&mut self, entry: &mut Mapping) -> PipelineResult<()> {
        let Some(filename) = entry
            .get("filename")
            .and_then(Node::as_str)
            .map(str::to_string)
        else {
            // not an artifact reference, nothing to do
            return Ok(());
        };

        let index = match self
            .registry
            .iter()
            .position(|artifact| artifact.filename == filename)
        {
            Some(index) => {
                debug!(filename, "artifact already stored");
                index
            }
            None => {
                debug!(filename, "new artifact");
                let artifact = self.process_new_artifact(&filename, entry)?;
                self.registry.push(artifact);
                self.registry.len() - 1
            }
        };

        let artifact = &self.registry[index];
        entry.set("filename", Node::string(artifact.archived_filename.clone()));
        if let Some(sha) = artifact.sha256() {
            entry.set("sha256", Node::string(sha));
        }
        if entry.contains_key("encrypted") {
            if let Some(iv) = &artifact.ivt {
                entry.set("ivt", Node::string(iv.clone()));
            }
        }
        Ok(())
    }

    /// Resolve, compress, and encrypt a first-seen artifact.
    fn process_new_artifact(
        &self,
        filename: &str,
        entry: &Mapping,
    ) -> PipelineResult<Artifact> {
        let mut artifact = Artifact::resolve(filename, &self.config.search_dirs);
        if !artifact.exists() {
            error!(filename, "artifact not found");
            return Err(PipelineError::ArtifactNotFound(filename.to_string()));
        }

        if let Some(value) = entry.get("compressed") {
            if !self.config.no_compress {
                let scalar = value.as_scalar().cloned().unwrap_or(Scalar::Null);
                let algo = Compression::from_entry(&scalar)?;

                let archived = format!("{}.{}", artifact.archived_filename, algo.suffix());
                let staged = self.temp.path().join(&archived);
                let source = artifact
                    .staged_path
                    .clone()
                    .ok_or_else(|| PipelineError::ArtifactNotFound(filename.to_string()))?;
                algo.compress(&source, &staged)?;

                artifact.archived_filename = archived;
                artifact.staged_path = Some(staged);
            }
        }

        if entry.contains_key("encrypted") && !self.config.no_encrypt {
            let key = self
                .config
                .aes_key
                .clone()
                .ok_or_else(|| PipelineError::MissingEncryptionKey(filename.to_string()))?;
            let iv = self.pick_iv()?;

            let archived = format!("{}.enc", artifact.archived_filename);
            let staged = self.temp.path().join(&archived);
            if !artifact.encrypt(&staged, &key, &iv) {
                return Err(PipelineError::EncryptFailed(filename.to_string()));
            }

            artifact.archived_filename = archived;
            artifact.staged_path = Some(staged);
            artifact.ivt = Some(iv);
        }

        Ok(artifact)
    }

    fn pick_iv(&self) -> PipelineResult<String> {
        if self.config.no_ivt {
            self.config.first_iv.clone().ok_or_else(|| {
                PipelineError::Config(
                    "fixed-IV mode requires an iv in the encryption key file".to_string(),
                )
            })
        } else {
            Ok(generate_iv())
        }
    }

    /// Encrypt the serialized manifest in place.
    ///
    /// Always uses the run's fixed initial IV; the decrypting side must
    /// know the IV before it can read the manifest that would otherwise
    /// carry it.
    fn encrypt_manifest(&self, staged: &Path) -> PipelineResult<()> {
        let key = self
            .config
            .aes_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingEncryptionKey(MANIFEST_NAME.to_string()))?;
        let iv = self.config.first_iv.as_deref().ok_or_else(|| {
            PipelineError::Config(
                "manifest encryption requires an iv in the encryption key file".to_string(),
            )
        })?;

        let artifact = Artifact::staged(MANIFEST_NAME, staged.to_path_buf());
        let encrypted = staged.with_extension("enc");
        if !artifact.encrypt(&encrypted, key, iv) {
            return Err(PipelineError::EncryptFailed(MANIFEST_NAME.to_string()));
        }

        // ciphertext replaces the plaintext under the same archived name
        fs::copy(&encrypted, staged)?;
        Ok(())
    }

    /// Write all registered artifacts into the output container.
    ///
    /// The output file is only created once every artifact has been
    /// processed; a failed build never leaves a partial container behind.
    fn write_container(&self) -> PipelineResult<()> {
        let out = File::create(&self.config.output)?;
        let mut writer = SwuWriter::new(BufWriter::new(out));

        for artifact in &self.registry {
            let staged = artifact
                .staged_path
                .as_deref()
                .ok_or_else(|| PipelineError::ArtifactNotFound(artifact.filename.clone()))?;
            writer.append_path(&artifact.archived_filename, staged)?;
        }
        writer.finish()?;

        info!(
            output = %self.config.output.display(),
            artifacts = self.registry.len(),
            "package assembled"
        );
        Ok(())
    }
}

/// Fresh random 16-byte IV, hex-encoded.
pub fn generate_iv() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Reverse the serializer's escaping of newline and tab inside long
/// string attributes (embedded scripts), restoring the literal
/// characters in the written manifest.
pub fn normalize_escapes(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

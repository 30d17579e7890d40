//! swupack - SWU firmware-update package builder
//!
//! This crate assembles an SWU package (a cpio container understood by
//! SWUpdate) from a declarative `sw-description` template and a set of
//! artifact files found on disk. Artifacts referenced by the manifest are
//! deduplicated, optionally compressed and encrypted through external
//! tools, hashed, and written to the container together with the rewritten
//! manifest and an optional detached signature.

pub mod artifact;
pub mod compress;
pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod sign;
pub mod swu;
pub mod template;

pub use artifact::Artifact;
pub use compress::{CompressError, Compression};
pub use manifest::{Mapping, Node, Scalar};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineResult};
pub use sign::{SignError, SignTool};
pub use swu::SwuWriter;
pub use template::{TemplateEngine, TemplateError, VariableMap};

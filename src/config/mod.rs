//! Build configuration inputs
//!
//! Two optional operator-supplied files feed the pipeline: a structured
//! config document whose top-level `variables` mapping becomes the
//! template [`VariableMap`], and a plain-text encryption key file with
//! `key=<hex>` and `iv=<hex>` lines.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::template::VariableMap;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("malformed configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

/// Load the `variables` section of a configuration file.
///
/// Sections other than `variables` are ignored.
pub fn load_variables(path: &Path) -> Result<VariableMap, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config: ConfigFile = serde_yaml::from_str(&text)?;
    for (name, value) in &config.variables {
        debug!(name, value, "configuration variable");
    }
    Ok(config.variables)
}

/// AES key material extracted from the operator-supplied key file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: Option<String>,
    pub iv: Option<String>,
}

/// Parse an encryption key file.
///
/// Lines are matched by substring: any line mentioning `key` sets the
/// key, any line mentioning `iv` sets the IV, with the value taken as the
/// text after the first `=`. Order is irrelevant; later lines win.
pub fn load_key_file(path: &Path) -> Result<KeyMaterial, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut material = KeyMaterial::default();
    for line in text.lines() {
        let value = line.splitn(2, '=').nth(1);
        let Some(value) = value else { continue };

        if line.contains("key") {
            material.key = Some(value.to_string());
        }
        if line.contains("iv") {
            material.iv = Some(value.to_string());
        }
    }
    Ok(material)
}

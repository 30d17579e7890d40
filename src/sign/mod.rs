//! Manifest signing backends
//!
//! The signing strategy is selected on the command line as
//! `<SCHEME>,<args...>` with SCHEME one of CMS, RSA, PKCS11, or CUSTOM.
//! All backends shell out to an external signer over the serialized
//! manifest; a nonzero exit aborts the build.

use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signing selector: {0}")]
    Selector(String),

    #[error("manifest cannot be signed, signing command was `{0}`")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A configured signing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignTool {
    /// CMS/PKCS#7 detached signature via `openssl cms`.
    Cms {
        key: String,
        cert: String,
        passin: Option<String>,
    },
    /// Raw RSA digest signature via `openssl dgst`.
    Rsa { key: String, passin: Option<String> },
    /// Hardware token via `pkcs11-tool`.
    Pkcs11 { pin: String },
    /// Operator-supplied command; receives input and output paths as its
    /// two trailing arguments.
    Custom { command: Vec<String> },
}

impl SignTool {
    /// Parse a `SCHEME,args...` selector.
    ///
    /// Missing required arguments are a fatal startup error.
    pub fn parse(selector: &str) -> Result<Self, SignError> {
        let parts: Vec<&str> = selector.split(',').collect();

        match parts[0] {
            "CMS" => {
                if parts.len() < 3 {
                    return Err(SignError::Selector(
                        "CMS requires a private key and a certificate".to_string(),
                    ));
                }
                Ok(SignTool::Cms {
                    key: parts[1].to_string(),
                    cert: parts[2].to_string(),
                    passin: parts.get(3).map(|s| s.to_string()),
                })
            }
            "RSA" => {
                if parts.len() < 2 {
                    return Err(SignError::Selector(
                        "RSA requires a private key".to_string(),
                    ));
                }
                Ok(SignTool::Rsa {
                    key: parts[1].to_string(),
                    passin: parts.get(2).map(|s| s.to_string()),
                })
            }
            "PKCS11" => {
                if parts.len() < 2 {
                    return Err(SignError::Selector("PKCS11 requires a PIN".to_string()));
                }
                Ok(SignTool::Pkcs11 {
                    pin: parts[1].to_string(),
                })
            }
            "CUSTOM" => {
                let command: Vec<String> = parts[1..]
                    .join(",")
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect();
                if command.is_empty() {
                    return Err(SignError::Selector(
                        "CUSTOM requires a command".to_string(),
                    ));
                }
                Ok(SignTool::Custom { command })
            }
            other => Err(SignError::Selector(format!("unknown scheme: {other}"))),
        }
    }

    /// The full signing command for `input` -> `output`, argv style.
    pub fn command_line(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();

        match self {
            SignTool::Cms { key, cert, passin } => {
                let mut cmd = vec![
                    "openssl".to_string(),
                    "cms".to_string(),
                    "-sign".to_string(),
                    "-in".to_string(),
                    input,
                    "-out".to_string(),
                    output,
                    "-signer".to_string(),
                    cert.clone(),
                    "-inkey".to_string(),
                    key.clone(),
                    "-outform".to_string(),
                    "DER".to_string(),
                    "-nosmimecap".to_string(),
                    "-binary".to_string(),
                ];
                cmd.extend(passin_args(passin.as_deref()));
                cmd
            }
            SignTool::Rsa { key, passin } => {
                let mut cmd = vec![
                    "openssl".to_string(),
                    "dgst".to_string(),
                    "-sha256".to_string(),
                    "-sign".to_string(),
                    key.clone(),
                ];
                cmd.extend(passin_args(passin.as_deref()));
                cmd.extend(["-out".to_string(), output, input]);
                cmd
            }
            SignTool::Pkcs11 { pin } => vec![
                "pkcs11-tool".to_string(),
                "-s".to_string(),
                "-m".to_string(),
                "SHA256-RSA-PKCS".to_string(),
                "-i".to_string(),
                input,
                "-o".to_string(),
                output,
                "--pin".to_string(),
                pin.clone(),
            ],
            SignTool::Custom { command } => {
                let mut cmd = command.clone();
                cmd.push(input);
                cmd.push(output);
                cmd
            }
        }
    }

    /// Sign `input`, writing the detached signature to `output`.
    pub fn sign(&self, input: &Path, output: &Path) -> Result<(), SignError> {
        let argv = self.command_line(input, output);
        let status = Command::new(&argv[0]).args(&argv[1..]).status()?;

        if !status.success() {
            let rendered = argv.join(" ");
            error!(command = %rendered, "signing command failed");
            return Err(SignError::CommandFailed(rendered));
        }
        Ok(())
    }
}

fn passin_args(passin: Option<&str>) -> Vec<String> {
    match passin {
        Some(file) => vec!["-passin".to_string(), format!("file:{file}")],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_cms_with_password_file() {
        let tool = SignTool::parse("CMS,priv.pem,cert.pem,pass.txt").unwrap();
        assert_eq!(
            tool,
            SignTool::Cms {
                key: "priv.pem".into(),
                cert: "cert.pem".into(),
                passin: Some("pass.txt".into()),
            }
        );
    }

    #[test]
    fn test_parse_cms_missing_certificate() {
        let err = SignTool::parse("CMS,priv.pem").unwrap_err();
        assert!(matches!(err, SignError::Selector(_)));
    }

    #[test]
    fn test_parse_rsa() {
        let tool = SignTool::parse("RSA,priv.pem").unwrap();
        assert_eq!(
            tool,
            SignTool::Rsa {
                key: "priv.pem".into(),
                passin: None,
            }
        );
    }

    #[test]
    fn test_parse_rsa_missing_key() {
        assert!(matches!(
            SignTool::parse("RSA").unwrap_err(),
            SignError::Selector(_)
        ));
    }

    #[test]
    fn test_parse_pkcs11() {
        let tool = SignTool::parse("PKCS11,123456").unwrap();
        assert_eq!(tool, SignTool::Pkcs11 { pin: "123456".into() });
    }

    #[test]
    fn test_parse_custom_splits_on_whitespace() {
        let tool = SignTool::parse("CUSTOM,my-signer --hsm slot0").unwrap();
        assert_eq!(
            tool,
            SignTool::Custom {
                command: vec!["my-signer".into(), "--hsm".into(), "slot0".into()],
            }
        );
    }

    #[test]
    fn test_parse_unknown_scheme() {
        assert!(matches!(
            SignTool::parse("GPG,key").unwrap_err(),
            SignError::Selector(_)
        ));
    }

    #[test]
    fn test_cms_command_line() {
        let tool = SignTool::parse("CMS,priv.pem,cert.pem").unwrap();
        let argv = tool.command_line(&PathBuf::from("sw-description"), &PathBuf::from("sw-description.sig"));
        assert_eq!(
            argv,
            vec![
                "openssl", "cms", "-sign", "-in", "sw-description", "-out",
                "sw-description.sig", "-signer", "cert.pem", "-inkey", "priv.pem",
                "-outform", "DER", "-nosmimecap", "-binary",
            ]
        );
    }

    #[test]
    fn test_rsa_command_line_with_passin() {
        let tool = SignTool::parse("RSA,priv.pem,pass.txt").unwrap();
        let argv = tool.command_line(&PathBuf::from("in"), &PathBuf::from("out"));
        assert_eq!(
            argv,
            vec![
                "openssl", "dgst", "-sha256", "-sign", "priv.pem", "-passin",
                "file:pass.txt", "-out", "out", "in",
            ]
        );
    }

    #[test]
    fn test_custom_command_receives_paths() {
        let tool = SignTool::parse("CUSTOM,cp").unwrap();
        let argv = tool.command_line(&PathBuf::from("in"), &PathBuf::from("out"));
        assert_eq!(argv, vec!["cp", "in", "out"]);
    }

    #[test]
    fn test_custom_sign_runs_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("manifest");
        let output = dir.path().join("manifest.sig");
        std::fs::write(&input, "signed content").unwrap();

        let tool = SignTool::parse("CUSTOM,cp").unwrap();
        tool.sign(&input, &output).unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"signed content");
    }

    #[test]
    fn test_failing_sign_command_is_an_error() {
        let tool = SignTool::parse("CUSTOM,false").unwrap();
        let err = tool
            .sign(&PathBuf::from("in"), &PathBuf::from("out"))
            .unwrap_err();
        assert!(matches!(err, SignError::CommandFailed(_)));
    }
}

//! Directive expansion over the raw manifest template
//!
//! The `sw-description` template is ordinary structured-config text
//! interleaved with two directive forms the config grammar knows nothing
//! about: `@@NAME@@` variable placeholders and `$func(args)` calls.
//! Expansion works line by line and must fully complete before the text is
//! handed to the config parser.
//!
//! Variable substitution repeats on each line until no placeholder
//! remains, so adjacent and nested placeholders resolve. Function calls
//! dispatch through a fixed allow-list (`get_sha256`, `get_size`); there
//! is no general expression evaluation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex_lite::Regex;
use thiserror::Error;

use crate::artifact::Artifact;

/// Variable name to replacement text, supplied once at pipeline start.
pub type VariableMap = BTreeMap<String, String>;

/// Errors raised while expanding template directives.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("undefined template variable: {0}")]
    UndefinedVariable(String),

    #[error("unknown template function: {0}")]
    UnknownFunction(String),

    #[error("artifact referenced by directive not found: {0}")]
    ArtifactNotFound(String),
}

/// Line-oriented directive expander.
pub struct TemplateEngine<'a> {
    vars: &'a VariableMap,
    search_dirs: &'a [PathBuf],
    var_re: Regex,
    func_re: Regex,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(vars: &'a VariableMap, search_dirs: &'a [PathBuf]) -> Self {
        Self {
            vars,
            search_dirs,
            var_re: Regex::new(r"^(?P<pre>.*)@@(?P<name>\w+)@@(?P<post>.*)$").unwrap(),
            func_re: Regex::new(r"^(?P<pre>.*)\$(?P<name>\w+)\((?P<args>[^()]*)\)(?P<post>.*)$")
                .unwrap(),
        }
    }

    /// Expand every directive in `text`.
    ///
    /// Lines are processed independently and in order. All variable
    /// placeholders are substituted before any function is evaluated; at
    /// most one function call per line is dispatched.
    pub fn expand(&self, text: &str) -> Result<String, TemplateError> {
        let mut lines: Vec<String> = Vec::new();
        for line in text.lines() {
            lines.push(self.expand_variables(line)?);
        }

        for line in &mut lines {
            *line = self.eval_function(line)?;
        }

        let mut out = lines.join("\n");
        if text.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }

    /// Substitute `@@NAME@@` placeholders until none remain on the line.
    fn expand_variables(&self, line: &str) -> Result<String, TemplateError> {
        let mut line = line.to_string();
        while let Some(caps) = self.var_re.captures(&line) {
            let name = &caps["name"];
            let value = self
                .vars
                .get(name)
                .ok_or_else(|| TemplateError::UndefinedVariable(name.to_string()))?;
            line = format!("{}{}{}", &caps["pre"], value, &caps["post"]);
        }
        Ok(line)
    }

    /// Evaluate the first `$func(args)` call on the line, if any.
    fn eval_function(&self, line: &str) -> Result<String, TemplateError> {
        let Some(caps) = self.func_re.captures(line) else {
            return Ok(line.to_string());
        };
        let result = self.call(&caps["name"], &caps["args"])?;
        Ok(format!("{}{}{}", &caps["pre"], result, &caps["post"]))
    }

    /// Closed dispatch table: function name to built-in handler.
    fn call(&self, name: &str, arg: &str) -> Result<String, TemplateError> {
        match name {
            "get_sha256" => self.artifact_sha256(arg),
            "get_size" => Ok(self.artifact_size(arg)),
            other => Err(TemplateError::UnknownFunction(other.to_string())),
        }
    }

    fn artifact_sha256(&self, filename: &str) -> Result<String, TemplateError> {
        Artifact::resolve(filename, self.search_dirs)
            .sha256()
            .ok_or_else(|| TemplateError::ArtifactNotFound(filename.to_string()))
    }

    fn artifact_size(&self, filename: &str) -> String {
        Artifact::resolve(filename, self.search_dirs).size().to_string()
    }
}

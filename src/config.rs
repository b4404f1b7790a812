//! Analysis settings loaded from a JSON file.
//!
//! Every field is optional; command-line flags of the `infer_tree` binary override what the
//! file says.
//!
//! ```json
//! {
//!   "message_name": "request",
//!   "base_address": 4096,
//!   "refine_padding": true,
//!   "outputs": { "text": true, "dot": "request.dot" },
//!   "log_level": "debug"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print the indented text dump to stdout.
    pub text: bool,
    /// DOT output path; `-` is stdout.
    pub dot: Option<PathBuf>,
    /// JSON snapshot path; `-` is stdout.
    pub json: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub message_name: String,
    pub base_address: u32,
    pub refine_padding: bool,
    pub outputs: OutputConfig,
    pub log_level: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            message_name: "message".to_string(),
            base_address: 0,
            refine_padding: false,
            outputs: OutputConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json(&s)
    }

    /// Tracing level for `log_level`; unknown names fall back to INFO.
    pub fn tracing_level(&self) -> tracing::Level {
        parse_level(&self.log_level)
    }
}

pub fn parse_level(name: &str) -> tracing::Level {
    match name.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = AnalysisConfig::from_json(r#"{ "base_address": 4096 }"#).expect("config");
        assert_eq!(cfg.base_address, 0x1000);
        assert_eq!(cfg.message_name, "message");
        assert!(!cfg.outputs.text);
        assert_eq!(cfg.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn reads_file() {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            f,
            r#"{{"message_name":"req","refine_padding":true,"outputs":{{"dot":"-"}},"log_level":"Debug"}}"#
        )
        .expect("write");
        let cfg = AnalysisConfig::from_file(f.path()).expect("config");
        assert_eq!(cfg.message_name, "req");
        assert!(cfg.refine_padding);
        assert_eq!(cfg.outputs.dot, Some(PathBuf::from("-")));
        assert_eq!(cfg.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(
            AnalysisConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}

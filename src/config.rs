//! `.wirebind.toml` configuration
//!
//! Every field has a default, so an empty file and a missing file behave the
//! same.

use crate::errors::{Fault, Result};
use crate::logging::{file_output, log_config_rejected, parse_level, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = ".wirebind.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub transient: TransientConfig,

    #[serde(default)]
    pub codegen: CodegenConfig,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Leave out methods without a wire mapping instead of failing the load
    #[serde(default = "default_false")]
    pub skip_unsupported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientConfig {
    /// Upper bound on transient bytes per module, from the scratch offset
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Clear wire slots when a frame opens
    #[serde(default = "default_true")]
    pub zero_slots: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Name of the generated bindings struct
    #[serde(default = "default_struct_name")]
    pub struct_name: String,

    /// Path the generated code imports the runtime from
    #[serde(default = "default_crate_name")]
    pub crate_name: String,

    /// Source connected to when the bindings are used without `init`
    #[serde(default = "default_source")]
    pub default_source: String,

    /// Record template fingerprints in the generated header
    #[serde(default = "default_true")]
    pub stamp_fingerprints: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatName {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            skip_unsupported: false,
        }
    }
}

impl Default for TransientConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            zero_slots: true,
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            struct_name: default_struct_name(),
            crate_name: default_crate_name(),
            default_source: default_source(),
            stamp_fingerprints: true,
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatName::default(),
            file: None,
            filter: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_capacity() -> usize { 1 << 20 }
fn default_struct_name() -> String { "Bindings".to_string() }
fn default_crate_name() -> String { "wirebind".to_string() }
fn default_source() -> String { "module.wasm".to_string() }
fn default_level() -> String { "info".to_string() }

impl BindConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Fault::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| Fault::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Fault::Config(format!("Failed to parse config: {}", e)))
    }

    /// Find `.wirebind.toml` in `start` or its parents.
    ///
    /// The nearest file wins. A file that exists but does not parse is an
    /// error rather than a silent fallback to defaults.
    pub fn discover_from(start: &Path) -> Result<Self> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path).map_err(|err| {
                    log_config_rejected(&config_path, &err.to_string());
                    err
                });
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(Self::default())
    }

    /// Find configuration from the current directory upward
    pub fn discover() -> Result<Self> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)
            .map_err(|e| Fault::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Fault::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Default configuration as TOML text
    pub fn generate_default() -> String {
        Self::default().to_toml().unwrap_or_default()
    }

    /// Logging settings for `init_logging`
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::default()
            .with_level(parse_level(&self.log.level).unwrap_or(tracing::Level::INFO))
            .with_format(match self.log.format {
                LogFormatName::Pretty => LogFormat::Pretty,
                LogFormatName::Compact => LogFormat::Compact,
                LogFormatName::Json => LogFormat::Json,
            });
        if let Some(path) = &self.log.file {
            config = config.with_output(file_output(path));
        }
        if let Some(filter) = &self.log.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

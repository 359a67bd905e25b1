//! Loading server configuration (upload limits + converter selection) from TOML.
//!
//! The file is optional; its path comes from `QTI_CONFIG_PATH`. Every key has a
//! default, so an empty file or a missing section is fine.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

use crate::convert::{BuiltinProvider, CommandProvider, ConversionInvoker, ConversionProvider};

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
  #[serde(default)]
  pub upload: UploadCfg,
  #[serde(default)]
  pub converter: ConverterCfg,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadCfg {
  /// Reject uploads whose name does not end in `.txt` before converting.
  pub require_txt_extension: bool,
  /// Request body limit in bytes.
  pub max_upload_bytes: usize,
  /// Parent of the per-request working directories (OS temp dir if unset).
  pub work_root: Option<PathBuf>,
}

impl Default for UploadCfg {
  fn default() -> Self {
    Self { require_txt_extension: true, max_upload_bytes: 2 * 1024 * 1024, work_root: None }
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConverterCfg {
  pub timeout_secs: u64,
  /// Show the converter's own error text to users instead of a generic notice.
  pub expose_diagnostics: bool,
  pub provider: ProviderCfg,
}

impl Default for ConverterCfg {
  fn default() -> Self {
    Self { timeout_secs: 30, expose_diagnostics: true, provider: ProviderCfg::Builtin }
  }
}

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderCfg {
  #[default]
  Builtin,
  Command {
    program: String,
    #[serde(default)]
    args: Vec<String>,
  },
}

impl ConverterCfg {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }

  /// Build the invoker. A command provider without a program falls back to builtin.
  pub fn build_invoker(&self) -> ConversionInvoker {
    let provider: Arc<dyn ConversionProvider> = match &self.provider {
      ProviderCfg::Command { program, args } if !program.trim().is_empty() => {
        info!(target: "qti_converter", %program, ?args, "Using external converter command");
        Arc::new(CommandProvider::new(program.clone(), args.clone()))
      }
      ProviderCfg::Command { .. } => {
        error!(target: "qti_converter", "Converter command is empty; using builtin converter");
        Arc::new(BuiltinProvider)
      }
      ProviderCfg::Builtin => Arc::new(BuiltinProvider),
    };
    ConversionInvoker::new(provider, self.timeout(), self.expose_diagnostics)
  }
}

pub fn parse_config(s: &str) -> Result<ServerConfig, toml::de::Error> {
  toml::from_str::<ServerConfig>(s)
}

/// Load `ServerConfig` from QTI_CONFIG_PATH. On any parsing/IO error, falls back to defaults.
pub fn load_config_from_env() -> ServerConfig {
  let Ok(path) = std::env::var("QTI_CONFIG_PATH") else {
    info!(target: "qti_converter", "QTI_CONFIG_PATH not set; using default configuration");
    return ServerConfig::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "qti_converter", %path, "Loaded server config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "qti_converter", %path, error = %e, "Failed to parse TOML config");
        ServerConfig::default()
      }
    },
    Err(e) => {
      error!(target: "qti_converter", %path, error = %e, "Failed to read TOML config file");
      ServerConfig::default()
    }
  }
}

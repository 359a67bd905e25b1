//! Conversion invoker: hand a staged quiz file to a provider, bound the call
//! with a timeout, and load the archive it produced.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
  body::Bytes,
  http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
  response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use crate::error::ConvertError;
use crate::util::header_safe_filename;
use crate::workdir::StagedInput;

pub mod builtin;
pub mod command;

pub use builtin::BuiltinProvider;
pub use command::CommandProvider;

/// Turns a quiz text file into a QTI archive next to it.
///
/// Implementations treat each call independently and must only write inside
/// the input's parent directory. Work that can outlive a dropped call must
/// hold a clone of `input` until it stops touching the directory.
#[async_trait]
pub trait ConversionProvider: Send + Sync {
  fn name(&self) -> &'static str;

  /// Returns the path of the produced archive.
  async fn convert(&self, input: &StagedInput) -> Result<PathBuf, ConvertError>;
}

/// A finished archive, loaded into memory so the working directory can go.
#[derive(Debug)]
pub struct Archive {
  pub name: String,
  pub bytes: Bytes,
}

impl IntoResponse for Archive {
  fn into_response(self) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", header_safe_filename(&self.name));
    (
      [(CONTENT_TYPE, "application/zip".to_string()), (CONTENT_DISPOSITION, disposition)],
      self.bytes,
    )
      .into_response()
  }
}

#[derive(Clone)]
pub struct ConversionInvoker {
  provider: Arc<dyn ConversionProvider>,
  timeout: Duration,
  expose_diagnostics: bool,
}

impl ConversionInvoker {
  pub fn new(provider: Arc<dyn ConversionProvider>, timeout: Duration, expose_diagnostics: bool) -> Self {
    Self { provider, timeout, expose_diagnostics }
  }

  pub fn provider_name(&self) -> &'static str {
    self.provider.name()
  }

  pub fn expose_diagnostics(&self) -> bool {
    self.expose_diagnostics
  }

  /// Run the provider on `input` and read back a non-empty archive.
  #[instrument(level = "info", skip_all, fields(provider = self.provider.name(), input = %input.path().display()))]
  pub async fn convert(&self, input: &StagedInput) -> Result<Archive, ConvertError> {
    let archive_path = tokio::time::timeout(self.timeout, self.provider.convert(input))
      .await
      .map_err(|_| ConvertError::TimedOut(self.timeout))??;

    let bytes = tokio::fs::read(&archive_path).await.map_err(ConvertError::Io)?;
    if bytes.is_empty() {
      return Err(ConvertError::EmptyArchive);
    }
    let name = archive_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .ok_or(ConvertError::ArchiveMissing)?;
    info!(target: "conversion", archive = %name, size = bytes.len(), "Archive ready");
    Ok(Archive { name, bytes: Bytes::from(bytes) })
  }
}

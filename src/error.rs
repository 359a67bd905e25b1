//! Error taxonomy for one conversion request and its rendering as an HTTP response.
//!
//! Every failure is caught at the request boundary and turned into either the
//! upload page with an inline message, or a small JSON body for API clients.

use std::{io, time::Duration};

use axum::{
  extract::multipart::MultipartError,
  http::{header::ACCEPT, HeaderMap, StatusCode},
  response::{Html, IntoResponse, Response},
  Json,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::protocol::ErrorOut;
use crate::routes::page::render_index;
use crate::util::trunc_for_log;

/// Shown instead of converter diagnostics when those are not exposed.
pub const FORMATTING_ISSUE: &str =
  "Formatting issue detected. Please check your .txt file structure and try again.";

/// Shown for server-side failures whose details (paths, OS errors) stay in the logs.
pub const PROCESSING_FAILED: &str = "The converter could not process this file. Please try again.";

#[derive(Debug, Error)]
pub enum ConvertError {
  #[error("no file was uploaded in the `file` field")]
  MissingFile,

  #[error("only one file may be uploaded per request")]
  MultipleFiles,

  #[error("invalid multipart request: {0}")]
  Multipart(#[from] MultipartError),

  #[error("invalid upload filename")]
  InvalidFilename,

  #[error("`{filename}` is not a .txt file")]
  UnsupportedFileType { filename: String },

  #[error("failed to stage upload: {0}")]
  Staging(#[source] io::Error),

  #[error("failed to launch converter: {0}")]
  Launch(#[source] io::Error),

  /// The converter ran and rejected the input.
  #[error("{diagnostics}")]
  ConversionFailed { diagnostics: String },

  #[error("conversion timed out after {}s", .0.as_secs())]
  TimedOut(Duration),

  #[error("QTI archive not found")]
  ArchiveMissing,

  #[error("conversion produced more than one archive: {}", .0.join(", "))]
  AmbiguousArchive(Vec<String>),

  #[error("conversion produced an empty archive")]
  EmptyArchive,

  #[error("failed to build QTI package: {0}")]
  Packaging(String),

  #[error("archive I/O failed: {0}")]
  Io(#[source] io::Error),

  #[error("conversion task failed: {0}")]
  Internal(String),
}

impl ConvertError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      ConvertError::MissingFile
      | ConvertError::MultipleFiles
      | ConvertError::InvalidFilename
      | ConvertError::UnsupportedFileType { .. } => StatusCode::BAD_REQUEST,
      ConvertError::Multipart(e) => e.status(),
      ConvertError::Staging(_)
      | ConvertError::Launch(_)
      | ConvertError::ConversionFailed { .. }
      | ConvertError::TimedOut(_)
      | ConvertError::ArchiveMissing
      | ConvertError::AmbiguousArchive(_)
      | ConvertError::EmptyArchive
      | ConvertError::Packaging(_)
      | ConvertError::Io(_)
      | ConvertError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable machine-readable code for JSON clients.
  pub fn code(&self) -> &'static str {
    match self {
      ConvertError::MissingFile => "missing_file",
      ConvertError::MultipleFiles => "multiple_files",
      ConvertError::Multipart(_) => "invalid_multipart",
      ConvertError::InvalidFilename => "invalid_filename",
      ConvertError::UnsupportedFileType { .. } => "unsupported_file_type",
      ConvertError::ConversionFailed { .. } => "conversion_failed",
      ConvertError::TimedOut(_) => "conversion_timeout",
      ConvertError::ArchiveMissing => "archive_not_found",
      ConvertError::AmbiguousArchive(_) => "archive_ambiguous",
      ConvertError::EmptyArchive => "archive_empty",
      ConvertError::Staging(_)
      | ConvertError::Launch(_)
      | ConvertError::Packaging(_)
      | ConvertError::Io(_)
      | ConvertError::Internal(_) => "internal_error",
    }
  }

  /// User-safe message. Paths and OS errors never reach the client.
  pub fn user_message(&self, expose_diagnostics: bool) -> String {
    match self {
      ConvertError::ConversionFailed { diagnostics } if expose_diagnostics => diagnostics.clone(),
      ConvertError::ConversionFailed { .. } => FORMATTING_ISSUE.to_string(),
      ConvertError::Multipart(e) => format!("Invalid upload: {}", e.body_text()),
      ConvertError::TimedOut(_) => {
        format!("{self}. The quiz file may be too large or malformed.")
      }
      ConvertError::ArchiveMissing => "QTI archive not found.".to_string(),
      ConvertError::Staging(_)
      | ConvertError::Launch(_)
      | ConvertError::Packaging(_)
      | ConvertError::Io(_)
      | ConvertError::Internal(_) => PROCESSING_FAILED.to_string(),
      other => capitalize(&other.to_string()),
    }
  }

  fn log(&self) {
    match self {
      ConvertError::ConversionFailed { diagnostics } => {
        warn!(target: "conversion", diagnostics = %trunc_for_log(diagnostics, 512), "Converter rejected the upload");
      }
      e if e.status_code().is_server_error() => {
        error!(target: "conversion", error = %e, code = e.code(), "Conversion request failed");
      }
      e => {
        debug!(target: "conversion", error = %e, code = e.code(), "Upload rejected");
      }
    }
  }

  /// Log, then render in the format the client asked for.
  pub fn render(&self, format: ErrorFormat, expose_diagnostics: bool) -> Response {
    self.log();
    let status = self.status_code();
    let message = self.user_message(expose_diagnostics);
    match format {
      ErrorFormat::Json => {
        (status, Json(ErrorOut { error: self.code(), message })).into_response()
      }
      ErrorFormat::Html => (status, Html(render_index(Some(&message)))).into_response(),
    }
  }
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// How the client wants failures reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorFormat {
  Html,
  Json,
}

impl ErrorFormat {
  pub fn from_headers(headers: &HeaderMap) -> Self {
    let wants_json = headers
      .get_all(ACCEPT)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .any(|v| v.contains("application/json"));
    if wants_json { ErrorFormat::Json } else { ErrorFormat::Html }
  }
}

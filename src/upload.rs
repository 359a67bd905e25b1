//! Upload gateway: pull the single `file` part out of a multipart request and
//! validate its name before anything touches the disk.

use std::path::Path;

use axum::{body::Bytes, extract::Multipart};
use tracing::{debug, instrument};

use crate::error::ConvertError;

pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct Upload {
  /// Final path component of the client-supplied name.
  pub filename: String,
  pub content_type: Option<String>,
  pub bytes: Bytes,
}

impl Upload {
  /// Read the request body. Fields other than `file` are skipped.
  #[instrument(level = "debug", skip_all)]
  pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, ConvertError> {
    let mut upload: Option<Upload> = None;
    while let Some(field) = multipart.next_field().await? {
      if field.name() != Some(FILE_FIELD) {
        debug!(target: "qti_converter", field = ?field.name(), "Skipping multipart field");
        continue;
      }
      if upload.is_some() {
        return Err(ConvertError::MultipleFiles);
      }
      let raw_name = field.file_name().unwrap_or_default().to_string();
      let content_type = field.content_type().map(str::to_owned);
      let bytes = field.bytes().await?;
      // Browsers send an empty filename when no file was picked.
      if raw_name.trim().is_empty() {
        return Err(ConvertError::MissingFile);
      }
      let filename = sanitize_filename(&raw_name)?;
      upload = Some(Upload { filename, content_type, bytes });
    }
    upload.ok_or(ConvertError::MissingFile)
  }

  pub fn check_extension(&self, require_txt: bool) -> Result<(), ConvertError> {
    if require_txt && !has_txt_extension(&self.filename) {
      return Err(ConvertError::UnsupportedFileType { filename: self.filename.clone() });
    }
    Ok(())
  }
}

pub fn has_txt_extension(name: &str) -> bool {
  name.len() > 4 && name.to_ascii_lowercase().ends_with(".txt")
}

/// Reduce a client filename to a bare name that stays inside the working directory.
///
/// Names whose stem is `.` or `..` (`..txt`) are refused: the archive derived
/// from them would not be a file in the same directory.
pub fn sanitize_filename(raw: &str) -> Result<String, ConvertError> {
  let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
  if base.is_empty() || base == "." || base == ".." {
    return Err(ConvertError::InvalidFilename);
  }
  if matches!(Path::new(base).file_stem().and_then(|s| s.to_str()), Some(".") | Some("..")) {
    return Err(ConvertError::InvalidFilename);
  }
  Ok(base.chars().map(|c| if c.is_control() { '_' } else { c }).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_directories_from_client_names() {
    assert_eq!(sanitize_filename("quiz.txt").unwrap(), "quiz.txt");
    assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
    assert_eq!(sanitize_filename(r"C:\Users\me\quiz 1.txt").unwrap(), "quiz 1.txt");
    assert!(matches!(sanitize_filename("dir/.."), Err(ConvertError::InvalidFilename)));
    assert!(matches!(sanitize_filename("trailing/"), Err(ConvertError::InvalidFilename)));
  }

  #[test]
  fn dot_only_stems_are_refused() {
    assert!(matches!(sanitize_filename("..txt"), Err(ConvertError::InvalidFilename)));
    assert!(matches!(sanitize_filename("dir/...txt"), Err(ConvertError::InvalidFilename)));
    assert_eq!(sanitize_filename(".quiz.txt").unwrap(), ".quiz.txt");
    assert_eq!(sanitize_filename("a..txt").unwrap(), "a..txt");
  }

  #[test]
  fn extension_check_is_case_insensitive() {
    assert!(has_txt_extension("quiz.txt"));
    assert!(has_txt_extension("QUIZ.TXT"));
    assert!(!has_txt_extension(".txt"));
    assert!(!has_txt_extension("quiz.txt.zip"));
    assert!(!has_txt_extension("quiz"));
  }

  #[test]
  fn extension_check_can_be_disabled() {
    let upload = Upload { filename: "quiz.md".into(), content_type: None, bytes: Bytes::new() };
    assert!(matches!(
      upload.check_extension(true),
      Err(ConvertError::UnsupportedFileType { ref filename }) if filename == "quiz.md"
    ));
    assert!(upload.check_extension(false).is_ok());
  }
}

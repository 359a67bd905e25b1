//! In-process provider: parse the quiz and write the QTI package next to it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use super::ConversionProvider;
use crate::error::ConvertError;
use crate::parser::parse_quiz;
use crate::qti::Package;
use crate::workdir::{derived_archive_path, StagedInput};

#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinProvider;

#[async_trait]
impl ConversionProvider for BuiltinProvider {
  fn name(&self) -> &'static str {
    "builtin"
  }

  async fn convert(&self, input: &StagedInput) -> Result<PathBuf, ConvertError> {
    // The clone keeps the directory alive until the blocking work is done,
    // even if this call is dropped by the invoker's timeout.
    let input = input.clone();
    let created = Utc::now().format("%Y-%m-%d").to_string();
    tokio::task::spawn_blocking(move || convert_file(input.path(), &created))
      .await
      .map_err(|e| ConvertError::Internal(e.to_string()))?
  }
}

/// Blocking body of the conversion. The archive is always `<stem>.zip`.
#[instrument(level = "debug", skip(created))]
pub fn convert_file(input: &Path, created: &str) -> Result<PathBuf, ConvertError> {
  let raw = std::fs::read(input).map_err(ConvertError::Io)?;
  let source = String::from_utf8(raw).map_err(|e| ConvertError::ConversionFailed {
    diagnostics: format!("file is not valid UTF-8 text (invalid byte at offset {})", e.utf8_error().valid_up_to()),
  })?;
  let quiz = parse_quiz(&source).map_err(|e| ConvertError::ConversionFailed { diagnostics: e.to_string() })?;

  let fallback_title = input
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "Quiz".into());
  let package = Package::new(&quiz, &fallback_title);
  let bytes = package.to_zip(created).map_err(|e| ConvertError::Packaging(e.to_string()))?;

  let out = derived_archive_path(input).ok_or(ConvertError::InvalidFilename)?;
  std::fs::write(&out, &bytes).map_err(ConvertError::Io)?;
  debug!(
    target: "conversion",
    questions = quiz.questions.len(),
    assessment = package.assessment_id(),
    size = bytes.len(),
    "QTI package written"
  );
  Ok(out)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::workdir::WorkDir;

  #[tokio::test]
  async fn writes_zip_beside_input() {
    let work = WorkDir::create(None).unwrap();
    let input = work.stage_str("week1.txt", "1. What is 2+3?\na) 6\nb) 1\n*c) 5\n");

    let out = BuiltinProvider.convert(&input).await.unwrap();
    assert_eq!(out, work.path().join("week1.zip"));
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"PK"));
  }

  #[test]
  fn same_content_converts_to_identical_archives() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    std::fs::write(&a, "Quiz title: Same\n1. Q\n*a) True\nb) False\n").unwrap();
    let first = std::fs::read(convert_file(&a, "2026-10-19").unwrap()).unwrap();
    let second = std::fs::read(convert_file(&a, "2026-10-19").unwrap()).unwrap();
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn malformed_input_reports_diagnostics_and_writes_nothing() {
    let work = WorkDir::create(None).unwrap();
    let input = work.stage_str("bad.txt", "1. Q\na) x\nb) y\n");

    let err = BuiltinProvider.convert(&input).await.unwrap_err();
    match err {
      ConvertError::ConversionFailed { diagnostics } => assert!(diagnostics.starts_with("line 1:"), "{diagnostics}"),
      other => panic!("unexpected: {other:?}"),
    }
    assert!(!work.path().join("bad.zip").exists());
  }

  #[tokio::test]
  async fn empty_and_binary_files_fail() {
    let work = WorkDir::create(None).unwrap();
    let empty = work.stage_str("empty.txt", "");
    assert!(matches!(
      BuiltinProvider.convert(&empty).await,
      Err(ConvertError::ConversionFailed { .. })
    ));

    std::fs::write(work.path().join("bin.txt"), [0xff, 0xfe, 0x00]).unwrap();
    let err = convert_file(&work.path().join("bin.txt"), "2026-10-19").unwrap_err();
    assert!(err.to_string().contains("UTF-8"), "{err}");
  }

  #[test]
  fn dot_stem_input_is_refused_instead_of_escaping() {
    let work = WorkDir::create(None).unwrap();
    let input = work.stage_str("..txt", "1. Q\n___\n");
    assert!(matches!(convert_file(input.path(), "2026-10-19"), Err(ConvertError::InvalidFilename)));
  }

  #[tokio::test]
  async fn abandoned_conversion_still_removes_its_directory() {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::create(Some(root.path())).unwrap();
    let input = work.stage_str("quiz.txt", "1. What is 2+3?\na) 6\nb) 1\n*c) 5\n");

    // A zero timeout drops the call after the blocking task has been spawned.
    let _ = tokio::time::timeout(Duration::ZERO, BuiltinProvider.convert(&input)).await;
    drop(input);
    drop(work);

    for _ in 0..500 {
      if std::fs::read_dir(root.path()).unwrap().count() == 0 {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("working directory was left behind");
  }
}

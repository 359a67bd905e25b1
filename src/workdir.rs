//! Request-scoped working directory and archive discovery.
//!
//! A `WorkDir` owns a fresh temporary directory. The directory and everything
//! in it are removed once the `WorkDir` and every `StagedInput` staged into it
//! are dropped, so every exit path of a request cleans up, including a
//! conversion that outlives its request after a timeout.

use std::{
  ffi::OsString,
  path::{Path, PathBuf},
  sync::Arc,
};

use tempfile::TempDir;
use tracing::{debug, instrument};

use crate::error::ConvertError;
use crate::upload::Upload;

const DIR_PREFIX: &str = "qti-";

#[derive(Debug)]
pub struct WorkDir {
  dir: Arc<TempDir>,
}

/// A file staged into a [`WorkDir`]. Holding one keeps the directory alive.
#[derive(Clone, Debug)]
pub struct StagedInput {
  path: PathBuf,
  _dir: Arc<TempDir>,
}

impl StagedInput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl WorkDir {
  /// Create a directory under `root`, or under the OS temp dir when `None`.
  pub fn create(root: Option<&Path>) -> Result<Self, ConvertError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(DIR_PREFIX);
    let dir = match root {
      Some(root) => builder.tempdir_in(root),
      None => builder.tempdir(),
    }
    .map_err(ConvertError::Staging)?;
    debug!(target: "qti_converter", path = %dir.path().display(), "Working directory created");
    Ok(Self { dir: Arc::new(dir) })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Write the upload verbatim into the directory.
  #[instrument(level = "debug", skip_all, fields(filename = %upload.filename, size = upload.bytes.len()))]
  pub async fn stage(&self, upload: &Upload) -> Result<StagedInput, ConvertError> {
    let path = self.path().join(&upload.filename);
    tokio::fs::write(&path, &upload.bytes).await.map_err(ConvertError::Staging)?;
    Ok(StagedInput { path, _dir: Arc::clone(&self.dir) })
  }
}

#[cfg(test)]
impl WorkDir {
  pub fn stage_str(&self, name: &str, body: &str) -> StagedInput {
    let path = self.path().join(name);
    std::fs::write(&path, body).unwrap();
    StagedInput { path, _dir: Arc::clone(&self.dir) }
  }
}

/// `quiz.txt` → `quiz.zip`, in the same directory.
///
/// `None` when the stem could not name a file of its own (`..txt` has the
/// stem `.`).
pub fn derived_archive_path(input: &Path) -> Option<PathBuf> {
  let stem = input.file_stem()?;
  if stem.is_empty() || stem == "." || stem == ".." {
    return None;
  }
  let mut name = OsString::from(stem);
  name.push(".zip");
  Some(input.with_file_name(name))
}

/// Find the archive a converter left next to `input`.
///
/// The derived name wins. Otherwise exactly one other `*.zip` in the directory
/// is accepted; none is "archive not found" and several is an ambiguity error.
#[instrument(level = "debug", skip_all, fields(input = %input.display()))]
pub async fn locate_archive(input: &Path) -> Result<PathBuf, ConvertError> {
  if let Some(derived) = derived_archive_path(input).filter(|d| d != input) {
    if is_file(&derived).await? {
      return Ok(derived);
    }
  }

  let dir = input.parent().ok_or(ConvertError::ArchiveMissing)?;
  let mut entries = tokio::fs::read_dir(dir).await.map_err(ConvertError::Io)?;
  let mut found: Vec<String> = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(ConvertError::Io)? {
    let path = entry.path();
    if path == input || !entry.file_type().await.map_err(ConvertError::Io)?.is_file() {
      continue;
    }
    let name = entry.file_name().to_string_lossy().into_owned();
    if name.to_ascii_lowercase().ends_with(".zip") {
      found.push(name);
    }
  }
  found.sort();

  match found.len() {
    0 => Err(ConvertError::ArchiveMissing),
    1 => Ok(dir.join(&found[0])),
    _ => Err(ConvertError::AmbiguousArchive(found)),
  }
}

async fn is_file(path: &Path) -> Result<bool, ConvertError> {
  match tokio::fs::metadata(path).await {
    Ok(meta) => Ok(meta.is_file()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(ConvertError::Io(e)),
  }
}

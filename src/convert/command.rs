//! Subprocess provider: run an external converter such as `text2qti`.
//!
//! The staged path is passed as the last argument and the working directory
//! is the current directory. The child is killed if the call is dropped
//! (e.g. by the invoker's timeout).

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::ConversionProvider;
use crate::error::ConvertError;
use crate::workdir::{locate_archive, StagedInput};

#[derive(Clone, Debug)]
pub struct CommandProvider {
  program: String,
  args: Vec<String>,
}

impl CommandProvider {
  pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
    Self { program: program.into(), args }
  }
}

#[async_trait]
impl ConversionProvider for CommandProvider {
  fn name(&self) -> &'static str {
    "command"
  }

  #[instrument(level = "debug", skip(self), fields(program = %self.program))]
  async fn convert(&self, input: &StagedInput) -> Result<PathBuf, ConvertError> {
    let input = input.path();
    let dir = input.parent().ok_or(ConvertError::ArchiveMissing)?;
    let output = Command::new(&self.program)
      .args(&self.args)
      .arg(input)
      .current_dir(dir)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(ConvertError::Launch)?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      let diagnostics = if stderr.is_empty() {
        format!("converter exited with {}", output.status)
      } else {
        stderr
      };
      return Err(ConvertError::ConversionFailed { diagnostics });
    }
    debug!(target: "conversion", stdout_len = output.stdout.len(), "Converter finished");
    locate_archive(input).await
  }
}

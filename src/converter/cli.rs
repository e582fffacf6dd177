//! Local command-line conversion engines: `mmdc` (Mermaid CLI),
//! ImageMagick `magick` and `pandoc`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ConversionError, ConversionRequest, Converter, Engine, Format};
use crate::config::ConverterConfig;

/// Longest stderr excerpt kept in a [`ConversionError::Failed`]
const MAX_STDERR: usize = 512;

/// Converter that shells out to locally installed tools
#[derive(Debug, Clone)]
pub struct CliConverter {
    mmdc_bin: String,
    magick_bin: String,
    pandoc_bin: String,
    timeout: Duration,
}

impl CliConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            mmdc_bin: config.mmdc_bin.clone(),
            magick_bin: config.magick_bin.clone(),
            pandoc_bin: config.pandoc_bin.clone(),
            timeout: config.timeout(),
        }
    }

    fn command(&self, request: &ConversionRequest, input: &Path, output: &Path) -> Command {
        let mut cmd = match request.engine {
            Engine::Diagram => {
                let mut cmd = Command::new(&self.mmdc_bin);
                cmd.arg("-i").arg(input).arg("-o").arg(output).args(["-b", "transparent"]);
                cmd
            }
            Engine::Image => {
                let mut cmd = Command::new(&self.magick_bin);
                cmd.arg(input).arg(output);
                cmd
            }
            Engine::Document => {
                let mut cmd = Command::new(&self.pandoc_bin);
                cmd.args(["-f", request.from.name()]);
                // pandoc picks the PDF writer from the output extension
                if request.to != Format::Pdf {
                    cmd.args(["-t", request.to.name()]);
                }
                cmd.arg("-o").arg(output).arg(input);
                cmd
            }
        };
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        cmd
    }

    fn program(&self, engine: Engine) -> &str {
        match engine {
            Engine::Diagram => &self.mmdc_bin,
            Engine::Image => &self.magick_bin,
            Engine::Document => &self.pandoc_bin,
        }
    }

    /// Run one conversion with its input and output files under `workdir`
    async fn run_in(
        &self,
        workdir: &Path,
        request: ConversionRequest,
    ) -> Result<Vec<u8>, ConversionError> {
        let input = workdir.join(format!("input.{}", request.from.extension()));
        let output = workdir.join(format!("output.{}", request.to.extension()));
        tokio::fs::write(&input, &request.source).await?;

        let program = self.program(request.engine).to_string();
        debug!(program = %program, from = %request.from, to = %request.to, "Running converter");

        let child = self.command(&request, &input, &output).output();
        let result = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    program = %program,
                    timeout_secs = self.timeout.as_secs(),
                    "Converter timed out"
                );
                return Err(ConversionError::Timeout {
                    engine: request.engine,
                    after: self.timeout,
                });
            }
        };

        let out = result.map_err(|e| ConversionError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let mut message: String = stderr.trim().chars().take(MAX_STDERR).collect();
            if message.is_empty() {
                message = format!("{} exited with {}", program, out.status);
            }
            return Err(ConversionError::Failed { engine: request.engine, message });
        }

        let bytes = tokio::fs::read(&output).await.map_err(|e| {
            ConversionError::Malformed(format!("{} produced no output: {}", program, e))
        })?;
        if bytes.is_empty() {
            return Err(ConversionError::Malformed(format!("{} produced an empty file", program)));
        }
        Ok(bytes)
    }
}

/// Create a scratch directory off the async worker threads
async fn scratch_dir() -> Result<TempDir, ConversionError> {
    tokio::task::spawn_blocking(|| tempfile::Builder::new().prefix("pageplane-").tempdir())
        .await
        .map_err(|e| ConversionError::Io(std::io::Error::other(e)))?
        .map_err(ConversionError::Io)
}

#[async_trait]
impl Converter for CliConverter {
    async fn convert(&self, request: ConversionRequest) -> Result<Vec<u8>, ConversionError> {
        let workdir = scratch_dir().await?;
        let result = self.run_in(workdir.path(), request).await;

        match tokio::task::spawn_blocking(move || workdir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Failed to remove converter scratch directory"),
            Err(e) => debug!(error = %e, "Scratch directory cleanup task failed"),
        }
        result
    }

    fn backend_name(&self) -> &'static str {
        "cli"
    }
}

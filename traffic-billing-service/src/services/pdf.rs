use async_trait::async_trait;
use service_core::error::AppError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Turns a rendered HTML invoice into PDF bytes.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, AppError>;
}

/// Pipes HTML through the `wkhtmltopdf` executable (stdin → stdout).
#[derive(Clone)]
pub struct WkhtmltopdfConverter {
    program: String,
    timeout: Duration,
}

impl WkhtmltopdfConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn args() -> [&'static str; 6] {
        ["--quiet", "--encoding", "utf-8", "--enable-local-file-access", "-", "-"]
    }
}

#[async_trait]
impl PdfConverter for WkhtmltopdfConverter {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, AppError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %self.program,
            html_size = html.len(),
            timeout_secs = %self.timeout.as_secs(),
            "Converting invoice HTML to PDF"
        );

        let mut child = cmd.spawn().map_err(|e| {
            AppError::BadGateway(format!("Failed to start {}: {}", self.program, e))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::BadGateway("PDF converter stdin unavailable".to_string()))?;
        let input = html.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::BadGateway(format!(
                    "PDF conversion timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                program = %self.program,
                status = %output.status,
                stderr = %stderr,
                "PDF conversion failed"
            );
            return Err(AppError::BadGateway(format!(
                "PDF conversion failed: {}",
                stderr.trim()
            )));
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AppError::BadGateway(format!(
                    "Failed to send HTML to {}: {}",
                    self.program, e
                )))
            }
            Err(e) => return Err(AppError::InternalError(anyhow::anyhow!(e))),
        }

        if output.stdout.is_empty() {
            return Err(AppError::BadGateway(
                "PDF converter produced no output".to_string(),
            ));
        }

        tracing::debug!(
            program = %self.program,
            output_size = output.stdout.len(),
            "PDF conversion succeeded"
        );

        Ok(output.stdout)
    }
}

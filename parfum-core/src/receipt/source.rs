use crate::error::{FunnelError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use uuid::Uuid;

/// Turns an uploaded receipt document into raw text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, file_name: &str, document: &[u8]) -> Result<String>;
}

/// Runs an external program on the stored document and reads its stdout.
///
/// The document path is passed as the last argument.
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandExtractor {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        work_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            timeout,
        }
    }

    async fn store(&self, file_name: &str, document: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let safe_name: String = file_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        let path = self
            .work_dir
            .join(format!("{}_{}", Uuid::new_v4(), safe_name));

        tokio::fs::write(&path, document).await?;
        Ok(path)
    }
}

#[async_trait]
impl TextExtractor for CommandExtractor {
    async fn extract_text(&self, file_name: &str, document: &[u8]) -> Result<String> {
        let path = self.store(file_name, document).await?;
        tracing::info!("Receipt saved: {}", path.display());

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                FunnelError::timeout(format!(
                    "text extraction exceeded {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| FunnelError::extraction(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(FunnelError::extraction(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Hex SHA-256 of the raw document bytes.
pub fn document_digest(document: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(document_digest(b"receipt"), document_digest(b"receipt"));
        assert_ne!(document_digest(b"receipt"), document_digest(b"receipt2"));
        assert_eq!(document_digest(b"").len(), 64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_returned() {
        let dir = tempdir().unwrap();
        let extractor = CommandExtractor::new("cat", vec![], dir.path(), Duration::from_secs(5));

        let text = extractor
            .extract_text("check 1.pdf", b"['a', 'b']")
            .await
            .unwrap();
        assert_eq!(text, "['a', 'b']");

        let stored: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(stored.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_extraction_error() {
        let dir = tempdir().unwrap();
        let extractor = CommandExtractor::new("false", vec![], dir.path(), Duration::from_secs(5));

        let err = extractor.extract_text("r.pdf", b"x").await.unwrap_err();
        assert!(matches!(err, FunnelError::Extraction(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let dir = tempdir().unwrap();
        let extractor = CommandExtractor::new(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            dir.path(),
            Duration::from_millis(100),
        );

        let err = extractor.extract_text("r.pdf", b"x").await.unwrap_err();
        assert!(matches!(err, FunnelError::Timeout(_)));
    }
}

//! Tesseract OCR engine.

use std::io;

use tokio::process::Command;

use super::{Recognizer, RecognizerError};
use crate::{
    async_utils::check_for_command_failure, cpu_limit::with_cpu_semaphore, prelude::*,
};

/// Recognizer wrapping the `tesseract` CLI tool.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct Tesseract {}

impl Tesseract {
    /// Create a new `tesseract` recognizer.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl Recognizer for Tesseract {
    #[instrument(level = "debug", skip_all, fields(image = %image.display(), language))]
    async fn recognize(
        &self,
        image: &Path,
        language: &str,
    ) -> Result<String, RecognizerError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .kill_on_drop(true);

        let result = with_cpu_semaphore(|| async move { cmd.output().await })
            .await
            .map_err(RecognizerError::Unavailable)?;
        let output = result.map_err(classify_spawn_error)?;

        // A process killed by a signal was probably a victim of memory pressure
        // or a shutdown, not of a bad image.
        if !output.status.success() && output.status.code().is_none() {
            return Err(RecognizerError::Unavailable(anyhow!(
                "tesseract was terminated by a signal"
            )));
        }
        check_for_command_failure("tesseract", &output, None)
            .map_err(RecognizerError::Failed)?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Decide whether a failure to start `tesseract` is worth retrying.
fn classify_spawn_error(err: io::Error) -> RecognizerError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            RecognizerError::Failed(
                anyhow::Error::new(err).context("cannot run tesseract (is it installed?)"),
            )
        }
        _ => RecognizerError::Unavailable(
            anyhow::Error::new(err).context("cannot start tesseract"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use crate::retry::IsKnownTransient as _;

    use super::*;

    #[test]
    fn missing_binary_is_not_retried() {
        let err = classify_spawn_error(io::Error::from(io::ErrorKind::NotFound));
        assert!(!err.is_known_transient());
        assert!(err.to_string().contains("is it installed"));
    }

    #[test]
    fn resource_exhaustion_is_retried() {
        let err = classify_spawn_error(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_known_transient());
    }

    #[tokio::test]
    #[ignore = "Requires tesseract to be installed"]
    async fn unreadable_images_fail() {
        let dir = tempfile::TempDir::with_prefix("tesseract-test").unwrap();
        let image = dir.path().join("page.png");
        tokio::fs::write(&image, "not an image").await.unwrap();
        let err = Tesseract::new().recognize(&image, "eng").await.unwrap_err();
        assert!(matches!(err, RecognizerError::Failed(_)));
    }
}

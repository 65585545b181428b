//! Local Tesseract OCR, the last step of every fallback chain.

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::TesseractSettings;

#[derive(Debug, Clone)]
pub struct Tesseract {
    binary: String,
    language: String,
}

impl Tesseract {
    pub fn new(settings: &TesseractSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            language: settings.language.clone(),
        }
    }

    /// Run the CLI on a PNG and return stdout as-is.
    pub async fn recognize(&self, png: &[u8]) -> Result<String> {
        let input_path = std::env::temp_dir().join(format!("ocr_input_{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&input_path, png)
            .await
            .context("Failed to write temp image for tesseract")?;

        info!("Tesseract: running {} on {} bytes", self.binary, png.len());
        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            debug!("Tesseract: could not remove {:?}: {}", input_path, e);
        }

        let output = output.with_context(|| format!("Failed to run {}", self.binary))?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let tesseract = Tesseract::new(&TesseractSettings {
            binary: "definitely-not-a-real-tesseract-binary".to_string(),
            language: "eng".to_string(),
        });

        let err = tesseract.recognize(b"png").await.unwrap_err();
        assert!(err.to_string().contains("Failed to run"));
    }
}

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use std::io::Write;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub const OCR_FAILED: &str = "[OCR failed]";

const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

pub fn is_image(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Text extraction from images: Tesseract first, EasyOCR as the fallback.
#[derive(Debug, Clone)]
pub struct OcrTool {
    tesseract_cmd: String,
    fallback_cmd: String,
}

impl OcrTool {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            tesseract_cmd: config.tesseract_cmd.clone(),
            fallback_cmd: config.fallback_cmd.clone(),
        }
    }

    /// Extracted text, or [`OCR_FAILED`] when neither engine succeeds.
    pub async fn extract_text(&self, image: &[u8]) -> String {
        match self.run_tesseract(image).await {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => debug!("tesseract found no text, trying fallback"),
            Err(e) => warn!(error = %e, "tesseract failed, trying fallback"),
        }

        match self.run_fallback(image).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "fallback OCR failed");
                OCR_FAILED.into()
            }
        }
    }

    async fn run_tesseract(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.tesseract_cmd)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ocr(format!("spawn {}: {e}", self.tesseract_cmd)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::ocr(format!(
                "{} exited with {}: {}",
                self.tesseract_cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_fallback(&self, image: &[u8]) -> Result<String> {
        // EasyOCR's CLI only reads from a file path.
        let mut file = tempfile::Builder::new()
            .prefix("smartdesk-ocr-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        let output = Command::new(&self.fallback_cmd)
            .args(["-l", "en", "--detail", "0", "--paragraph", "True", "-f"])
            .arg(file.path())
            .output()
            .await
            .map_err(|e| Error::ocr(format!("spawn {}: {e}", self.fallback_cmd)))?;

        if !output.status.success() {
            return Err(Error::ocr(format!(
                "{} exited with {}",
                self.fallback_cmd, output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(primary: &str, fallback: &str) -> OcrTool {
        OcrTool::new(&OcrConfig {
            tesseract_cmd: primary.into(),
            fallback_cmd: fallback.into(),
        })
    }

    #[test]
    fn image_detection_is_case_insensitive() {
        assert!(is_image("scan.PNG"));
        assert!(is_image("photo.jpeg"));
        assert!(!is_image("notes.pdf"));
        assert!(!is_image("png"));
    }

    #[tokio::test]
    async fn both_engines_missing_returns_sentinel() {
        let ocr = tool("smartdesk-no-such-tesseract", "smartdesk-no-such-easyocr");
        assert_eq!(ocr.extract_text(b"not an image").await, OCR_FAILED);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn falls_back_when_primary_missing() {
        // `echo` stands in for the fallback CLI and prints its arguments.
        let ocr = tool("smartdesk-no-such-tesseract", "echo");
        let text = ocr.extract_text(b"bytes").await;
        assert!(text.contains("--detail 0"));
        assert!(text.contains("smartdesk-ocr-"));
    }
}

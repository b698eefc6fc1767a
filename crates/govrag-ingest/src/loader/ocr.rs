//! OCR for scanned PDF pages.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use govrag_core::LoaderError;

/// Recognizes the text of a single PDF page.
pub trait OcrEngine: Send + Sync {
    /// `page` is 1-based.
    fn recognize_page(&self, pdf: &Path, page: u32) -> Result<String, LoaderError>;
}

/// Shells out to `pdftoppm` (poppler) to rasterize and `tesseract` to recognize.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    pub language: String,
    pub dpi: u32,
    pub pdftoppm_bin: PathBuf,
    pub tesseract_bin: PathBuf,
}

impl TesseractCli {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            dpi: 300,
            pdftoppm_bin: PathBuf::from("pdftoppm"),
            tesseract_bin: PathBuf::from("tesseract"),
        }
    }

    fn unavailable(pdf: &Path, reason: impl std::fmt::Display) -> LoaderError {
        LoaderError::OcrUnavailable {
            path: pdf.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn run(&self, pdf: &Path, command: &mut Command, tool: &Path) -> Result<Vec<u8>, LoaderError> {
        let output = command.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Self::unavailable(pdf, format!("{} is not installed", tool.display()))
            } else {
                Self::unavailable(pdf, format!("{} failed to start: {}", tool.display(), e))
            }
        })?;
        if !output.status.success() {
            return Err(Self::unavailable(
                pdf,
                format!(
                    "{} exited with {}: {}",
                    tool.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(output.stdout)
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("por+eng")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize_page(&self, pdf: &Path, page: u32) -> Result<String, LoaderError> {
        let workdir = tempfile::tempdir().map_err(|e| Self::unavailable(pdf, e))?;
        let prefix = workdir.path().join("page");
        let page_arg = page.to_string();

        self.run(
            pdf,
            Command::new(&self.pdftoppm_bin)
                .arg("-f")
                .arg(&page_arg)
                .arg("-l")
                .arg(&page_arg)
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg("-png")
                .arg("-singlefile")
                .arg(pdf)
                .arg(&prefix),
            &self.pdftoppm_bin,
        )?;

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(Self::unavailable(pdf, format!("page {} was not rasterized", page)));
        }

        let stdout = self.run(
            pdf,
            Command::new(&self.tesseract_bin)
                .arg(&image)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language),
            &self.tesseract_bin,
        )?;
        let text = String::from_utf8_lossy(&stdout).into_owned();
        debug!(
            "OCR page {} of {}: {} chars",
            page,
            pdf.display(),
            text.chars().count()
        );
        Ok(text)
    }
}

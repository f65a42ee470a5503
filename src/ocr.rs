//! OCR engines for scanned PDFs.
//!
//! The default engine shells out to Poppler's `pdftoppm` to rasterize each
//! page and to `tesseract` to recognize it. A missing binary is reported as
//! [`ExtractError::MissingDependency`] so callers can degrade gracefully.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::extract::ExtractError;

/// Recognizes the text of a PDF rendered as images.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// One raw (unnormalized) string per page, in page order.
    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// Used when `[ocr] enabled = false`.
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn name(&self) -> &str {
        "disabled"
    }

    fn recognize_pdf(&self, _path: &Path) -> Result<Vec<String>, ExtractError> {
        Err(ExtractError::MissingDependency(
            "OCR is disabled in configuration".to_string(),
        ))
    }
}

pub struct TesseractOcr {
    tesseract_cmd: String,
    pdftoppm_cmd: String,
    language: String,
    dpi: u32,
    scratch_root: PathBuf,
}

impl TesseractOcr {
    /// `scratch_root` receives one temporary directory per recognized PDF,
    /// removed once recognition finishes.
    pub fn from_config(config: &OcrConfig, scratch_root: &Path) -> Self {
        Self {
            tesseract_cmd: config.tesseract_cmd.clone(),
            pdftoppm_cmd: config.pdftoppm_cmd.clone(),
            language: config.language.clone(),
            dpi: config.dpi,
            scratch_root: scratch_root.to_path_buf(),
        }
    }

    fn recognize_in(&self, path: &Path, scratch: &Path) -> Result<Vec<String>, ExtractError> {
        let prefix = scratch.join("page");
        run_tool(
            Command::new(&self.pdftoppm_cmd)
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg("-png")
                .arg(path)
                .arg(&prefix),
            &self.pdftoppm_cmd,
        )?;

        let mut images: Vec<(u32, PathBuf)> = std::fs::read_dir(scratch)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension() == Some(OsStr::new("png")))
            .filter_map(|p| page_number(&p).map(|n| (n, p)))
            .collect();
        images.sort_by_key(|(n, _)| *n);

        let total = images.len();
        let mut pages = Vec::with_capacity(total);
        for (i, (_, image)) in images.iter().enumerate() {
            info!("OCR processing page {}/{}", i + 1, total);
            let output = run_tool(
                Command::new(&self.tesseract_cmd)
                    .arg(image)
                    .arg("stdout")
                    .arg("-l")
                    .arg(&self.language),
                &self.tesseract_cmd,
            )?;
            pages.push(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        Ok(pages)
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let scratch = self
            .scratch_root
            .join(format!("ocr-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&scratch)?;

        let result = self.recognize_in(path, &scratch);
        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            debug!(dir = %scratch.display(), error = %e, "failed to remove OCR scratch dir");
        }
        result
    }
}

/// `pdftoppm` names its output `page-1.png` or `page-01.png` depending on
/// page count; sort on the parsed number, not the file name.
fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('-')?;
    digits.parse().ok()
}

fn run_tool(cmd: &mut Command, program: &str) -> Result<Output, ExtractError> {
    match cmd.output() {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            ExtractError::MissingDependency(format!("`{}` not found on PATH", program)),
        ),
        Err(e) => Err(ExtractError::Io(e)),
        Ok(out) if !out.status.success() => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(ExtractError::ExtractionFailure(format!(
                "{} exited with {}: {}",
                program,
                out.status,
                stderr.trim()
            )))
        }
        Ok(out) => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn page_numbers_parse_padded_and_unpadded() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/cover.png")), None);
    }

    #[test]
    fn missing_binary_is_missing_dependency() {
        let tmp = TempDir::new().unwrap();
        let config = OcrConfig {
            pdftoppm_cmd: "docrag-no-such-pdftoppm".to_string(),
            ..OcrConfig::default()
        };
        let ocr = TesseractOcr::from_config(&config, tmp.path());
        let err = ocr.recognize_pdf(&tmp.path().join("scan.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::MissingDependency(ref m) if m.contains("docrag-no-such-pdftoppm")));

        // scratch dir cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn disabled_engine_reports_missing_dependency() {
        let err = DisabledOcr.recognize_pdf(Path::new("a.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::MissingDependency(_)));
    }
}

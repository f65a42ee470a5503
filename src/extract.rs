//! Text extraction for uploaded documents (PDF, DOCX, TXT, Markdown).
//!
//! [`Extractor::extract`] returns an ordered list of [`ExtractedPage`]s:
//! one entry per physical page for PDFs, a single unlabeled entry for
//! every other format. All text passes through
//! [`normalize_text`](crate::normalize::normalize_text).
//!
//! PDFs whose text layer is nearly empty are treated as scanned documents
//! and handed to the configured [`OcrEngine`]. An OCR failure yields an
//! empty page list instead of an error so the rest of a batch keeps going.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::normalize::normalize_text;
use crate::ocr::OcrEngine;

/// Per-file extraction error. The ingestion pipeline logs it and skips the file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Formats the extractor understands, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    /// `.txt`, `.md`, `.markdown`
    PlainText,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" | "md" | "markdown" => Ok(DocumentFormat::PlainText),
            "" => Err(ExtractError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Normalized text of one page (PDF) or of a whole document (other formats).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// 1-based physical page number; `None` for formats without pages.
    pub page: Option<u32>,
    pub text: String,
}

pub struct Extractor {
    ocr: Box<dyn OcrEngine>,
    ocr_min_chars: usize,
}

impl Extractor {
    pub fn new(ocr: Box<dyn OcrEngine>, ocr_min_chars: usize) -> Self {
        Self { ocr, ocr_min_chars }
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        match DocumentFormat::from_path(path)? {
            DocumentFormat::Pdf => self.extract_pdf(path),
            DocumentFormat::Docx => {
                let bytes = std::fs::read(path)?;
                Ok(vec![ExtractedPage {
                    page: None,
                    text: normalize_text(&extract_docx(&bytes)?),
                }])
            }
            DocumentFormat::PlainText => {
                let bytes = std::fs::read(path)?;
                Ok(vec![ExtractedPage {
                    page: None,
                    text: normalize_text(&String::from_utf8_lossy(&bytes)),
                }])
            }
        }
    }

    fn extract_pdf(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let pages: Vec<ExtractedPage> = read_pdf_pages(path)?
            .iter()
            .enumerate()
            .map(|(i, raw)| ExtractedPage {
                page: Some(i as u32 + 1),
                text: normalize_text(raw),
            })
            .collect();

        let total_chars = total_text_chars(&pages);
        if total_chars >= self.ocr_min_chars {
            debug!(path = %path.display(), pages = pages.len(), chars = total_chars, "read PDF text layer");
            return Ok(pages);
        }

        warn!(
            path = %path.display(),
            chars = total_chars,
            "PDF appears to be image-based, attempting OCR with {}",
            self.ocr.name()
        );
        match self.ocr.recognize_pdf(path) {
            Ok(ocr_pages) => {
                let pages: Vec<ExtractedPage> = ocr_pages
                    .iter()
                    .enumerate()
                    .map(|(i, raw)| ExtractedPage {
                        page: Some(i as u32 + 1),
                        text: normalize_text(raw),
                    })
                    .collect();
                info!(
                    path = %path.display(),
                    chars = total_text_chars(&pages),
                    "OCR completed"
                );
                Ok(pages)
            }
            Err(ExtractError::MissingDependency(dep)) => {
                warn!(path = %path.display(), "OCR not available ({}), returning no content for this PDF", dep);
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "OCR failed, returning no content for this PDF");
                Ok(Vec::new())
            }
        }
    }
}

/// Character count of all page texts joined with single spaces.
fn total_text_chars(pages: &[ExtractedPage]) -> usize {
    let joined = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    joined.trim().chars().count()
}

/// Read the raw text layer of every page. pdf-extract can panic on
/// malformed fonts, so panics are reported as extraction failures.
fn read_pdf_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::ExtractionFailure(format!("PDF: {}", e))),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractError::ExtractionFailure(format!(
                "PDF parser panicked: {}",
                msg
            )))
        }
    }
}

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
#[cfg(feature = "docx")]
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Paragraph texts of a DOCX joined with spaces.
#[cfg(feature = "docx")]
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::ExtractionFailure(format!("DOCX: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::ExtractionFailure("DOCX: word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut doc_xml)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::ExtractionFailure(
            "DOCX: word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraph_text(&doc_xml)
}

#[cfg(not(feature = "docx"))]
fn extract_docx(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::MissingDependency(
        "DOCX support not compiled in (enable the `docx` feature)".to_string(),
    ))
}

/// Walk `w:p` paragraphs, concatenating their `w:t` runs. Tabs and breaks
/// become spaces; paragraphs are separated by a space.
#[cfg(feature = "docx")]
fn docx_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::ExtractionFailure(format!("DOCX: {}", e)))?;
                out.push_str(text.as_ref());
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" | b"br" | b"cr" => out.push(' '),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push(' '),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::ExtractionFailure(format!("DOCX: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DisabledOcr;
    use std::fs;
    use tempfile::TempDir;

    fn extractor() -> Extractor {
        Extractor::new(Box::new(DisabledOcr), 100)
    }

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("/x/Report.PDF")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.Markdown")).unwrap(),
            DocumentFormat::PlainText
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.docx")).unwrap(),
            DocumentFormat::Docx
        );
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = DocumentFormat::from_path(Path::new("sheet.xlsx")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(ref e) if e == ".xlsx"));
        let err = DocumentFormat::from_path(Path::new("Makefile")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn text_file_is_single_unlabeled_page() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        fs::write(&path, "# Title\n\nSome   body\ttext.\n").unwrap();

        let pages = extractor().extract(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, None);
        assert_eq!(pages[0].text, "# Title Some body text.");
    }

    #[test]
    fn invalid_pdf_is_extraction_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();

        let err = extractor().extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailure(_)));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn invalid_zip_is_extraction_failure_for_docx() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailure(_)));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn docx_runs_join_and_paragraphs_separate() {
        let xml = br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t><w:tab/><w:t>para &amp; more</w:t></w:r></w:p></w:body></w:document>"#;
        let text = docx_paragraph_text(xml).unwrap();
        assert_eq!(normalize_text(&text), "Hello world Second para & more");
    }
}

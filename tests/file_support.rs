//! Multi-format ingestion: PDF pages, OCR fallback, DOCX, plain text.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use docrag::cache::ContentCache;
use docrag::chunk::SentenceSplitter;
use docrag::config::IngestionConfig;
use docrag::embedding::DisabledProvider;
use docrag::extract::{ExtractError, Extractor};
use docrag::ingest::{FileStatus, Ingestor, SkipReason};
use docrag::ocr::{DisabledOcr, OcrEngine};
use docrag::progress::NoProgress;
use tempfile::TempDir;

/// Minimal PDF with one page per entry. Empty entries become pages with no
/// text operators. Offsets in the xref table are computed while writing.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<String> = Vec::new();

    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
    for (i, text) in pages.iter().enumerate() {
        let contents = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
            contents
        ));
        let stream = if text.is_empty() {
            "q Q".to_string()
        } else {
            format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text)
        };
        objects.push(format!(
            "<< /Length {} >> stream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Returns canned page text instead of running tesseract.
struct CannedOcr(Vec<&'static str>);

impl OcrEngine for CannedOcr {
    fn name(&self) -> &str {
        "canned"
    }

    fn recognize_pdf(&self, _path: &Path) -> Result<Vec<String>, ExtractError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

fn ingestor(cache_dir: &Path, ocr: Box<dyn OcrEngine>, ocr_min_chars: usize) -> Ingestor {
    let cache = ContentCache::open(cache_dir).unwrap();
    let splitter = SentenceSplitter::from_config(&IngestionConfig::default()).unwrap();
    Ingestor::new(
        cache,
        Extractor::new(ocr, ocr_min_chars),
        splitter,
        Box::new(DisabledProvider),
        32,
    )
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn pdf_blank_page_produces_no_chunks() {
    let tmp = TempDir::new().unwrap();
    let pdf = write(
        tmp.path(),
        "report.pdf",
        &pdf_with_pages(&["Quarterly revenue grew twelve percent", "", "Rainfall stayed flat"]),
    );
    let mut ing = ingestor(&tmp.path().join("cache"), Box::new(DisabledOcr), 10);

    let report = ing.ingest(&[pdf], false, &NoProgress);
    assert_eq!(report.processed(), 1);

    let pages: Vec<Option<&str>> = report.nodes.iter().map(|c| c.page_label.as_deref()).collect();
    assert_eq!(pages, vec![Some("1"), Some("3")]);
    assert!(report.nodes[0].text.contains("revenue"));
    assert!(report.nodes[1].text.contains("Rainfall"));
    assert!(report.nodes.iter().all(|c| c.chunk_index == 0));
}

#[test]
fn pdf_cache_hit_preserves_page_labels() {
    let tmp = TempDir::new().unwrap();
    let pdf = write(
        tmp.path(),
        "report.pdf",
        &pdf_with_pages(&["First page text here", "Second page text here"]),
    );
    let cache_dir = tmp.path().join("cache");

    let first = ingestor(&cache_dir, Box::new(DisabledOcr), 10).ingest(&[pdf.clone()], false, &NoProgress);
    let second = ingestor(&cache_dir, Box::new(DisabledOcr), 10).ingest(&[pdf], false, &NoProgress);

    assert_eq!(first.processed(), 1);
    assert_eq!(second.cache_hits(), 1);
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn image_only_pdf_uses_ocr() {
    let tmp = TempDir::new().unwrap();
    let pdf = write(tmp.path(), "scan.pdf", &pdf_with_pages(&["", ""]));
    let ocr = CannedOcr(vec!["Scanned invoice total is due in May.", "  "]);
    let mut ing = ingestor(&tmp.path().join("cache"), Box::new(ocr), 100);

    let report = ing.ingest(&[pdf], false, &NoProgress);
    assert_eq!(report.processed(), 1);
    assert_eq!(report.nodes.len(), 1);
    assert_eq!(report.nodes[0].page_label.as_deref(), Some("1"));
    assert!(report.nodes[0].text.contains("invoice"));
}

#[test]
fn image_only_pdf_without_ocr_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let pdf = write(tmp.path(), "scan.pdf", &pdf_with_pages(&[""]));
    let mut ing = ingestor(&tmp.path().join("cache"), Box::new(DisabledOcr), 100);

    let report = ing.ingest(&[pdf], false, &NoProgress);
    assert_eq!(
        report.outcome("scan.pdf").unwrap().status,
        FileStatus::Skipped(SkipReason::NoContent)
    );
    assert!(!ing.check_nodes_exist());
    assert!(ing.cache().is_empty());
}

#[cfg(feature = "docx")]
#[test]
fn docx_paragraphs_are_ingested() {
    let tmp = TempDir::new().unwrap();
    let docx = write(
        tmp.path(),
        "policy.docx",
        &docx_with_paragraphs(&["Remote work is allowed.", "Expenses need approval."]),
    );
    let mut ing = ingestor(&tmp.path().join("cache"), Box::new(DisabledOcr), 100);

    let report = ing.ingest(&[docx], false, &NoProgress);
    assert_eq!(report.processed(), 1);
    let text: String = report.nodes.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
    assert!(text.contains("Remote work is allowed."));
    assert!(text.contains("Expenses need approval."));
    assert!(report.nodes.iter().all(|c| c.page_label.is_none()));
}

#[test]
fn mixed_batch_continues_past_failures() {
    let tmp = TempDir::new().unwrap();
    let good = write(tmp.path(), "notes.md", b"# Notes\n\nThe launch moved to June.");
    let sheet = write(tmp.path(), "budget.xlsx", b"PK");
    let broken = write(tmp.path(), "broken.pdf", b"%PDF-1.4 not really");
    let missing = tmp.path().join("gone.txt");
    let mut ing = ingestor(&tmp.path().join("cache"), Box::new(DisabledOcr), 100);

    let report = ing.ingest(&[sheet, broken, missing, good], false, &NoProgress);
    assert_eq!(report.processed(), 1);
    assert_eq!(report.skipped(), 3);
    assert!(matches!(
        report.outcome("budget.xlsx").unwrap().status,
        FileStatus::Skipped(SkipReason::UnsupportedFormat(_))
    ));
    assert!(matches!(
        report.outcome("broken.pdf").unwrap().status,
        FileStatus::Skipped(SkipReason::ExtractionFailure(_))
    ));
    assert_eq!(
        report.outcome("gone.txt").unwrap().status,
        FileStatus::Skipped(SkipReason::NotFound)
    );
    assert_eq!(ing.ingested_files(), ["notes.md".to_string()]);
}

#[test]
fn cli_add_pdf_and_docx() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config = root.join("docrag.toml");
    fs::write(
        &config,
        format!(
            "[storage]\ndata_dir = \"{}\"\n\n[ingestion]\nocr_min_chars = 10\n\n[ocr]\nenabled = false\n",
            root.join("data").display()
        ),
    )
    .unwrap();
    let pdf = write(root, "report.pdf", &pdf_with_pages(&["Revenue grew in the third quarter"]));

    let output = Command::new(env!("CARGO_BIN_EXE_docrag"))
        .arg("--config")
        .arg(&config)
        .args(["--progress", "off", "add"])
        .arg(&pdf)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("added report.pdf as "));
    assert!(stdout.contains("processed"));

    let output = Command::new(env!("CARGO_BIN_EXE_docrag"))
        .arg("--config")
        .arg(&config)
        .args(["--progress", "off", "nodes"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("_report.pdf  page=1"));
    assert!(stdout.contains("1 nodes"));
}

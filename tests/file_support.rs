//! Multi-format extraction and ingestion.
//!
//! Fixtures are built in memory: DOCX and XLSX as minimal ZIP packages,
//! PDF as a single-page document with correct xref offsets.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use hybrid_query::extract::{extract_bytes, extract_file, DocumentFormat, ExtractError};
use hybrid_query::vector_store::VectorStore;
use hybrid_query_core::embedding::{EmbedError, Embedder};
use hybrid_query_core::search::RankParams;

/// Minimal PDF with the phrase "quarterly hiring plan".
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 53 >> stream\nBT /F1 12 Tf 100 700 Td (quarterly hiring plan) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn zip_package(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    zip_package(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

fn minimal_xlsx() -> Vec<u8> {
    let ns = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    zip_package(&[
        (
            "xl/sharedStrings.xml",
            format!(
                "<?xml version=\"1.0\"?><sst xmlns=\"{}\"><si><t>Name</t></si><si><t>Role</t></si><si><t>Ada</t></si><si><r><t>Staff </t></r><r><t>Engineer</t></r></si></sst>",
                ns
            ),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                "<?xml version=\"1.0\"?><worksheet xmlns=\"{}\"><sheetData>\
                 <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row>\
                 <row r=\"2\"><c r=\"A2\" t=\"s\"><v>2</v></c><c r=\"B2\" t=\"s\"><v>3</v></c><c r=\"C2\"><v>95000</v></c></row>\
                 </sheetData></worksheet>",
                ns
            ),
        ),
        (
            "xl/worksheets/sheet2.xml",
            format!(
                "<?xml version=\"1.0\"?><worksheet xmlns=\"{}\"><sheetData>\
                 <row r=\"1\"><c r=\"A1\" t=\"inlineStr\"><is><t>Budget</t></is></c></row>\
                 </sheetData></worksheet>",
                ns
            ),
        ),
    ])
}

struct CountingWords;

#[async_trait]
impl Embedder for CountingWords {
    fn model_name(&self) -> &str {
        "counting-words"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| vec![t.split_whitespace().count() as f32, 1.0])
            .collect())
    }
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn docx_paragraphs_become_lines() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "resume.docx",
        &minimal_docx(&["Ada Lovelace", "Python &amp; Rust developer"]),
    );
    let text = extract_file(&path).unwrap();
    assert_eq!(text, "Ada Lovelace\nPython & Rust developer");
}

#[test]
fn xlsx_rows_and_sheets() {
    let text = extract_bytes(&minimal_xlsx(), DocumentFormat::Xlsx).unwrap();
    assert_eq!(text, "Name, Role\nAda, Staff Engineer, 95000\n\nBudget");
}

#[test]
fn csv_cells_are_trimmed_and_joined() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "staff.csv",
        b"name, dept ,notes\nAda,Engineering,\"likes \"\"Rust\"\", Python\"\n,,\n",
    );
    let text = extract_file(&path).unwrap();
    assert_eq!(
        text,
        "name, dept, notes\nAda, Engineering, likes \"Rust\", Python"
    );
}

#[test]
fn pdf_extraction_does_not_panic() {
    // pdf-extract may or may not recover text from a hand-built PDF.
    match extract_bytes(&minimal_pdf(), DocumentFormat::Pdf) {
        Ok(text) => assert!(text.is_empty() || text.contains("quarterly")),
        Err(e) => assert!(matches!(e, ExtractError::Pdf(_))),
    }
}

#[test]
fn unknown_extension_reads_as_text() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "notes.log", b"plain \xffbytes");
    let text = extract_file(&path).unwrap();
    assert!(text.starts_with("plain "));
    assert!(text.ends_with("bytes"));
}

#[test]
fn legacy_doc_is_an_ooxml_error() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "old.doc", b"\xd0\xcf\x11\xe0 not a zip");
    assert!(matches!(extract_file(&path), Err(ExtractError::Ooxml(_))));
}

#[tokio::test]
async fn mixed_formats_ingest_with_per_file_errors() {
    let tmp = TempDir::new().unwrap();
    let files = vec![
        write(tmp.path(), "resume.docx", &minimal_docx(&["Python developer"])),
        write(tmp.path(), "roster.xlsx", &minimal_xlsx()),
        write(tmp.path(), "staff.csv", b"name,dept\nAda,Engineering\n"),
        write(tmp.path(), "broken.docx", b"not a zip at all"),
    ];

    let store = VectorStore::new(
        tmp.path().join("index"),
        Arc::new(CountingWords),
        1000,
        RankParams::default(),
    );
    let status = store.ingest(&files, None).await.unwrap();
    assert_eq!(status.processed, 4);
    assert_eq!(status.errors, 1);
    assert_eq!(status.vectors, 3);
    assert!(status.done);

    let sources: Vec<String> = store
        .metadata()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.source)
        .collect();
    assert_eq!(sources, vec!["resume.docx", "roster.xlsx", "staff.csv"]);
}

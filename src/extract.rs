//! Plain-text extraction from document files.
//!
//! The format is chosen by file extension:
//!
//! | Extension | Format | Output |
//! |-----------|--------|--------|
//! | `.pdf` | PDF | text as laid out by `pdf-extract` |
//! | `.docx`, `.doc` | Word (OOXML) | one line per paragraph |
//! | `.xlsx` | Excel (OOXML) | one line per row, cells joined by `", "`; sheets separated by a blank line |
//! | `.csv` | delimited text | one line per record, non-empty cells trimmed and joined by `", "` |
//! | anything else | plain text | the file decoded as lossy UTF-8 |
//!
//! Legacy binary `.doc` files are not OOXML and fail with [`ExtractError::Ooxml`];
//! ingestion counts that as a per-file error.

use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Csv,
    Text,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentFormat::Pdf,
            "docx" | "doc" => DocumentFormat::Docx,
            "xlsx" => DocumentFormat::Xlsx,
            "csv" => DocumentFormat::Csv,
            _ => DocumentFormat::Text,
        }
    }
}

/// Read `path` and extract its text.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    extract_bytes(&bytes, DocumentFormat::from_path(path))
}

pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Xlsx => extract_xlsx(bytes),
        DocumentFormat::Csv => Ok(extract_csv(&String::from_utf8_lossy(bytes))),
        DocumentFormat::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// ============ CSV ============

fn extract_csv(text: &str) -> String {
    parse_csv(text)
        .into_iter()
        .map(|record| {
            record
                .iter()
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Comma-separated records, `"`-quoted fields, ragged rows allowed.
///
/// Records the reader cannot parse are skipped.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .records()
        .filter_map(|record| record.ok())
        .map(|record| record.iter().map(str::to_string).collect())
        .collect()
}

// ============ OOXML ============

type ZipCursor<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipCursor<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipCursor<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn xml_error(e: quick_xml::Error) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = std::mem::take(&mut current);
                    if !para.trim().is_empty() {
                        paragraphs.push(para);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Event::Text(te) if in_text => {
                current.push_str(&te.unescape().map_err(xml_error)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let mut sheets = Vec::new();
    for name in list_worksheet_names(&archive).into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = extract_sheet_rows(&sheet_xml, &shared_strings)?;
        if !rows.is_empty() {
            sheets.push(rows);
        }
    }
    Ok(sheets.join("\n\n"))
}

/// Shared string table; rich-text runs inside one `<si>` are concatenated.
fn read_shared_strings(archive: &mut ZipCursor<'_>) -> Result<Vec<String>, ExtractError> {
    const SHARED: &str = "xl/sharedStrings.xml";
    if !archive.file_names().any(|n| n == SHARED) {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, SHARED, MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(te) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(xml_error)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &ZipCursor<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut in_value = false;
    let mut cell_count = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => in_value = kind != CellKind::Inline,
                b"t" => in_value = kind == CellKind::Inline,
                _ => {}
            },
            Event::Text(te) if in_value => {
                let raw = te.unescape().map_err(xml_error)?;
                let value = raw.trim();
                let text = match kind {
                    CellKind::Shared => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned(),
                    _ => Some(value.to_string()),
                };
                if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                    row.push(text.trim().to_string());
                    cell_count += 1;
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row).join(", "));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(", "));
    }
    Ok(rows.join("\n"))
}

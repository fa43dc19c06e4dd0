//! Spreadsheet upload parsing.
//!
//! CSV/TSV files are read with delimiter sniffing; XLSX workbooks are opened as ZIP archives and
//! their first worksheet is read from the raw OOXML parts. The result is always a header row plus
//! string cells; interpreting those cells is the mapping module's job.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
/// Column count of an XLSX sheet (`A` to `XFD`).
const MAX_COLUMNS: usize = 16_384;
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("the file contains no rows")]
    Empty,

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("workbook part missing: {0}")]
    MissingPart(String),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("cell reference {0} is beyond column XFD")]
    ColumnOutOfRange(String),

    #[error("invalid workbook archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid workbook XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("failed to read workbook: {0}")]
    Io(#[from] std::io::Error),
}

/// Header row plus data rows; every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from raw rows: the first non-blank row is the header, blank rows are
    /// dropped and columns with an empty header are discarded.
    pub fn from_raw_rows(raw: Vec<Vec<String>>) -> Result<Self, TableError> {
        let mut rows = raw
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()));
        let header_row = rows.next().ok_or(TableError::Empty)?;

        let columns: Vec<(usize, String)> = header_row
            .into_iter()
            .enumerate()
            .map(|(i, h)| (i, h.trim().to_string()))
            .filter(|(_, h)| !h.is_empty())
            .collect();
        if columns.is_empty() {
            return Err(TableError::Empty);
        }

        let rows = rows
            .map(|row| {
                columns
                    .iter()
                    .map(|(i, _)| row.get(*i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Self {
            headers: columns.into_iter().map(|(_, h)| h).collect(),
            rows,
        })
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Row `row` as header → cell pairs.
    pub fn record(&self, row: usize) -> Option<HashMap<&str, &str>> {
        let cells = self.rows.get(row)?;
        Some(
            self.headers
                .iter()
                .map(String::as_str)
                .zip(cells.iter().map(String::as_str))
                .collect(),
        )
    }
}

/// Parses an upload, picking the format from the file name and falling back to content sniffing.
pub fn parse_table(file_name: &str, bytes: &[u8]) -> Result<Table, TableError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" | "xlsm" => parse_xlsx(bytes),
        "csv" | "tsv" | "txt" => parse_csv(bytes),
        "xls" | "ods" | "numbers" => Err(TableError::UnsupportedFormat(ext)),
        _ if bytes.starts_with(XLSX_MAGIC) => parse_xlsx(bytes),
        _ => parse_csv(bytes),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CSV / TSV
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_csv(bytes: &[u8]) -> Result<Table, TableError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    let delimiter = sniff_delimiter(&text);

    let raw = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .into_records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Table::from_raw_rows(raw)
}

/// Most frequent of `;`, `,` and tab on the first line, ignoring quoted text. Ties go to `;`.
pub fn sniff_delimiter(text: &str) -> char {
    let mut counts = [(';', 0usize), (',', 0), ('\t', 0)];
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\n' | '\r' if !in_quotes => break,
            _ if !in_quotes => {
                if let Some(entry) = counts.iter_mut().find(|(d, _)| *d == c) {
                    entry.1 += 1;
                }
            }
            _ => {}
        }
    }
    counts
        .iter()
        .fold((';', 0), |best, &(d, n)| if n > best.1 { (d, n) } else { best })
        .0
}

// ────────────────────────────────────────────────────────────────────────────
// XLSX
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_xlsx(bytes: &[u8]) -> Result<Table, TableError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let sheet_path = first_sheet_path(&mut archive)?;
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheet = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| TableError::MissingPart(sheet_path.clone()))?;

    Table::from_raw_rows(parse_sheet(&sheet, &shared)?)
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, TableError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Path of the first worksheet, resolved through the workbook relationships.
fn first_sheet_path<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, TableError> {
    const FALLBACK: &str = "xl/worksheets/sheet1.xml";

    let Some(workbook) = read_part(archive, "xl/workbook.xml")? else {
        return Ok(FALLBACK.to_string());
    };
    let doc = roxmltree::Document::parse(&workbook)?;
    let Some(rel_id) = doc
        .descendants()
        .find(|n| n.has_tag_name("sheet"))
        .and_then(|n| n.attribute((REL_NS, "id")))
        .map(str::to_string)
    else {
        return Err(TableError::MissingPart("worksheet".to_string()));
    };

    let Some(rels) = read_part(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(FALLBACK.to_string());
    };
    let doc = roxmltree::Document::parse(&rels)?;
    let target = doc
        .descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .find(|n| n.attribute("Id") == Some(rel_id.as_str()))
        .and_then(|n| n.attribute("Target"));

    Ok(match target {
        Some(t) if t.starts_with('/') => t.trim_start_matches('/').to_string(),
        Some(t) => format!("xl/{t}"),
        None => FALLBACK.to_string(),
    })
}

fn text_of(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.has_tag_name("t"))
        .filter_map(|n| n.text())
        .collect()
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, TableError> {
    let doc = roxmltree::Document::parse(xml)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("si"))
        .map(text_of)
        .collect())
}

/// Zero-based column of a cell reference like `AB12`; `Ok(None)` when it has no letters.
fn column_index(reference: &str) -> Result<Option<usize>, TableError> {
    let out_of_range = || TableError::ColumnOutOfRange(reference.to_string());
    let mut n = 0usize;
    let mut letters = 0usize;
    for b in reference.bytes().take_while(u8::is_ascii_alphabetic) {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add(digit))
            .filter(|n| *n <= MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
        letters += 1;
    }
    Ok((letters > 0).then(|| n - 1))
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, TableError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut rows = Vec::new();

    for row in doc.descendants().filter(|n| n.has_tag_name("row")) {
        let mut cells: Vec<String> = Vec::new();
        for cell in row.children().filter(|n| n.has_tag_name("c")) {
            let col = match cell.attribute("r") {
                Some(reference) => column_index(reference)?.unwrap_or(cells.len()),
                None => cells.len(),
            };
            if col >= MAX_COLUMNS {
                return Err(TableError::ColumnOutOfRange(format!("#{}", col + 1)));
            }

            let value = cell
                .children()
                .find(|n| n.has_tag_name("v"))
                .and_then(|n| n.text())
                .unwrap_or_default();
            let text = match cell.attribute("t") {
                Some("s") => value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| shared.get(i).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => cell
                    .children()
                    .find(|n| n.has_tag_name("is"))
                    .map(text_of)
                    .unwrap_or_default(),
                Some("b") => (if value == "1" { "TRUE" } else { "FALSE" }).to_string(),
                _ => value.to_string(),
            };

            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = text;
        }
        rows.push(cells);
    }
    Ok(rows)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

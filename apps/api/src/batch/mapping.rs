//! Column mapping between an uploaded table and the label fields.
//!
//! Headers are matched on a slug (lower-case ASCII letters and digits, diacritics folded,
//! parenthesised remarks dropped): an exact synonym hit first, then a substring fallback.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use zip::write::FileOptions;

use crate::batch::table::Table;
use crate::labels::models::LabelValues;

/// A label field a column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Productcode,
    Omschrijving,
    Ean,
    Qty,
    Gw,
    Cbm,
    Lengte,
    Breedte,
    Hoogte,
    Batch,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Productcode,
        Field::Omschrijving,
        Field::Ean,
        Field::Qty,
        Field::Gw,
        Field::Cbm,
        Field::Lengte,
        Field::Breedte,
        Field::Hoogte,
        Field::Batch,
    ];

    /// Display label, also used as the template column header.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Productcode => "ERP",
            Field::Omschrijving => "Omschrijving",
            Field::Ean => "EAN",
            Field::Qty => "QTY",
            Field::Gw => "G.W",
            Field::Cbm => "CBM",
            Field::Lengte => "Length (L)",
            Field::Breedte => "Width (W)",
            Field::Hoogte => "Height (H)",
            Field::Batch => "Batch",
        }
    }

    /// Header slugs recognised for this field.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Field::Productcode => &[
                "erp", "erp#", "erp #", "productcode", "code", "sku", "artikelcode", "itemcode",
                "prodcode",
            ],
            Field::Omschrijving => &["omschrijving", "description", "product", "naam", "title", "titel"],
            Field::Ean => &["ean", "barcode", "gtin", "ean13", "ean_13"],
            Field::Qty => &["qty", "aantal", "quantity", "pcs", "stuks"],
            Field::Gw => &[
                "gw", "g.w", "gewicht", "weight", "grossweight", "gweight", "brutogewicht",
            ],
            Field::Cbm => &["cbm", "m3", "volume", "kub", "kubiekemeter", "kubiekemeters"],
            Field::Lengte => &["lengte", "l", "depth", "diepte", "length"],
            Field::Breedte => &["breedte", "b", "width", "w"],
            Field::Hoogte => &["hoogte", "h", "height"],
            Field::Batch => &["batch", "lot", "lotno", "batchno", "batchnr"],
        }
    }
}

/// Field → header name. Unmapped fields are absent.
pub type FieldMapping = BTreeMap<Field, String>;

const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{300}'..='\u{36f}';

// ────────────────────────────────────────────────────────────────────────────
// Header matching
// ────────────────────────────────────────────────────────────────────────────

/// Lower-case ASCII letters and digits only. Text is decomposed (NFD) and combining marks are
/// dropped, so `é` becomes `e`; letters without a decomposition (`ø`, `ß`) disappear.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !COMBINING_MARKS.contains(c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Drops `( … )` remarks, e.g. the unit in `Length (L)`.
fn strip_parenthesised(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut depth = 0usize;
    for c in header.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn header_slug(header: &str) -> String {
    slugify(&strip_parenthesised(header))
}

/// Best-effort mapping for a header row.
///
/// Pass 1 maps every header whose slug is a synonym; a later header overrides an earlier one
/// for the same field. Pass 2 fills the fields still open with the first header containing one
/// of their synonyms of at least two characters.
pub fn guess_mapping(headers: &[String]) -> FieldMapping {
    let slugs: Vec<String> = headers.iter().map(|h| header_slug(h)).collect();
    let mut mapping = FieldMapping::new();

    for (header, slug) in headers.iter().zip(&slugs) {
        if let Some(field) = Field::ALL.iter().find(|f| f.synonyms().contains(&slug.as_str())) {
            mapping.insert(*field, header.clone());
        }
    }

    for field in Field::ALL {
        if mapping.contains_key(&field) {
            continue;
        }
        let tokens: Vec<&str> = field
            .synonyms()
            .iter()
            .copied()
            .filter(|t| t.len() >= 2)
            .collect();
        if let Some(i) = slugs
            .iter()
            .position(|s| tokens.iter().any(|t| s.contains(t)))
        {
            mapping.insert(field, headers[i].clone());
        }
    }

    mapping
}

/// Labels of the fields without a (non-empty) column, in field order.
pub fn validate_mapping(mapping: &FieldMapping) -> Vec<&'static str> {
    Field::ALL
        .iter()
        .filter(|f| mapping.get(*f).map_or(true, |h| h.trim().is_empty()))
        .map(Field::label)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Number normalisation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Treat `,` as the decimal separator.
    pub comma_decimal: bool,
    pub trim: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            comma_decimal: true,
            trim: true,
        }
    }
}

/// `1.234` / `1.234.567,89`: dots as thousands separators.
fn is_thousands_grouped(s: &str) -> bool {
    let (int_part, frac) = match s.split_once(',') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    if let Some(f) = frac {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    let mut groups = int_part.split('.');
    let Some(first) = groups.next() else {
        return false;
    };
    let mut rest = groups.peekable();
    if rest.peek().is_none() {
        return false;
    }
    (1..=3).contains(&first.len())
        && first.bytes().all(|b| b.is_ascii_digit())
        && rest.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Longest leading decimal number, ignoring leading whitespace; `abc` → `None`.
fn parse_leading_float(s: &str) -> Option<f32> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse::<f32>().ok()
}

/// Cell text → number. Grouped thousands (`1.234,5`) are recognised before the decimal comma is
/// converted, so they keep their magnitude.
pub fn normalize_number(raw: &str, options: NormalizeOptions) -> Option<f32> {
    let mut value = if options.trim {
        raw.trim().to_string()
    } else {
        raw.to_string()
    };
    if is_thousands_grouped(&value) {
        value = value.replace('.', "");
    }
    if options.comma_decimal {
        value = value.replacen(',', ".", 1);
    }
    parse_leading_float(&value).filter(|n| n.is_finite())
}

// ────────────────────────────────────────────────────────────────────────────
// Rows
// ────────────────────────────────────────────────────────────────────────────

/// Reads one table row into label values.
///
/// Dimensions that do not parse are left as `None`; the runner rejects such rows.
pub fn read_row(
    table: &Table,
    row: usize,
    mapping: &FieldMapping,
    options: NormalizeOptions,
) -> Option<LabelValues> {
    let cells = table.rows.get(row)?;
    let get = |field: Field| -> &str {
        mapping
            .get(&field)
            .and_then(|header| table.column(header))
            .and_then(|i| cells.get(i))
            .map(String::as_str)
            .unwrap_or("")
    };
    let text = |field: Field| get(field).trim().to_string();

    Some(LabelValues {
        code: text(Field::Productcode),
        desc: text(Field::Omschrijving),
        ean: text(Field::Ean),
        qty: text(Field::Qty),
        gw: text(Field::Gw),
        cbm: text(Field::Cbm),
        len: normalize_number(get(Field::Lengte), options),
        wid: normalize_number(get(Field::Breedte), options),
        hei: normalize_number(get(Field::Hoogte), options),
        batch: text(Field::Batch),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Templates
// ────────────────────────────────────────────────────────────────────────────

pub const TEMPLATE_CSV_NAME: &str = "labels-template.csv";
pub const TEMPLATE_XLSX_NAME: &str = "labels-template.xlsx";

fn template_row() -> [&'static str; 10] {
    [
        "LG1000843",
        "Combination Lock - Orange - 1 Pack (YF20610B)",
        "8719632951889",
        "12",
        "18,00",
        "0.02",
        "39",
        "19,5",
        "22",
        "IOR2500307",
    ]
}

/// Semicolon-separated template with one example row.
pub fn template_csv() -> String {
    let header: Vec<&str> = Field::ALL.iter().map(Field::label).collect();
    let row: Vec<String> = template_row().iter().map(|c| c.replace(';', ",")).collect();
    format!("{}\n{}", header.join(";"), row.join(";"))
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

fn sheet_row(number: usize, cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .enumerate()
        .map(|(i, value)| {
            format!(
                r#"<c r="{}{number}" t="inlineStr"><is><t>{}</t></is></c>"#,
                column_letter(i),
                xml_escape(value)
            )
        })
        .collect();
    format!(r#"<row r="{number}">{cells}</row>"#)
}

/// Minimal single-sheet workbook ("Template") with the same content as the CSV template.
pub fn template_xlsx() -> Result<Vec<u8>, zip::result::ZipError> {
    let header: Vec<&str> = Field::ALL.iter().map(Field::label).collect();
    let rows = format!("{}{}", sheet_row(1, &header), sheet_row(2, &template_row()));

    let parts: [(&str, String); 5] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Template" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
            ),
        ),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in parts {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

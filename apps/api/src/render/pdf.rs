//! PDF export of a label sheet.
//!
//! One page holds all four faces stacked in print order 1, 3, 2, 4 with a 0.5 cm margin. Each
//! face is rotated 90° clockwise so its width runs down the page: the page is as wide as the
//! tallest face and as tall as the sum of the face widths. Text uses the base-14 Helvetica fonts
//! the layout was measured with, so nothing is embedded.

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};

use crate::labels::geometry::{PT_PER_CM, PX_PER_PT};
use crate::layout::font_metrics::{get_metrics, FontFace};
use crate::render::{LabelSheet, RenderedLabel};

pub const PDF_MARGIN_CM: f32 = 0.5;
const BORDER_PX: f32 = 1.0;
const PRINT_ORDER: [u8; 4] = [1, 3, 2, 4];

const FONT_REGULAR: Name<'static> = Name(b"F1");
const FONT_BOLD: Name<'static> = Name(b"F2");

fn px_to_pt(px: f32) -> f32 {
    px / PX_PER_PT
}

fn font_name(face: FontFace) -> Name<'static> {
    match face {
        FontFace::Helvetica => FONT_REGULAR,
        FontFace::HelveticaBold => FONT_BOLD,
    }
}

/// Page size in points for a sheet.
pub fn page_size_pt(sheet: &LabelSheet) -> (f32, f32) {
    let max_h = sheet
        .labels
        .iter()
        .map(|l| l.size.height_cm)
        .fold(0.0, f32::max);
    let sum_w: f32 = sheet.labels.iter().map(|l| l.size.width_cm).sum();
    (
        (max_h + 2.0 * PDF_MARGIN_CM) * PT_PER_CM,
        (sum_w + 2.0 * PDF_MARGIN_CM) * PT_PER_CM,
    )
}

/// Writes the sheet as a one-page PDF. The sheet must be rendered at print scale.
pub fn render_pdf(sheet: &LabelSheet, title: &str) -> Vec<u8> {
    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let page_id = Ref::new(3);
    let content_id = Ref::new(4);
    let regular_id = Ref::new(5);
    let bold_id = Ref::new(6);
    let info_id = Ref::new(7);

    let (page_w, page_h) = page_size_pt(sheet);

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id).kids([page_id]).count(1);

    {
        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, page_w, page_h))
            .parent(pages_id)
            .contents(content_id);
        let mut resources = page.resources();
        let mut fonts = resources.fonts();
        fonts.pair(FONT_REGULAR, regular_id);
        fonts.pair(FONT_BOLD, bold_id);
    }

    for (id, face) in [
        (regular_id, FontFace::Helvetica),
        (bold_id, FontFace::HelveticaBold),
    ] {
        pdf.type1_font(id)
            .base_font(Name(face.postscript_name().as_bytes()))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
    }

    pdf.document_info(info_id)
        .title(TextStr(title))
        .creator(TextStr(concat!("label-api ", env!("CARGO_PKG_VERSION"))));

    let mut content = Content::new();
    let margin = PDF_MARGIN_CM * PT_PER_CM;
    let mut cursor_cm = PDF_MARGIN_CM;

    for index in PRINT_ORDER {
        let Some(label) = sheet.labels.iter().find(|l| l.size.index == index) else {
            continue;
        };
        let top = cursor_cm * PT_PER_CM;
        draw_label(&mut content, label, margin, top, page_h);
        cursor_cm += label.size.width_cm;
    }

    pdf.stream(content_id, &content.finish());
    pdf.finish()
}

/// Draws one face whose rotated box starts at `left` and `top` (points from the page's top-left).
fn draw_label(content: &mut Content, label: &RenderedLabel, left: f32, top: f32, page_h: f32) {
    let w = px_to_pt(label.width_px);
    let h = px_to_pt(label.height_px);
    let border = px_to_pt(BORDER_PX);

    // After rotation the face occupies h × w on the page.
    content.save_state();
    content.set_stroke_gray(0.0);
    content.set_line_width(border);
    content.rect(
        left + border / 2.0,
        page_h - top - w + border / 2.0,
        h - border,
        w - border,
    );
    content.stroke();
    content.restore_state();

    let pad = px_to_pt(label.padding_px);

    for run in &label.runs {
        if run.text.is_empty() {
            continue;
        }
        let metrics = get_metrics(run.face);
        let baseline = run.y + metrics.baseline_offset(run.size_px, run.line_height);

        // Face coordinates (x right, y down, pt) → page: (x, y) ↦ (h − y, x), clockwise.
        let fx = pad + px_to_pt(run.x);
        let fy = pad + px_to_pt(baseline);
        let e = left + (h - fy);
        let f = page_h - (top + fx);

        content
            .begin_text()
            .set_font(font_name(run.face), px_to_pt(run.size_px))
            .set_text_matrix([0.0, -1.0, 1.0, 0.0, e, f])
            .show(Str(&encode_win_ansi(&run.text)))
            .end_text();
    }
}

/// Maps text to WinAnsiEncoding bytes; characters outside it become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

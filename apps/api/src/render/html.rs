//! Self-contained HTML preview of a label sheet.
//!
//! Lines are absolutely positioned at the coordinates the fit engine measured, so the browser
//! never re-flows text and the preview matches the PDF.

use std::fmt::Write;

use crate::labels::geometry::FooterKind;
use crate::render::{LabelSheet, RenderedLabel};

const STYLE: &str = "\
body{margin:0;padding:16px;font-family:Helvetica,Arial,sans-serif;background:#f3f3f3}\
.sheet{display:grid;grid-template-columns:repeat(2,max-content);gap:16px}\
.label-wrap{display:flex;flex-direction:column;gap:4px}\
.label-title{font-size:12px;color:#555}\
.label{position:relative;box-sizing:border-box;border:1px solid #000;background:#fff;overflow:hidden}\
.label-inner{position:absolute}\
.run{position:absolute;white-space:pre;color:#000}";

/// Escapes text for element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_html(sheet: &LabelSheet) -> String {
    let mut html = String::new();
    let title = escape_html(sheet.values.export_stem());

    // Writing into a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body><div class=\"sheet\">"
    );
    for label in &sheet.labels {
        write_label(&mut html, label);
    }
    html.push_str("</div></body></html>");
    html
}

fn write_label(html: &mut String, label: &RenderedLabel) {
    let footer = match label.footer {
        FooterKind::Origin => "origin",
        FooterKind::CartonNumber => "carton-number",
    };
    let bucket = label
        .bucket
        .as_ref()
        .map(|b| escape_html(&b.key))
        .unwrap_or_default();

    let _ = write!(
        html,
        "<div class=\"label-wrap\"><div class=\"label-title\">{name} ({w:.1} × {h:.1} cm)</div>\
         <div class=\"label\" data-idx=\"{idx}\" data-footer=\"{footer}\" data-bucket=\"{bucket}\" \
         data-font=\"{font:.2}\" data-scale=\"{scale:.4}\" \
         style=\"width:{wpx}px;height:{hpx}px\">\
         <div class=\"label-inner\" style=\"left:{pad:.2}px;top:{pad:.2}px\">",
        name = escape_html(&label.size.name),
        w = label.size.width_cm,
        h = label.size.height_cm,
        idx = label.size.index,
        font = label.fit.font_size_px,
        scale = label.fit.scale,
        wpx = label.width_px,
        hpx = label.height_px,
        pad = label.padding_px,
    );

    for run in &label.runs {
        let _ = write!(
            html,
            "<span class=\"run\" style=\"left:{x:.2}px;top:{y:.2}px;font-size:{size:.2}px;\
             line-height:{lh:.2}px;font-weight:{weight}\">{text}</span>",
            x = run.x,
            y = run.y,
            size = run.size_px,
            lh = run.line_height,
            weight = run.face.css_weight(),
            text = escape_html(&run.text),
        );
    }
    html.push_str("</div></div></div>");
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::geometry::Viewport;
    use crate::layout::buckets::BucketTable;
    use crate::render::tests::{context, sample_values};
    use crate::render::RenderTarget;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Lock" & 'Key'</b>"#),
            "&lt;b&gt;&quot;Lock&quot; &amp; &#39;Key&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_render_html_contains_all_labels() {
        let sheet = context(BucketTable::empty())
            .render_sheet(&sample_values(), RenderTarget::Preview(Viewport::default()));
        let html = render_html(&sheet);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert_eq!(html.matches("class=\"label\" ").count(), 4);
        assert!(html.contains("LG1000843"));
        assert!(html.contains("Made in China"));
        assert!(html.contains("C/N:"));
    }

    #[test]
    fn test_render_html_escapes_values() {
        let mut values = sample_values();
        values.desc = "<script>alert(1)</script>".into();
        let sheet = context(BucketTable::empty()).render_sheet(&values, RenderTarget::Print);
        let html = render_html(&sheet);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}

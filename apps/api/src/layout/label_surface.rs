//! Text layout model of one label face.
//!
//! The face has a header (product code in bold, description underneath), a spacer and a
//! key/value grid:
//!
//! ```text
//! LG1000843
//! Combination Lock - Orange - 1 Pack
//!
//! EAN:  8719632951889
//! QTY:  12 PCS
//! G.W:  18,00 KGS
//! CBM:  0.02
//!       Made in China
//! ```
//!
//! Every text role is a fixed ratio of one scalar size, so the fit engine only ever moves a
//! single number. Value cells are constrained to the column left over by the key column: a
//! value that is too wide overflows its own cell without widening the content block, and is
//! reported through `Measurement::cells`.
//!
//! The description wraps within the natural width of the grid and is the capped field: the
//! engine may shrink it on its own until it is back within its line cap.

use serde::{Deserialize, Serialize};

use crate::labels::geometry::{FooterKind, CARTON_NUMBER_BLANK, CARTON_NUMBER_KEY};
use crate::labels::models::LabelValues;
use crate::layout::font_metrics::FontFace;
use crate::layout::surface::{CellMeasure, LayoutSurface, Measurement, Size, WrapMode};
use crate::layout::text::{max_line_width, wrap_lines, Line};

/// Line box height as a multiple of the font size.
pub const LINE_HEIGHT: f32 = 1.2;
/// Gap between header and grid, relative to the value text size.
const SPACER_RATIO: f32 = 0.4;
/// Gap between key column and values, relative to the key size.
const KEY_GAP_RATIO: f32 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Typography
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRole {
    /// Product code.
    Erp,
    Desc,
    /// Grid keys.
    Label,
    /// Grid values.
    Text,
    Footer,
}

impl TextRole {
    pub fn face(&self) -> FontFace {
        match self {
            TextRole::Erp | TextRole::Label => FontFace::HelveticaBold,
            TextRole::Desc | TextRole::Text | TextRole::Footer => FontFace::Helvetica,
        }
    }
}

/// Size of each role as a multiple of the scalar font size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Typography {
    pub erp: f32,
    pub desc: f32,
    pub label: f32,
    pub text: f32,
    pub footer: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            erp: 1.3,
            desc: 1.0,
            label: 0.9,
            text: 1.0,
            footer: 0.9,
        }
    }
}

impl Typography {
    pub fn ratio(&self, role: TextRole) -> f32 {
        match role {
            TextRole::Erp => self.erp,
            TextRole::Desc => self.desc,
            TextRole::Label => self.label,
            TextRole::Text => self.text,
            TextRole::Footer => self.footer,
        }
    }

    /// Ratios from absolute role sizes, relative to the value text size.
    ///
    /// Returns `None` when the text size is not positive, since nothing can be derived from it.
    pub fn from_role_sizes(erp: f32, desc: f32, label: f32, text: f32, footer: f32) -> Option<Self> {
        if !(text > 0.0) {
            return None;
        }
        Some(Self {
            erp: erp / text,
            desc: desc / text,
            label: label / text,
            text: 1.0,
            footer: footer / text,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Content
// ────────────────────────────────────────────────────────────────────────────

/// One row of the key/value grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub key: String,
    pub value: String,
    /// Footer rows use the footer role for both columns.
    pub footer: bool,
}

impl GridRow {
    fn new(key: &str, value: String) -> Self {
        Self {
            key: key.to_string(),
            value,
            footer: false,
        }
    }

    fn key_role(&self) -> TextRole {
        if self.footer {
            TextRole::Footer
        } else {
            TextRole::Label
        }
    }

    fn value_role(&self) -> TextRole {
        if self.footer {
            TextRole::Footer
        } else {
            TextRole::Text
        }
    }
}

/// Text printed on one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelContent {
    pub code: String,
    pub desc: String,
    pub rows: Vec<GridRow>,
}

impl LabelContent {
    pub fn from_values(values: &LabelValues, footer: FooterKind, origin_text: &str) -> Self {
        let mut rows = vec![
            GridRow::new("EAN:", values.ean.trim().to_string()),
            GridRow::new("QTY:", format!("{} PCS", values.qty.trim())),
            GridRow::new("G.W:", format!("{} KGS", values.gw.trim())),
            GridRow::new("CBM:", values.cbm.trim().to_string()),
        ];
        let footer_row = match footer {
            FooterKind::Origin => GridRow::new("", origin_text.to_string()),
            FooterKind::CartonNumber => {
                GridRow::new(CARTON_NUMBER_KEY, CARTON_NUMBER_BLANK.to_string())
            }
        };
        rows.push(GridRow {
            footer: true,
            ..footer_row
        });

        Self {
            code: values.code.trim().to_string(),
            desc: values.desc.trim().to_string(),
            rows,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layout output
// ────────────────────────────────────────────────────────────────────────────

/// One positioned line of text, in pixels relative to the top-left of the content box,
/// with the visual scale already applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    /// Top of the line box.
    pub y: f32,
    pub width: f32,
    pub size_px: f32,
    pub line_height: f32,
    pub face: FontFace,
    pub role: TextRole,
}

struct Block {
    runs: Vec<TextRun>,
    measurement: Measurement,
    desc_lines: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Surface
// ────────────────────────────────────────────────────────────────────────────

/// `LayoutSurface` over one label's content box.
#[derive(Debug, Clone)]
pub struct LabelSurface {
    content: LabelContent,
    client: Size,
    typography: Typography,
    font_px: f32,
    desc_font_px: Option<f32>,
    wrap_mode: WrapMode,
    scale: f32,
}

impl LabelSurface {
    pub fn new(content: LabelContent, client: Size, typography: Typography) -> Self {
        Self {
            content,
            client,
            typography,
            font_px: 12.0,
            desc_font_px: None,
            wrap_mode: WrapMode::NoWrap,
            scale: 1.0,
        }
    }

    pub fn content(&self) -> &LabelContent {
        &self.content
    }

    pub fn typography(&self) -> &Typography {
        &self.typography
    }

    pub fn font_size(&self) -> f32 {
        self.font_px
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Rendered size of a role at the current scalar, before the visual scale.
    pub fn role_size(&self, role: TextRole) -> f32 {
        let base = match role {
            TextRole::Desc => self.desc_font_px.unwrap_or(self.font_px),
            _ => self.font_px,
        };
        base * self.typography.ratio(role)
    }

    /// Positions every line at the current state.
    pub fn layout(&self) -> Vec<TextRun> {
        let k = self.scale;
        self.build()
            .runs
            .into_iter()
            .map(|run| TextRun {
                x: run.x * k,
                y: run.y * k,
                width: run.width * k,
                size_px: run.size_px * k,
                line_height: run.line_height * k,
                ..run
            })
            .collect()
    }

    fn build(&self) -> Block {
        let max_w = self.client.width.max(0.0);
        let mode = self.wrap_mode;
        let mut runs = Vec::new();
        let mut y = 0.0_f32;
        let mut content_width = 0.0_f32;

        // Header: product code.
        let erp_px = self.role_size(TextRole::Erp);
        let code_lines = wrap_lines(&self.content.code, FontFace::HelveticaBold, erp_px, max_w, mode);
        content_width = content_width.max(max_line_width(&code_lines));
        y = push_lines(&mut runs, code_lines, 0.0, y, erp_px, TextRole::Erp);

        // Grid geometry first: the description wraps within its width.
        let key_col = self.key_column_width();
        let cell_client = (max_w - key_col).max(0.0);
        let value_lines: Vec<Vec<Line>> = self
            .content
            .rows
            .iter()
            .map(|row| {
                let role = row.value_role();
                wrap_lines(&row.value, role.face(), self.role_size(role), cell_client, mode)
            })
            .collect();
        let widest_value = value_lines
            .iter()
            .map(|lines| max_line_width(lines))
            .fold(0.0, f32::max);
        let grid_width = (key_col + widest_value).min(max_w);
        let desc_width = if grid_width > 0.0 { grid_width } else { max_w };

        // Header: description, always soft-wrapped.
        let desc_px = self.role_size(TextRole::Desc);
        let desc_lines = wrap_lines(
            &self.content.desc,
            FontFace::Helvetica,
            desc_px,
            desc_width,
            WrapMode::SoftWrap,
        );
        let desc_line_count = desc_lines.len();
        content_width = content_width.max(max_line_width(&desc_lines));
        y = push_lines(&mut runs, desc_lines, 0.0, y, desc_px, TextRole::Desc);

        y += SPACER_RATIO * self.role_size(TextRole::Text);

        // Grid.
        let mut cells = Vec::with_capacity(self.content.rows.len());
        content_width = content_width.max(key_col);
        for (row, lines) in self.content.rows.iter().zip(value_lines) {
            let key_role = row.key_role();
            let key_px = self.role_size(key_role);
            let value_role = row.value_role();
            let value_px = self.role_size(value_role);

            cells.push(CellMeasure {
                left: key_col,
                scroll_width: max_line_width(&lines),
                client_width: cell_client,
            });

            let key_lines = wrap_lines(&row.key, key_role.face(), key_px, f32::INFINITY, WrapMode::NoWrap);
            let key_bottom = push_lines(&mut runs, key_lines, 0.0, y, key_px, key_role);
            let value_bottom = push_lines(&mut runs, lines, key_col, y, value_px, value_role);

            // Empty rows still take one line.
            let row_min = LINE_HEIGHT * key_px.max(value_px);
            y = key_bottom.max(value_bottom).max(y + row_min);
        }

        Block {
            runs,
            measurement: Measurement {
                content_width,
                content_height: y,
                cells,
            },
            desc_lines: desc_line_count,
        }
    }

    fn key_column_width(&self) -> f32 {
        let mut widest = 0.0_f32;
        let mut gap = 0.0_f32;
        for row in &self.content.rows {
            let role = row.key_role();
            let px = self.role_size(role);
            let lines = wrap_lines(&row.key, role.face(), px, f32::INFINITY, WrapMode::NoWrap);
            widest = widest.max(max_line_width(&lines));
            gap = gap.max(KEY_GAP_RATIO * px);
        }
        widest + gap
    }
}

fn push_lines(
    runs: &mut Vec<TextRun>,
    lines: Vec<Line>,
    x: f32,
    top: f32,
    size_px: f32,
    role: TextRole,
) -> f32 {
    let line_height = LINE_HEIGHT * size_px;
    let mut y = top;
    for line in lines {
        runs.push(TextRun {
            text: line.text,
            x,
            y,
            width: line.width,
            size_px,
            line_height,
            face: role.face(),
            role,
        });
        y += line_height;
    }
    y
}

impl LayoutSurface for LabelSurface {
    fn client_size(&self) -> Size {
        self.client
    }

    fn measure(&self) -> Measurement {
        self.build().measurement
    }

    fn set_font_size(&mut self, px: f32) {
        self.font_px = px;
    }

    fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    fn set_scale(&mut self, k: f32) {
        self.scale = k;
    }

    fn capped_line_count(&self) -> Option<usize> {
        if self.content.desc.is_empty() {
            return None;
        }
        Some(self.build().desc_lines)
    }

    fn set_capped_font_size(&mut self, px: Option<f32>) {
        self.desc_font_px = px;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

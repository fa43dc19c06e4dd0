//! Label face geometry derived from the box dimensions.
//!
//! Faces 1 and 2 sit on the front/back (length × height), faces 3 and 4 on the sides
//! (width × height). Each face is the box side shrunk by a fixed factor so the label keeps a
//! margin to the carton edges.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::labels::models::BoxDimensions;
use crate::layout::surface::Size;

pub const PX_PER_CM: f32 = 37.795_277;
pub const PX_PER_PT: f32 = 96.0 / 72.0;
pub const PT_PER_CM: f32 = 72.0 / 2.54;

/// Padding inside each label, all sides.
pub const LABEL_PADDING_CM: f32 = 0.6;

pub const DEFAULT_SHRINK_FACTOR: f32 = 0.9;

/// Printed in the footer of the two largest faces.
pub const DEFAULT_ORIGIN_TEXT: &str = "Made in China";
pub const CARTON_NUMBER_KEY: &str = "C/N:";
pub const CARTON_NUMBER_BLANK: &str = "___________________";

const AREA_TIE_EPS: f32 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    FrontBack,
    Side,
}

/// One label face in centimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSize {
    /// 1-based face number.
    pub index: u8,
    pub name: String,
    pub width_cm: f32,
    pub height_cm: f32,
    pub kind: LabelKind,
}

impl LabelSize {
    pub fn area(&self) -> f32 {
        self.width_cm * self.height_cm
    }

    /// Outer width in whole pixels at `scale`.
    pub fn width_px(&self, scale: f32) -> f32 {
        (self.width_cm * PX_PER_CM * scale).round()
    }

    pub fn height_px(&self, scale: f32) -> f32 {
        (self.height_cm * PX_PER_CM * scale).round()
    }

    pub fn padding_px(&self, scale: f32) -> f32 {
        LABEL_PADDING_CM * PX_PER_CM * scale
    }

    /// Box available to the content once padding is removed; never negative.
    pub fn inner_size(&self, scale: f32) -> Size {
        let pad = 2.0 * self.padding_px(scale);
        Size::new(
            (self.width_px(scale) - pad).max(0.0),
            (self.height_px(scale) - pad).max(0.0),
        )
    }
}

/// Computes the four faces for a box.
pub fn calc_label_sizes(dims: BoxDimensions, shrink_factor: f32) -> Vec<LabelSize> {
    let front_w = dims.length * shrink_factor;
    let side_w = dims.width * shrink_factor;
    let face_h = dims.height * shrink_factor;

    let face = |index: u8, width_cm: f32, kind: LabelKind| {
        let role = match kind {
            LabelKind::FrontBack => "front/back",
            LabelKind::Side => "side",
        };
        LabelSize {
            index,
            name: format!("Label {index} ({role})"),
            width_cm,
            height_cm: face_h,
            kind,
        }
    };

    vec![
        face(1, front_w, LabelKind::FrontBack),
        face(2, front_w, LabelKind::FrontBack),
        face(3, side_w, LabelKind::Side),
        face(4, side_w, LabelKind::Side),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// Footer assignment
// ────────────────────────────────────────────────────────────────────────────

/// What goes into the last grid row of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FooterKind {
    /// Country of origin line.
    Origin,
    /// Blank carton-number field to fill in by hand.
    CartonNumber,
}

/// Indices of the two largest faces by area.
///
/// Returns `None` when the second and third largest tie, because then "the two largest" is
/// ambiguous.
pub fn largest_two(sizes: &[LabelSize]) -> Option<[u8; 2]> {
    if sizes.len() < 2 {
        return None;
    }
    let mut ranked: Vec<(u8, f32)> = sizes.iter().map(|s| (s.index, s.area())).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(third) = ranked.get(2) {
        if (ranked[1].1 - third.1).abs() <= AREA_TIE_EPS {
            return None;
        }
    }
    Some([ranked[0].0, ranked[1].0])
}

/// Footer for one face: origin on the two largest faces, otherwise by kind (sides get the
/// origin line, front/back the carton number).
pub fn footer_for(size: &LabelSize, largest: Option<[u8; 2]>) -> FooterKind {
    let origin = match largest {
        Some(pair) => pair.contains(&size.index),
        None => size.kind != LabelKind::FrontBack,
    };
    if origin {
        FooterKind::Origin
    } else {
        FooterKind::CartonNumber
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Preview scale
// ────────────────────────────────────────────────────────────────────────────

/// Screen area the preview grid is laid out in (two labels per row).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: 800.0,
        }
    }
}

/// Scale at which the largest face fits one preview cell.
pub fn compute_preview_scale(sizes: &[LabelSize], viewport: Viewport) -> f32 {
    let max_w_px = sizes.iter().map(|s| s.width_cm).fold(0.0, f32::max) * PX_PER_CM;
    let max_h_px = sizes.iter().map(|s| s.height_cm).fold(0.0, f32::max) * PX_PER_CM;

    let cell_w = viewport.width / 2.0;
    let cell_h = (viewport.height * 0.35).max(280.0);

    let scale = (cell_w / max_w_px).min(cell_h / max_h_px) * 0.98;
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(0.08, 1.0)
}

// ────────────────────────────────────────────────────────────────────────────
// Export file names
// ────────────────────────────────────────────────────────────────────────────

/// `YYYY-MM-DD HH.MM.SS`, safe for file names on every platform.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H.%M.%S").to_string()
}

pub fn pdf_file_name(stem: &str, timestamp: &str) -> String {
    format!("{stem} - {timestamp}.pdf")
}

/// Name of row `row` (0-based) inside a batch ZIP.
pub fn batch_pdf_file_name(stem: &str, batch_time: &str, row: usize) -> String {
    format!("{stem} - {batch_time} - R{:03}.pdf", row + 1)
}

pub fn batch_zip_file_name(batch_time: &str) -> String {
    format!("labels-batch - {batch_time}.zip")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

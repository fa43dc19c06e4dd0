//! Layout measurement interface.
//!
//! The fit engine never looks at text or fonts. It drives a `LayoutSurface` through a single
//! font-size scalar, a wrap-mode toggle and a visual scale, and reads back scroll sizes. The
//! label model in `label_surface` is the production implementation; tests drive the engine
//! with small mock surfaces.

use serde::{Deserialize, Serialize};

/// A width/height pair in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, negative or not a number.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// How long single-line fields behave when they do not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    /// Fields never break; the font shrinks instead.
    NoWrap,
    /// Long field values may break at whitespace.
    SoftWrap,
}

/// One child constrained to its own box, e.g. a value cell of the label/value grid.
///
/// A cell can overflow its own box without growing the content block's scroll size,
/// so the engine checks each one separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellMeasure {
    /// X offset of the cell inside the content block.
    pub left: f32,
    pub scroll_width: f32,
    pub client_width: f32,
}

impl CellMeasure {
    pub fn overflows(&self) -> bool {
        self.scroll_width > self.client_width + CELL_TOLERANCE_PX
    }

    /// Right edge of the rendered text, overflow included.
    pub fn extent(&self) -> f32 {
        self.left + self.scroll_width
    }
}

/// Sub-pixel slack when comparing a cell's scroll width to its client width.
pub const CELL_TOLERANCE_PX: f32 = 0.5;

/// Result of measuring the content block at the current font size and wrap mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub content_width: f32,
    pub content_height: f32,
    pub cells: Vec<CellMeasure>,
}

/// Capability set the fit engine needs from a container.
///
/// `set_scale` is a visual transform only: it must not change what `measure` reports.
pub trait LayoutSurface {
    /// Inner size of the container.
    fn client_size(&self) -> Size;

    /// Scroll size of the content block plus every constrained child.
    fn measure(&self) -> Measurement;

    /// Sets the scalar every text role is derived from.
    fn set_font_size(&mut self, px: f32);

    fn set_wrap_mode(&mut self, mode: WrapMode);

    /// Uniform visual scale of the whole content block.
    fn set_scale(&mut self, k: f32);

    /// Line count of the field with a line cap, if the surface has one.
    fn capped_line_count(&self) -> Option<usize> {
        None
    }

    /// Overrides the scalar for the capped field only, in the same units as `set_font_size`.
    /// `None` makes the field follow the global scalar again.
    fn set_capped_font_size(&mut self, _px: Option<f32>) {}
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_degenerate() {
        assert!(Size::new(0.0, 10.0).is_degenerate());
        assert!(Size::new(10.0, -1.0).is_degenerate());
        assert!(Size::new(f32::NAN, 10.0).is_degenerate());
        assert!(!Size::new(1.0, 1.0).is_degenerate());
    }

    #[test]
    fn test_cell_overflow_uses_tolerance() {
        let cell = CellMeasure {
            left: 10.0,
            scroll_width: 50.4,
            client_width: 50.0,
        };
        assert!(!cell.overflows());

        let cell = CellMeasure {
            left: 10.0,
            scroll_width: 51.0,
            client_width: 50.0,
        };
        assert!(cell.overflows());
        assert_eq!(cell.extent(), 61.0);
    }

    #[test]
    fn test_wrap_mode_serializes_snake_case() {
        let json = serde_json::to_string(&WrapMode::SoftWrap).unwrap();
        assert_eq!(json, "\"soft_wrap\"");
    }
}

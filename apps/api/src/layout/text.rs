//! Line breaking for label text.
//!
//! Whitespace collapses the way it does in an HTML text node. In soft-wrap mode lines break
//! greedily at whitespace only; a single token wider than the line is never split and simply
//! overflows, which is what the fit engine has to detect.

use serde::{Deserialize, Serialize};

use crate::layout::font_metrics::{get_metrics, FontFace};
use crate::layout::surface::WrapMode;

/// One laid-out line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    /// Rendered width in pixels.
    pub width: f32,
}

/// Breaks `text` into lines at `size_px`.
///
/// `NoWrap` always yields a single line. An empty or whitespace-only string yields no lines.
pub fn wrap_lines(
    text: &str,
    face: FontFace,
    size_px: f32,
    max_width: f32,
    mode: WrapMode,
) -> Vec<Line> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }

    let metrics = get_metrics(face);

    if mode == WrapMode::NoWrap {
        let joined = words.join(" ");
        let width = metrics.measure_px(&joined, size_px);
        return vec![Line {
            text: joined,
            width,
        }];
    }

    let space_w = metrics.space_width * size_px;
    let mut lines: Vec<Line> = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0_f32;

    for word in words {
        let word_w = metrics.measure_px(word, size_px);

        if !current.is_empty() && current_width + space_w + word_w > max_width {
            // Current line is full; the word starts a new one even if it alone is too wide.
            lines.push(Line {
                text: std::mem::take(&mut current),
                width: current_width,
            });
            current_width = 0.0;
        }

        if current.is_empty() {
            current.push_str(word);
            current_width = word_w;
        } else {
            current.push(' ');
            current.push_str(word);
            current_width += space_w + word_w;
        }
    }
    lines.push(Line {
        text: current,
        width: current_width,
    });

    lines
}

/// Width of the widest line, 0 for no lines.
pub fn max_line_width(lines: &[Line]) -> f32 {
    lines.iter().map(|l| l.width).fold(0.0, f32::max)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

//! Typography auto-fit engine.
//!
//! Finds the largest uniform font size at which everything on a `LayoutSurface` is visible
//! inside the container minus a guard margin.
//!
//! # Search
//! 1. No-wrap mode, seed proportional to the smaller container side.
//! 2. Seed fits → grow geometrically until the first overflow, then bisect between the last fit
//!    and that overflow. Seed overflows → bisect between the absolute minimum and the seed.
//! 3. Below the wrap threshold → repeat in soft-wrap mode.
//! 4. Capped field (description) is shrunk on its own until it is within its line cap.
//! 5. Safety net: if anything still overflows, the whole block gets a visual scale < 1,
//!    never below `min_scale`.
//!
//! The engine has no error path. Degenerate containers fit trivially.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layout::surface::{LayoutSurface, Measurement, Size, WrapMode};

// ────────────────────────────────────────────────────────────────────────────
// Parameters and results
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the fit engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Multiplier per step of the growth phase.
    pub growth_factor: f32,
    /// Seed = `seed_ratio` × min(width, height).
    pub seed_ratio: f32,
    pub seed_min_px: f32,
    pub seed_max_px: f32,
    /// Absolute minimum font size the search goes down to.
    pub min_font_px: f32,
    /// Upper cap on the font size; `None` lets short text grow without bound.
    pub max_font_px: Option<f32>,
    /// Below this size no-wrap gives way to soft-wrap.
    pub wrap_threshold_px: f32,
    pub guard_ratio: f32,
    pub guard_min_px: f32,
    /// Floor of the whole-block fallback scale.
    pub min_scale: f32,
    pub search_iterations: u32,
    pub tolerance_px: f32,
    pub max_growth_steps: u32,
    /// Line cap of the capped field.
    pub capped_lines: usize,
    /// The capped field never goes below this fraction of the global size.
    pub capped_floor_ratio: f32,
    pub capped_search_iterations: u32,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            growth_factor: 1.07,
            seed_ratio: 0.105,
            seed_min_px: 4.0,
            seed_max_px: 160.0,
            min_font_px: 4.0,
            max_font_px: Some(240.0),
            wrap_threshold_px: 10.0,
            guard_ratio: 0.015,
            guard_min_px: 2.0,
            min_scale: 0.02,
            search_iterations: 20,
            tolerance_px: 0.05,
            max_growth_steps: 96,
            capped_lines: 2,
            capped_floor_ratio: 0.7,
            capped_search_iterations: 18,
        }
    }
}

/// How a fit pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitOutcome {
    /// Content fits at scale 1.
    Fitted,
    /// Content only fits through the whole-block fallback scale (or sits at its floor).
    Scaled,
    /// Zero-size container; nothing to fit.
    Trivial,
}

/// Per-surface result of one render pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitState {
    pub font_size_px: f32,
    pub wrap_mode: WrapMode,
    pub scale: f32,
    /// Scalar used for the capped field when it had to be shrunk below the global size.
    pub capped_font_px: Option<f32>,
    pub outcome: FitOutcome,
}

/// Space reserved along each axis before fit-checking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guard {
    pub x: f32,
    pub y: f32,
}

impl Guard {
    pub fn for_container(size: Size, params: &FitParams) -> Self {
        Self {
            x: (size.width * params.guard_ratio).max(params.guard_min_px),
            y: (size.height * params.guard_ratio).max(params.guard_min_px),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cooperative cancellation
// ────────────────────────────────────────────────────────────────────────────

/// Shared boolean checked between units of work. Never interrupts a unit in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of fitting several surfaces in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRun {
    /// One state per surface that was fitted, in order.
    pub states: Vec<FitState>,
    pub cancelled: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Fit checks
// ────────────────────────────────────────────────────────────────────────────

/// True when no constrained cell overflows and the content, cells included, is inside the
/// guarded client box.
pub fn fits(measurement: &Measurement, client: Size, guard: Guard) -> bool {
    let avail_w = client.width - guard.x;
    if measurement
        .cells
        .iter()
        .any(|c| c.overflows() || c.extent() > avail_w)
    {
        return false;
    }
    measurement.content_width <= avail_w && measurement.content_height <= client.height - guard.y
}

fn surface_fits<S: LayoutSurface + ?Sized>(surface: &S, guard: Guard) -> bool {
    fits(&surface.measure(), surface.client_size(), guard)
}

/// Starting size of the search for a container.
pub fn seed_font_size(client: Size, params: &FitParams) -> f32 {
    let raw = params.seed_ratio * client.width.min(client.height);
    let mut seed = raw.max(params.seed_min_px).min(params.seed_max_px);
    if let Some(cap) = params.max_font_px {
        seed = seed.min(cap);
    }
    seed.max(params.min_font_px)
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry points
// ────────────────────────────────────────────────────────────────────────────

/// Runs the full search on one surface and leaves it in the chosen state.
pub fn fit_surface<S: LayoutSurface + ?Sized>(surface: &mut S, params: &FitParams) -> FitState {
    surface.set_scale(1.0);
    surface.set_capped_font_size(None);
    surface.set_wrap_mode(WrapMode::NoWrap);

    let client = surface.client_size();
    if client.is_degenerate() {
        return trivial(surface, seed_font_size(client, params), WrapMode::NoWrap);
    }
    let guard = Guard::for_container(client, params);

    let mut font = search_font_size(surface, guard, params);
    let mut mode = WrapMode::NoWrap;

    if font < params.wrap_threshold_px {
        surface.set_wrap_mode(WrapMode::SoftWrap);
        let soft = search_font_size(surface, guard, params);
        debug!(nowrap = font, softwrap = soft, "auto-fit: below wrap threshold");
        if soft >= font {
            font = soft;
            mode = WrapMode::SoftWrap;
        } else {
            surface.set_wrap_mode(WrapMode::NoWrap);
        }
    }

    finalize(surface, font, mode, guard, params)
}

/// Applies a fixed base size (bucket typography) and runs only the capped-field search and
/// the safety net.
pub fn fit_at_size<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    font_px: f32,
    params: &FitParams,
) -> FitState {
    surface.set_scale(1.0);
    surface.set_capped_font_size(None);

    let mode = if font_px < params.wrap_threshold_px {
        WrapMode::SoftWrap
    } else {
        WrapMode::NoWrap
    };
    surface.set_wrap_mode(mode);
    surface.set_font_size(font_px);

    let client = surface.client_size();
    if client.is_degenerate() {
        return trivial(surface, font_px, mode);
    }
    let guard = Guard::for_container(client, params);

    finalize(surface, font_px, mode, guard, params)
}

/// Fits surfaces one after another, checking `cancel` before each one.
///
/// Surfaces after the cancellation point are not touched at all.
pub fn fit_each<S: LayoutSurface>(
    surfaces: &mut [S],
    params: &FitParams,
    cancel: &CancelToken,
) -> FitRun {
    fit_each_with(surfaces, cancel, |surface| fit_surface(surface, params))
}

/// `fit_each` with a caller-chosen fit per item, e.g. a fixed bucket size for some faces.
pub fn fit_each_with<S, F>(items: &mut [S], cancel: &CancelToken, mut fit: F) -> FitRun
where
    F: FnMut(&mut S) -> FitState,
{
    let mut states = Vec::with_capacity(items.len());
    for item in items.iter_mut() {
        if cancel.is_cancelled() {
            debug!(fitted = states.len(), "auto-fit: cancelled");
            return FitRun {
                states,
                cancelled: true,
            };
        }
        states.push(fit(item));
    }
    FitRun {
        states,
        cancelled: false,
    }
}

/// Shrinks the capped field alone until it is within `params.capped_lines`.
///
/// Returns the scalar applied to the field, or `None` when it already fits at `global_px`
/// or the surface has no capped field.
pub fn fit_capped_field<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    global_px: f32,
    params: &FitParams,
) -> Option<f32> {
    surface.set_capped_font_size(None);
    let lines = surface.capped_line_count()?;
    if lines <= params.capped_lines {
        return None;
    }

    let floor = (global_px * params.capped_floor_ratio)
        .max(params.min_font_px)
        .min(global_px);
    let mut lo = floor;
    let mut hi = global_px;
    let mut best = floor;

    for _ in 0..params.capped_search_iterations {
        let mid = (lo + hi) / 2.0;
        surface.set_capped_font_size(Some(mid));
        let within_cap = surface
            .capped_line_count()
            .map_or(true, |n| n <= params.capped_lines);
        if within_cap {
            best = mid;
            lo = mid;
        } else {
            hi = mid;
        }
    }

    surface.set_capped_font_size(Some(best));
    Some(best)
}

/// Scales the whole content block so its widest and tallest extents land inside the guard.
///
/// The scale never goes below `params.min_scale` or above 1.
pub fn apply_scale_fallback<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    guard: Guard,
    params: &FitParams,
) -> f32 {
    let client = surface.client_size();
    let measurement = surface.measure();

    let avail_w = (client.width - guard.x).max(1.0);
    let avail_h = (client.height - guard.y).max(1.0);

    let widest = measurement
        .cells
        .iter()
        .map(|c| c.extent())
        .fold(measurement.content_width, f32::max)
        .max(1.0);
    let tallest = measurement.content_height.max(1.0);

    let k = (avail_w / widest)
        .min(avail_h / tallest)
        .min(1.0)
        .max(params.min_scale);
    surface.set_scale(k);
    k
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn trivial<S: LayoutSurface + ?Sized>(surface: &mut S, font_px: f32, mode: WrapMode) -> FitState {
    surface.set_font_size(font_px);
    surface.set_scale(1.0);
    FitState {
        font_size_px: font_px,
        wrap_mode: mode,
        scale: 1.0,
        capped_font_px: None,
        outcome: FitOutcome::Trivial,
    }
}

fn finalize<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    font_px: f32,
    mode: WrapMode,
    guard: Guard,
    params: &FitParams,
) -> FitState {
    surface.set_font_size(font_px);
    let capped_font_px = fit_capped_field(surface, font_px, params);

    let (scale, outcome) = if surface_fits(surface, guard) {
        surface.set_scale(1.0);
        (1.0, FitOutcome::Fitted)
    } else {
        let k = apply_scale_fallback(surface, guard, params);
        debug!(font = font_px, scale = k, "auto-fit: fallback scale applied");
        (k, FitOutcome::Scaled)
    };

    FitState {
        font_size_px: font_px,
        wrap_mode: mode,
        scale,
        capped_font_px,
        outcome,
    }
}

/// Largest fitting size for the current wrap mode. Leaves the surface at that size.
fn search_font_size<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    guard: Guard,
    params: &FitParams,
) -> f32 {
    let seed = seed_font_size(surface.client_size(), params);
    surface.set_font_size(seed);

    let best = if surface_fits(surface, guard) {
        grow_from(surface, seed, guard, params)
    } else {
        shrink_below(surface, seed, guard, params)
    };
    surface.set_font_size(best);
    best
}

fn grow_from<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    seed: f32,
    guard: Guard,
    params: &FitParams,
) -> f32 {
    let cap = params.max_font_px.unwrap_or(f32::INFINITY);
    let mut last_fit = seed;

    for _ in 0..params.max_growth_steps {
        let next = (last_fit * params.growth_factor).min(cap);
        if next <= last_fit {
            break;
        }
        surface.set_font_size(next);
        if surface_fits(surface, guard) {
            last_fit = next;
        } else {
            return bisect(surface, last_fit, next, guard, params);
        }
    }
    last_fit
}

fn shrink_below<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    seed: f32,
    guard: Guard,
    params: &FitParams,
) -> f32 {
    let floor = params.min_font_px;
    if seed <= floor {
        return floor;
    }
    surface.set_font_size(floor);
    if !surface_fits(surface, guard) {
        return floor;
    }
    bisect(surface, floor, seed, guard, params)
}

/// Bisects between a fitting `lo` and an overflowing `hi`; returns the last fitting size.
fn bisect<S: LayoutSurface + ?Sized>(
    surface: &mut S,
    mut lo: f32,
    mut hi: f32,
    guard: Guard,
    params: &FitParams,
) -> f32 {
    for _ in 0..params.search_iterations {
        if hi - lo <= params.tolerance_px {
            break;
        }
        let mid = (lo + hi) / 2.0;
        surface.set_font_size(mid);
        if surface_fits(surface, guard) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::surface::CellMeasure;

    const CHAR_EM: f32 = 0.6;
    const LINE_EM: f32 = 1.2;

    /// Monospace text block with an optional constrained cell and capped field.
    struct MockSurface {
        client: Size,
        text: String,
        cell_text: Option<String>,
        capped_text: Option<String>,
        font: f32,
        capped_font: Option<f32>,
        mode: WrapMode,
        scale: f32,
        wrap_calls: Vec<WrapMode>,
        mutations: usize,
        trip: Option<CancelToken>,
    }

    impl MockSurface {
        fn new(width: f32, height: f32, text: &str) -> Self {
            Self {
                client: Size::new(width, height),
                text: text.to_string(),
                cell_text: None,
                capped_text: None,
                font: 16.0,
                capped_font: None,
                mode: WrapMode::NoWrap,
                scale: 1.0,
                wrap_calls: vec![],
                mutations: 0,
                trip: None,
            }
        }

        fn word_width(&self, word: &str, font: f32) -> f32 {
            word.chars().count() as f32 * CHAR_EM * font
        }

        /// (widest line, line count) at `font` within `max_width`.
        fn layout(&self, text: &str, font: f32, max_width: f32, mode: WrapMode) -> (f32, usize) {
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.is_empty() {
                return (0.0, 0);
            }
            if mode == WrapMode::NoWrap {
                return (self.word_width(&words.join(" "), font), 1);
            }
            let space = CHAR_EM * font;
            let mut widest = 0.0_f32;
            let mut current = 0.0_f32;
            let mut lines = 1;
            for (i, word) in words.iter().enumerate() {
                let w = self.word_width(word, font);
                if i > 0 && current + space + w > max_width {
                    widest = widest.max(current);
                    current = w;
                    lines += 1;
                } else if i == 0 {
                    current = w;
                } else {
                    current += space + w;
                }
            }
            (widest.max(current), lines)
        }

        fn rendered_width(&self) -> f32 {
            let m = self.measure();
            m.cells
                .iter()
                .map(|c| c.extent())
                .fold(m.content_width, f32::max)
                * self.scale
        }
    }

    impl LayoutSurface for MockSurface {
        fn client_size(&self) -> Size {
            self.client
        }

        fn measure(&self) -> Measurement {
            if let Some(token) = &self.trip {
                token.cancel();
            }
            let (width, lines) = self.layout(&self.text, self.font, self.client.width, self.mode);
            let mut cells = vec![];
            if let Some(cell_text) = &self.cell_text {
                let left = self.client.width / 2.0;
                let (scroll, _) = self.layout(cell_text, self.font, left, WrapMode::NoWrap);
                cells.push(CellMeasure {
                    left,
                    scroll_width: scroll,
                    client_width: self.client.width - left,
                });
            }
            Measurement {
                content_width: width,
                content_height: lines as f32 * LINE_EM * self.font,
                cells,
            }
        }

        fn set_font_size(&mut self, px: f32) {
            self.mutations += 1;
            self.font = px;
        }

        fn set_wrap_mode(&mut self, mode: WrapMode) {
            self.mutations += 1;
            self.wrap_calls.push(mode);
            self.mode = mode;
        }

        fn set_scale(&mut self, k: f32) {
            self.mutations += 1;
            self.scale = k;
        }

        fn capped_line_count(&self) -> Option<usize> {
            let text = self.capped_text.as_ref()?;
            let font = self.capped_font.unwrap_or(self.font);
            Some(self.layout(text, font, self.client.width, WrapMode::SoftWrap).1)
        }

        fn set_capped_font_size(&mut self, px: Option<f32>) {
            self.mutations += 1;
            self.capped_font = px;
        }
    }

    fn params() -> FitParams {
        FitParams::default()
    }

    // ── scenarios ───────────────────────────────────────────────────────────

    #[test]
    fn test_short_label_fits_tightly_at_scale_one() {
        let mut surface = MockSurface::new(300.0, 200.0, "HELLO");
        let state = fit_surface(&mut surface, &params());

        assert_eq!(state.outcome, FitOutcome::Fitted);
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.wrap_mode, WrapMode::NoWrap);

        let ratio = surface.measure().content_width / 300.0;
        assert!(
            (0.90..=0.986).contains(&ratio),
            "text should use 90-98% of the width, got {ratio}"
        );
    }

    #[test]
    fn test_unbreakable_code_in_tiny_box_falls_back_to_scale() {
        let mut surface = MockSurface::new(40.0, 20.0, "ABCDEFGHIJKLMNOPQRST");
        let p = params();
        let state = fit_surface(&mut surface, &p);

        assert!(surface.wrap_calls.contains(&WrapMode::SoftWrap));
        assert_eq!(state.outcome, FitOutcome::Scaled);
        assert_eq!(state.font_size_px, p.min_font_px);
        assert!(state.scale < 1.0);

        let guard = Guard::for_container(surface.client, &p);
        let rendered = surface.rendered_width();
        assert!(
            (rendered - (40.0 - guard.x)).abs() < 1e-3,
            "rendered width {rendered} should meet the guard exactly"
        );
    }

    #[test]
    fn test_cancel_after_first_leaves_second_untouched() {
        let token = CancelToken::new();
        let mut first = MockSurface::new(200.0, 100.0, "FIRST");
        first.trip = Some(token.clone());
        let second = MockSurface::new(200.0, 100.0, "SECOND");

        let mut surfaces = vec![first, second];
        let run = fit_each(&mut surfaces, &params(), &token);

        assert!(run.cancelled);
        assert_eq!(run.states.len(), 1);
        assert_eq!(surfaces[1].mutations, 0);
        assert_eq!(surfaces[1].font, 16.0);
    }

    #[test]
    fn test_fit_each_without_cancel_fits_all() {
        let mut surfaces = vec![
            MockSurface::new(200.0, 100.0, "ONE"),
            MockSurface::new(100.0, 200.0, "TWO"),
        ];
        let run = fit_each(&mut surfaces, &params(), &CancelToken::new());
        assert!(!run.cancelled);
        assert_eq!(run.states.len(), 2);
    }

    // ── wrap threshold ──────────────────────────────────────────────────────

    #[test]
    fn test_softwrap_never_engaged_above_threshold() {
        let mut surface = MockSurface::new(400.0, 300.0, "LG1000843 Combination Lock");
        let state = fit_surface(&mut surface, &params());
        assert!(state.font_size_px >= 10.0);
        assert_eq!(state.wrap_mode, WrapMode::NoWrap);
        assert!(!surface.wrap_calls.contains(&WrapMode::SoftWrap));
    }

    #[test]
    fn test_softwrap_tried_below_threshold() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let mut surface = MockSurface::new(60.0, 200.0, text);
        let state = fit_surface(&mut surface, &params());

        assert!(surface.wrap_calls.contains(&WrapMode::SoftWrap));
        assert_eq!(state.wrap_mode, WrapMode::SoftWrap);
        assert_eq!(state.outcome, FitOutcome::Fitted);
        assert!(state.font_size_px > params().min_font_px);
    }

    // ── properties ──────────────────────────────────────────────────────────

    #[test]
    fn test_idempotent_on_unchanged_surface() {
        let mut surface = MockSurface::new(180.0, 90.0, "EAN 8719632951889 QTY 12 PCS");
        let first = fit_surface(&mut surface, &params());
        let second = fit_surface(&mut surface, &params());
        assert_eq!(first, second);
    }

    fn assert_monotone(text: &str, widths: impl Iterator<Item = f32>) {
        let p = params();
        let mut previous = 0.0_f32;
        for width in widths {
            let mut surface = MockSurface::new(width, width * 0.6, text);
            let state = fit_surface(&mut surface, &p);
            assert!(
                state.font_size_px + p.tolerance_px >= previous,
                "{text:?}: font shrank from {previous} to {} at width {width}",
                state.font_size_px
            );
            previous = state.font_size_px;
        }
    }

    #[test]
    fn test_font_size_monotone_for_single_token() {
        assert_monotone("LG1000843", (0..20).map(|i| 30.0 + i as f32 * 25.0));
    }

    // Monotonicity only holds while no-wrap stays at or above the wrap threshold. Once it drops
    // below, soft-wrap may pick a larger size than a wider box that still fits on one line.
    #[test]
    fn test_font_size_monotone_within_nowrap_range() {
        assert_monotone(
            "Combination Lock Orange",
            (0..20).map(|i| 200.0 + i as f32 * 25.0),
        );
    }

    #[test]
    fn test_softwrap_can_outgrow_wider_nowrap_box() {
        let text = "alpha beta gamma delta";
        let p = params();

        // No-wrap tops out near 7.4px here, so soft-wrap takes over at one word per line.
        let mut narrow = MockSurface::new(100.0, 200.0, text);
        let narrow_state = fit_surface(&mut narrow, &p);
        assert_eq!(narrow_state.wrap_mode, WrapMode::SoftWrap);

        // No-wrap reaches about 10.4px, just above the threshold, so it is kept.
        let mut wide = MockSurface::new(140.0, 200.0, text);
        let wide_state = fit_surface(&mut wide, &p);
        assert_eq!(wide_state.wrap_mode, WrapMode::NoWrap);
        assert!(wide_state.font_size_px >= p.wrap_threshold_px);

        assert!(
            narrow_state.font_size_px > wide_state.font_size_px * 2.0,
            "narrow {} vs wide {}",
            narrow_state.font_size_px,
            wide_state.font_size_px
        );
    }

    #[test]
    fn test_everything_inside_guard_or_at_floor() {
        let p = params();
        let texts = [
            "A",
            "HELLO WORLD",
            "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
            "one two three four five six seven eight nine ten",
        ];
        for &(w, h) in &[(10.0, 10.0), (40.0, 20.0), (120.0, 300.0), (500.0, 80.0)] {
            for text in texts {
                let mut surface = MockSurface::new(w, h, text);
                let state = fit_surface(&mut surface, &p);
                let guard = Guard::for_container(surface.client, &p);
                let m = surface.measure();
                let inside = surface.rendered_width() <= w - guard.x + 1e-3
                    && m.content_height * state.scale <= h - guard.y + 1e-3;
                assert!(
                    inside || state.scale == p.min_scale,
                    "{text:?} in {w}x{h} escaped: {state:?}"
                );
            }
        }
    }

    // ── constrained cells ───────────────────────────────────────────────────

    #[test]
    fn test_fits_detects_cell_overflow_without_content_growth() {
        let client = Size::new(100.0, 100.0);
        let guard = Guard::for_container(client, &params());
        let measurement = Measurement {
            content_width: 40.0,
            content_height: 20.0,
            cells: vec![CellMeasure {
                left: 50.0,
                scroll_width: 70.0,
                client_width: 50.0,
            }],
        };
        assert!(!fits(&measurement, client, guard));
    }

    #[test]
    fn test_cell_overflow_drives_font_down() {
        let mut surface = MockSurface::new(200.0, 100.0, "EAN:");
        surface.cell_text = Some("8719632951889".to_string());
        let state = fit_surface(&mut surface, &params());

        assert_eq!(state.outcome, FitOutcome::Fitted);
        let m = surface.measure();
        assert!(m.cells.iter().all(|c| !c.overflows()));
    }

    // ── capped field ────────────────────────────────────────────────────────

    #[test]
    fn test_capped_field_shrinks_to_line_cap() {
        let p = params();
        let mut surface = MockSurface::new(300.0, 200.0, "LG1000843");
        surface.capped_text = Some("Combination Lock Orange One Pack".to_string());
        let state = fit_surface(&mut surface, &p);

        match state.capped_font_px {
            Some(capped) => {
                assert!(capped < state.font_size_px);
                assert!(capped >= state.font_size_px * p.capped_floor_ratio - 1e-3);
                let lines = surface.capped_line_count().unwrap();
                let at_floor = (capped - state.font_size_px * p.capped_floor_ratio).abs() < 1e-3;
                assert!(lines <= p.capped_lines || at_floor);
            }
            None => assert!(surface.capped_line_count().unwrap() <= p.capped_lines),
        }
    }

    #[test]
    fn test_capped_field_untouched_when_within_cap() {
        let mut surface = MockSurface::new(300.0, 200.0, "LG1000843");
        surface.capped_text = Some("Lock".to_string());
        let state = fit_surface(&mut surface, &params());
        assert_eq!(state.capped_font_px, None);
    }

    // ── edge cases ──────────────────────────────────────────────────────────

    #[test]
    fn test_zero_size_container_is_trivial() {
        let mut surface = MockSurface::new(0.0, 50.0, "HELLO");
        let state = fit_surface(&mut surface, &params());
        assert_eq!(state.outcome, FitOutcome::Trivial);
        assert_eq!(state.scale, 1.0);
    }

    #[test]
    fn test_max_font_cap_respected() {
        let mut surface = MockSurface::new(4000.0, 4000.0, "A");
        let state = fit_surface(&mut surface, &params());
        assert_eq!(state.font_size_px, 240.0);
    }

    #[test]
    fn test_no_cap_grows_further() {
        let p = FitParams {
            max_font_px: None,
            ..FitParams::default()
        };
        let mut surface = MockSurface::new(4000.0, 4000.0, "A");
        let state = fit_surface(&mut surface, &p);
        assert!(state.font_size_px > 240.0);
    }

    #[test]
    fn test_fit_at_size_small_bucket_size_enables_softwrap() {
        let mut surface = MockSurface::new(300.0, 200.0, "HELLO");
        let state = fit_at_size(&mut surface, 8.0, &params());
        assert_eq!(state.wrap_mode, WrapMode::SoftWrap);
        assert_eq!(state.font_size_px, 8.0);
        assert_eq!(state.outcome, FitOutcome::Fitted);
    }

    #[test]
    fn test_fit_at_size_oversized_bucket_size_scales() {
        let mut surface = MockSurface::new(100.0, 50.0, "HELLO");
        let state = fit_at_size(&mut surface, 60.0, &params());
        assert_eq!(state.outcome, FitOutcome::Scaled);
        assert!(state.scale < 1.0);
    }

    #[test]
    fn test_seed_clamped() {
        let p = params();
        assert_eq!(seed_font_size(Size::new(10.0, 10.0), &p), p.seed_min_px);
        assert_eq!(seed_font_size(Size::new(1e5, 1e5), &p), p.seed_max_px);
    }
}

//! Bucket typography table.
//!
//! A label face is classified by aspect ratio (family + variant) and by its longer side (size
//! class). Each bucket key can carry an anchor with reference point sizes per text role, which
//! are scaled linearly with the face size. Faces without an anchor fall back to the global fit
//! search.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels::geometry::PX_PER_PT;
use crate::layout::label_surface::Typography;

const DEFAULT_SQUARE_EPS: f32 = 0.1;

#[derive(Debug, Error)]
pub enum BucketConfigError {
    #[error("failed to read bucket config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bucket config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bucket config is invalid: anchors missing")]
    MissingAnchors,
}

// ────────────────────────────────────────────────────────────────────────────
// Config file model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketConfigFile {
    #[serde(default)]
    bucket_rules: Option<BucketRules>,
    anchors: Option<Vec<BucketAnchor>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketRules {
    #[serde(default)]
    family_selection: Option<FamilySelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FamilySelection {
    #[serde(default)]
    square_tolerance: Option<SquareTolerance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SquareTolerance {
    #[serde(default)]
    eps: Option<f32>,
}

/// Point size of one role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSize {
    #[serde(default)]
    pub pt: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSizes {
    #[serde(default)]
    pub erp_text: AnchorSize,
    #[serde(default)]
    pub product_description: AnchorSize,
    #[serde(default)]
    pub content_label: AnchorSize,
    #[serde(default)]
    pub content_text: AnchorSize,
    #[serde(default)]
    pub footer: AnchorSize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRequirements {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub size_class: Option<String>,
}

/// One entry of the `anchors` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketAnchor {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Longer side of the face the point sizes were designed for.
    #[serde(rename = "D_ref_cm", default)]
    pub d_ref_cm: Option<f32>,
    #[serde(default)]
    pub anchors: AnchorSizes,
    #[serde(default)]
    pub requirements: AnchorRequirements,
}

impl BucketAnchor {
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Family {
    Square,
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeClass {
    Micro,
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl Family {
    fn as_str(&self) -> &'static str {
        match self {
            Family::Square => "SQUARE",
            Family::Portrait => "PORTRAIT",
            Family::Landscape => "LANDSCAPE",
        }
    }
}

impl SizeClass {
    /// Class of the longer side in cm; `None` outside 5..=100.
    pub fn for_length(d_cm: f32) -> Option<Self> {
        match d_cm {
            d if (5.0..10.0).contains(&d) => Some(SizeClass::Micro),
            d if (10.0..25.0).contains(&d) => Some(SizeClass::Small),
            d if (25.0..40.0).contains(&d) => Some(SizeClass::Medium),
            d if (40.0..70.0).contains(&d) => Some(SizeClass::Large),
            d if (70.0..=100.0).contains(&d) => Some(SizeClass::ExtraLarge),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Micro => "MICRO",
            SizeClass::Small => "SMALL",
            SizeClass::Medium => "MEDIUM",
            SizeClass::Large => "LARGE",
            SizeClass::ExtraLarge => "EXTRA_LARGE",
        }
    }
}

/// Bucket key of a face, e.g. `PORTRAIT_SMALL_STANDARD` or `SQUARE_MEDIUM`.
///
/// `None` for non-positive sizes or a longer side outside the known size classes.
pub fn select_bucket_key(w_cm: f32, h_cm: f32, square_eps: f32) -> Option<String> {
    if !(w_cm.is_finite() && h_cm.is_finite() && w_cm > 0.0 && h_cm > 0.0) {
        return None;
    }
    let r = w_cm / h_cm;
    let q = h_cm / w_cm;

    let family = if (1.0 - square_eps..=1.0 + square_eps).contains(&r) {
        Family::Square
    } else if r < 1.0 - square_eps {
        Family::Portrait
    } else {
        Family::Landscape
    };

    let variant = match family {
        Family::Square => None,
        Family::Portrait => Some(if r < 0.4 {
            "NARROW"
        } else if r < 0.65 {
            "STANDARD"
        } else {
            "WIDE"
        }),
        Family::Landscape => Some(if q < 0.4 {
            "SHORT"
        } else if q < 0.65 {
            "STANDARD"
        } else {
            "HIGH"
        }),
    };

    let size_class = SizeClass::for_length(w_cm.max(h_cm))?;

    Some(match variant {
        None => format!("{}_{}", family.as_str(), size_class.as_str()),
        Some(v) => format!("{}_{}_{}", family.as_str(), size_class.as_str(), v),
    })
}

/// Keys tried after the exact one: variant → STANDARD, then the widest variant of the family.
fn fallback_keys(key: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let Some((stem, variant)) = key.rsplit_once('_') else {
        return keys;
    };

    if variant == "NARROW" || variant == "SHORT" {
        keys.push(format!("{stem}_STANDARD"));
    }
    if key.starts_with("PORTRAIT_") && matches!(variant, "NARROW" | "STANDARD" | "WIDE") {
        keys.push(format!("{stem}_WIDE"));
    } else if key.starts_with("LANDSCAPE_") && matches!(variant, "SHORT" | "STANDARD" | "HIGH") {
        keys.push(format!("{stem}_HIGH"));
    }
    keys
}

// ────────────────────────────────────────────────────────────────────────────
// Table
// ────────────────────────────────────────────────────────────────────────────

/// Anchors indexed by upper-cased key.
#[derive(Debug, Clone, Default)]
pub struct BucketTable {
    square_eps: f32,
    by_key: HashMap<String, BucketAnchor>,
}

impl BucketTable {
    /// Table without anchors; every face uses the global fit search.
    pub fn empty() -> Self {
        Self {
            square_eps: DEFAULT_SQUARE_EPS,
            by_key: HashMap::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BucketConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| BucketConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BucketConfigError> {
        let file: BucketConfigFile = serde_json::from_str(raw)?;
        let anchors = file.anchors.ok_or(BucketConfigError::MissingAnchors)?;

        let square_eps = file
            .bucket_rules
            .and_then(|r| r.family_selection)
            .and_then(|f| f.square_tolerance)
            .and_then(|t| t.eps)
            .filter(|eps| *eps > 0.0)
            .unwrap_or(DEFAULT_SQUARE_EPS);

        let mut by_key = HashMap::with_capacity(anchors.len());
        for anchor in anchors {
            let Some(key) = anchor.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            by_key.insert(key.to_uppercase(), anchor);
        }

        Ok(Self { square_eps, by_key })
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn select_key(&self, w_cm: f32, h_cm: f32) -> Option<String> {
        select_bucket_key(w_cm, h_cm, self.square_eps)
    }

    /// Anchor for a face: exact key first, then the variant fallbacks.
    ///
    /// A disabled anchor on the first key found means "no anchor"; the lookup does not continue.
    pub fn anchor_for(&self, w_cm: f32, h_cm: f32) -> Option<&BucketAnchor> {
        let key = self.select_key(w_cm, h_cm)?;
        let anchor = std::iter::once(key.clone())
            .chain(fallback_keys(&key))
            .find_map(|k| self.by_key.get(&k))?;
        anchor.is_enabled().then_some(anchor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Typography from an anchor
// ────────────────────────────────────────────────────────────────────────────

/// Role sizes in px for one face, derived from its anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTypography {
    pub key: String,
    /// Linear scale of the anchor's point sizes: D / D_ref.
    pub k: f32,
    pub erp_px: f32,
    pub desc_px: f32,
    pub label_px: f32,
    pub text_px: f32,
    pub footer_px: f32,
    pub requirements: AnchorRequirements,
}

impl BucketTypography {
    pub fn from_anchor(anchor: &BucketAnchor, w_cm: f32, h_cm: f32) -> Self {
        let d = w_cm.max(h_cm);
        let d_ref = anchor.d_ref_cm.filter(|d| *d > 0.0).unwrap_or(d);
        let k = if d_ref > 0.0 { d / d_ref } else { 1.0 };
        let px = |size: AnchorSize| size.pt * k * PX_PER_PT;

        Self {
            key: anchor.key.clone().unwrap_or_default(),
            k,
            erp_px: px(anchor.anchors.erp_text),
            desc_px: px(anchor.anchors.product_description),
            label_px: px(anchor.anchors.content_label),
            text_px: px(anchor.anchors.content_text),
            footer_px: px(anchor.anchors.footer),
            requirements: anchor.requirements.clone(),
        }
    }

    /// Ratios plus the base scalar for the label surface, or `None` without a usable text size.
    pub fn to_typography(&self) -> Option<(Typography, f32)> {
        let typography = Typography::from_role_sizes(
            self.erp_px,
            self.desc_px,
            self.label_px,
            self.text_px,
            self.footer_px,
        )?;
        Some((typography, self.text_px))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

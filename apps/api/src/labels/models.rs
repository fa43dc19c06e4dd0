//! Form model of one carton: product fields plus box dimensions.

use serde::{Deserialize, Deserializer, Serialize};

/// Everything printed on the four labels of one carton.
///
/// Dimensions are in centimetres. They accept JSON numbers as well as strings with a decimal
/// comma (`"19,5"`), the way the values are typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelValues {
    /// ERP product code.
    pub code: String,
    pub desc: String,
    pub ean: String,
    pub qty: String,
    /// Gross weight in kg.
    pub gw: String,
    pub cbm: String,
    #[serde(deserialize_with = "de_dimension")]
    pub len: Option<f32>,
    #[serde(deserialize_with = "de_dimension")]
    pub wid: Option<f32>,
    #[serde(deserialize_with = "de_dimension")]
    pub hei: Option<f32>,
    pub batch: String,
}

/// Outer box dimensions in centimetres; missing values count as 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxDimensions {
    pub length: f32,
    pub width: f32,
    pub height: f32,
}

impl LabelValues {
    pub fn dimensions(&self) -> BoxDimensions {
        BoxDimensions {
            length: self.len.unwrap_or(0.0),
            width: self.wid.unwrap_or(0.0),
            height: self.hei.unwrap_or(0.0),
        }
    }

    /// Names of the dimensions that are missing or not positive.
    pub fn invalid_dimensions(&self) -> Vec<&'static str> {
        [("length", self.len), ("width", self.wid), ("height", self.hei)]
            .into_iter()
            .filter(|(_, v)| !v.is_some_and(|n| n > 0.0))
            .map(|(name, _)| name)
            .collect()
    }

    /// File-name stem for exports: the trimmed product code or `export`.
    pub fn export_stem(&self) -> &str {
        let code = self.code.trim();
        if code.is_empty() {
            "export"
        } else {
            code
        }
    }
}

/// Parses a form number, accepting a decimal comma. Blank or garbage yields `None`.
pub fn parse_number(raw: &str) -> Option<f32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replacen(',', ".", 1)
        .parse::<f32>()
        .ok()
        .filter(|n| n.is_finite())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f32),
    Text(String),
}

fn de_dimension<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrText> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(NumberOrText::Number(n)) if n.is_finite() => Some(n),
        Some(NumberOrText::Number(_)) => None,
        Some(NumberOrText::Text(s)) => parse_number(&s),
        None => None,
    })
}

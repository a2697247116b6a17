//! Normalizes the "Recommendation" section of an assessment.
//!
//! Inpatient recommendations are rewritten to a fixed sentence naming an urgency
//! category derived from the recommended time-to-echo. Anything else is returned
//! trimmed and otherwise untouched.
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// "within 24 hours", "in 12-48 hours", "up to 1 hour" (dash, en dash or em dash).
///
/// ASCII digits only.
static TIME_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:within|in|up\s+to)\s+([0-9]+)(?:\s*[-–—]\s*([0-9]+))?\s*hours?\b")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    One,
    Two,
    Three,
    Four,
    Five,
    Unspecified,
}

impl Category {
    /// Inclusive upper-bound thresholds: 1h, 24h, 36h, 168h, then anything longer.
    pub fn from_upper_bound(hours: u64) -> Self {
        match hours {
            0..=1 => Self::One,
            2..=24 => Self::Two,
            25..=36 => Self::Three,
            37..=168 => Self::Four,
            _ => Self::Five,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::One => "Category 1",
            Self::Two => "Category 2",
            Self::Three => "Category 3",
            Self::Four => "Category 4",
            Self::Five => "Category 5",
            Self::Unspecified => "Category (unspecified)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeExpression {
    pub lower_hours: Option<u64>,
    pub upper_hours: u64,
}

impl TimeExpression {
    /// First time-range phrase in `text`, if any.
    pub fn find(text: &str) -> Option<Self> {
        let caps = TIME_RANGE_RE.captures(text)?;
        let first = parse_hours(caps.get(1)?.as_str());
        Some(match caps.get(2) {
            Some(second) => Self {
                lower_hours: Some(first),
                upper_hours: parse_hours(second.as_str()),
            },
            None => Self {
                lower_hours: None,
                upper_hours: first,
            },
        })
    }

    pub fn category(&self) -> Category {
        Category::from_upper_bound(self.upper_hours)
    }
}

/// Hour counts are ASCII digit runs; anything too large for `u64` saturates.
fn parse_hours(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

pub fn is_inpatient(text: &str) -> bool {
    text.to_lowercase().contains("inpatient")
}

pub fn normalize_recommendation(text: &str) -> String {
    if !is_inpatient(text) {
        return text.trim().to_string();
    }
    let category = match TimeExpression::find(text) {
        Some(time) => {
            debug!(
                lower_hours = ?time.lower_hours,
                upper_hours = time.upper_hours,
                "inpatient time frame found"
            );
            time.category()
        }
        None => Category::Unspecified,
    };
    format!("A {category} echocardiogram is recommended as an inpatient.")
}

//! Choropleth classification: intensity (0-100) to tier, colour and legend.
//!
//! The tier thresholds are fixed. A stored category is never trusted on its
//! own: it is always re-derived from the stored intensity with `classify`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::types::Severity;

pub const HIGH_THRESHOLD: f64 = 70.0;
pub const MODERATE_THRESHOLD: f64 = 30.0;

/// Display tier for a district. `NoData` is the join sentinel and is never
/// produced by `classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    High,
    Moderate,
    Low,
    #[serde(rename = "No Data")]
    NoData,
}

impl Category {
    /// The three tiers `classify` can return, highest first.
    pub const TIERS: [Category; 3] = [Category::High, Category::Moderate, Category::Low];

    pub fn label(&self) -> &'static str {
        match self {
            Category::High => "High",
            Category::Moderate => "Moderate",
            Category::Low => "Low",
            Category::NoData => "No Data",
        }
    }

    pub fn color(&self) -> Rgb {
        match self {
            Category::High => Rgb::new(0xB7, 0x20, 0x25),
            Category::Moderate => Rgb::new(0xFD, 0xB9, 0x13),
            Category::Low => Rgb::new(0x10, 0xB9, 0x81),
            Category::NoData => Rgb::new(0x94, 0xA3, 0xB8),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub color: Rgb,
}

/// Map an intensity to its tier. Lower bounds are closed: 30 is Moderate,
/// 70 is High. NaN falls through to Low.
pub fn classify(intensity: f64) -> Classification {
    let category = if intensity >= HIGH_THRESHOLD {
        Category::High
    } else if intensity >= MODERATE_THRESHOLD {
        Category::Moderate
    } else {
        Category::Low
    };
    Classification {
        category,
        color: category.color(),
    }
}

/// True when a stored `(intensity, category)` pair is still consistent with
/// the current thresholds.
pub fn is_consistent(intensity: f64, category: Category) -> bool {
    classify(intensity).category == category
}

/// Count per tier. All three tiers are always present; `NoData` rows are
/// left out of the tier counts.
pub fn category_counts<I>(categories: I) -> BTreeMap<Category, usize>
where
    I: IntoIterator<Item = Category>,
{
    let mut counts: BTreeMap<Category, usize> = Category::TIERS.iter().map(|c| (*c, 0)).collect();
    for category in categories {
        if let Some(count) = counts.get_mut(&category) {
            *count += 1;
        }
    }
    counts
}

/// Polygon fill for the map. Finer than the three tiers so neighbouring
/// districts in the same tier stay distinguishable.
pub fn fill_color(intensity: f64) -> Rgb {
    if intensity >= 70.0 {
        Rgb::new(0xB7, 0x20, 0x25)
    } else if intensity >= 50.0 {
        Rgb::new(0xE9, 0x87, 0x11)
    } else if intensity >= 30.0 {
        Rgb::new(0xFD, 0xB9, 0x13)
    } else if intensity >= 10.0 {
        Rgb::new(0x84, 0xCC, 0x16)
    } else {
        Rgb::new(0x10, 0xB9, 0x81)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub category: Category,
    pub label: String,
    pub color: Rgb,
}

pub fn legend() -> Vec<LegendEntry> {
    vec![
        LegendEntry {
            category: Category::High,
            label: format!("High (>={}%)", HIGH_THRESHOLD),
            color: Category::High.color(),
        },
        LegendEntry {
            category: Category::Moderate,
            label: format!("Moderate ({}-{}%)", MODERATE_THRESHOLD, HIGH_THRESHOLD),
            color: Category::Moderate.color(),
        },
        LegendEntry {
            category: Category::Low,
            label: format!("Low (<{}%)", MODERATE_THRESHOLD),
            color: Category::Low.color(),
        },
    ]
}

/// Health gauge bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeTone {
    Good,
    Warn,
    Bad,
}

pub fn health_status(score: f64) -> HealthStatus {
    if score >= 80.0 {
        HealthStatus::Excellent
    } else if score >= 60.0 {
        HealthStatus::Good
    } else if score >= 40.0 {
        HealthStatus::Fair
    } else {
        HealthStatus::NeedsAttention
    }
}

pub fn gauge_tone(score: f64) -> GaugeTone {
    if score >= 80.0 {
        GaugeTone::Good
    } else if score >= 50.0 {
        GaugeTone::Warn
    } else {
        GaugeTone::Bad
    }
}

/// Accent colour for an anomaly card.
pub fn severity_color(severity: Severity) -> Rgb {
    match severity {
        Severity::Critical => Rgb::new(0xEF, 0x44, 0x44),
        Severity::Warning => Rgb::new(0xF5, 0x9E, 0x0B),
        Severity::Info => Rgb::new(0x3B, 0x82, 0xF6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_closed_below() {
        assert_eq!(classify(29.999).category, Category::Low);
        assert_eq!(classify(30.0).category, Category::Moderate);
        assert_eq!(classify(69.999).category, Category::Moderate);
        assert_eq!(classify(70.0).category, Category::High);
        assert_eq!(classify(100.0).category, Category::High);
    }

    #[test]
    fn test_classify_never_returns_no_data() {
        for i in -20..=140 {
            let category = classify(i as f64 * 0.75).category;
            assert!(Category::TIERS.contains(&category), "{} gave {:?}", i, category);
        }
        assert_eq!(classify(f64::NAN).category, Category::Low);
        assert_eq!(classify(f64::INFINITY).category, Category::High);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for intensity in [0.0, 12.5, 30.0, 55.5, 70.0, 99.9] {
            let first = classify(intensity);
            assert_eq!(first, classify(intensity));
            assert!(is_consistent(intensity, first.category));
        }
        assert!(!is_consistent(71.0, Category::Moderate));
    }

    #[test]
    fn test_category_counts_include_zero_tiers() {
        let counts = category_counts([Category::High, Category::Moderate, Category::High]);
        assert_eq!(counts.get(&Category::High), Some(&2));
        assert_eq!(counts.get(&Category::Moderate), Some(&1));
        assert_eq!(counts.get(&Category::Low), Some(&0));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_no_data_is_not_counted_as_a_tier() {
        let counts = category_counts([Category::NoData, Category::Low]);
        assert_eq!(counts.get(&Category::Low), Some(&1));
        assert!(!counts.contains_key(&Category::NoData));
    }

    #[test]
    fn test_severity_colors_are_distinct() {
        assert_eq!(severity_color(Severity::Critical).hex(), "#EF4444");
        assert_eq!(severity_color(Severity::Warning).hex(), "#F59E0B");
        assert_ne!(severity_color(Severity::Info), severity_color(Severity::Warning));
    }

    #[test]
    fn test_fill_ramp_bands() {
        assert_eq!(fill_color(75.0).hex(), "#B72025");
        assert_eq!(fill_color(50.0).hex(), "#E98711");
        assert_eq!(fill_color(30.0).hex(), "#FDB913");
        assert_eq!(fill_color(10.0).hex(), "#84CC16");
        assert_eq!(fill_color(0.0).hex(), "#10B981");
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(health_status(80.0), HealthStatus::Excellent);
        assert_eq!(health_status(60.0), HealthStatus::Good);
        assert_eq!(health_status(40.0), HealthStatus::Fair);
        assert_eq!(health_status(39.9), HealthStatus::NeedsAttention);
        assert_eq!(gauge_tone(50.0), GaugeTone::Warn);
        assert_eq!(gauge_tone(49.0), GaugeTone::Bad);
    }

    #[test]
    fn test_colors_serialize_as_hex() {
        let json = serde_json::to_value(classify(90.0)).unwrap();
        assert_eq!(json["category"], "High");
        assert_eq!(json["color"], "#B72025");
        assert_eq!(serde_json::to_value(Category::NoData).unwrap(), "No Data");
    }

    #[test]
    fn test_legend_lists_three_tiers_highest_first() {
        let entries = legend();
        let categories: Vec<Category> = entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, Category::TIERS.to_vec());
        assert_eq!(entries[1].label, "Moderate (30-70%)");
    }
}

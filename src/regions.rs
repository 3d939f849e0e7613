//! Static region-membership table for map grouping.
//!
//! The boundary file only carries simplified polygons for the ten parent
//! regions; the remaining districts are drawn inside the polygon of the
//! region they are grouped with. The table cannot check itself against the
//! boundary file, so `validate` runs at startup and after every refresh and
//! reports drift instead of failing.
//!
//! Bump `REGION_TABLE_VERSION` whenever an entry changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::geometry::GeoLayer;
use crate::helpers::normalize_name;

pub const REGION_TABLE_VERSION: u32 = 3;

/// Visible region → districts drawn inside it.
const REGION_GROUPS: &[(&str, &[&str])] = &[
    ("Adilabad", &["Komaram Bheem", "Mancherial", "Nirmal"]),
    ("Hyderabad", &["Medchal-Malkajgiri", "Sangareddy", "Vikarabad"]),
    ("Karimnagar", &["Jagtial", "Peddapalli", "Rajanna Sircilla"]),
    ("Khammam", &["Bhadradri Kothagudem"]),
    (
        "Mahabubnagar",
        &["Jogulamba Gadwal", "Nagarkurnool", "Narayanpet", "Wanaparthy"],
    ),
    ("Medak", &["Siddipet"]),
    ("Nalgonda", &["Suryapet", "Yadadri Bhuvanagiri"]),
    ("Nizamabad", &["Kamareddy"]),
    ("Rangareddy", &[]),
    (
        "Warangal",
        &["Hanumakonda", "Jangaon", "Jayashankar Bhupalpally", "Mahabubabad", "Mulugu"],
    ),
];

/// Spelling variants seen in source data → canonical district name.
const DISTRICT_ALIASES: &[(&str, &str)] = &[
    ("K.v. Rangareddy", "Rangareddy"),
    ("Ranga Reddy", "Rangareddy"),
    ("RangaReddy", "Rangareddy"),
    ("Medchal Malkajgiri", "Medchal-Malkajgiri"),
    ("Medchal-malkajgiri", "Medchal-Malkajgiri"),
    ("Medchal\u{2212}malkajgiri", "Medchal-Malkajgiri"),
    // U+2212 decoded as Windows-1252 upstream.
    ("Medchal\u{e2}\u{2c6}\u{2019}malkajgiri", "Medchal-Malkajgiri"),
    ("Jangoan", "Jangaon"),
    ("Jagitial", "Jagtial"),
    ("Warangal Urban", "Warangal"),
    ("Warangal Rural", "Warangal"),
    ("Komaram Bheem Asifabad", "Komaram Bheem"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct RegionTable {
    pub version: u32,
    groups: BTreeMap<String, BTreeSet<String>>,
    aliases: HashMap<String, String>,
}

impl RegionTable {
    /// The table shipped with the dashboard.
    pub fn builtin() -> Self {
        let groups = REGION_GROUPS
            .iter()
            .map(|(region, members)| {
                (
                    region.to_string(),
                    members.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect();
        let aliases = DISTRICT_ALIASES
            .iter()
            .map(|(alias, canonical)| (normalize_name(alias), canonical.to_string()))
            .collect();
        Self {
            version: REGION_TABLE_VERSION,
            groups,
            aliases,
        }
    }

    pub fn new(
        version: u32,
        groups: BTreeMap<String, BTreeSet<String>>,
        aliases: HashMap<String, String>,
    ) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|(alias, canonical)| (normalize_name(&alias), canonical))
            .collect();
        Self {
            version,
            groups,
            aliases,
        }
    }

    pub fn groups(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.groups
    }

    /// Canonical spelling of a district name; unknown names come back trimmed.
    pub fn canonical_name(&self, name: &str) -> String {
        self.aliases
            .get(&normalize_name(name))
            .cloned()
            .unwrap_or_else(|| name.trim().to_string())
    }

    /// Every district the table knows about, regions and members alike.
    pub fn known_districts(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|(region, members)| std::iter::once(region).chain(members.iter()))
            .cloned()
            .collect()
    }

    /// Copy of the layer with every polygon name canonicalized.
    pub fn canonical_layer(&self, layer: &GeoLayer) -> GeoLayer {
        let mut canonical = layer.clone();
        for entity in &mut canonical.entities {
            entity.name = self.canonical_name(&entity.name);
        }
        canonical
    }

    /// Cross-check the table against the polygon collection and the metric
    /// table. Findings are logged and returned; none of them are fatal.
    pub fn validate(
        &self,
        polygon_names: &BTreeSet<String>,
        metric_names: &BTreeSet<String>,
    ) -> RegionTableReport {
        let region_keys: BTreeSet<String> = self.groups.keys().map(|r| normalize_name(r)).collect();
        let polygon_keys: BTreeSet<String> =
            polygon_names.iter().map(|n| normalize_name(n)).collect();
        let metric_keys: BTreeSet<String> =
            metric_names.iter().map(|n| normalize_name(n)).collect();

        let polygons_without_mapping: BTreeSet<String> = polygon_names
            .iter()
            .filter(|n| !region_keys.contains(&normalize_name(n)))
            .cloned()
            .collect();

        let regions_without_polygon: BTreeSet<String> = self
            .groups
            .keys()
            .filter(|r| !polygon_keys.contains(&normalize_name(r)))
            .cloned()
            .collect();

        let targets_missing_from_metrics: BTreeSet<String> = if metric_keys.is_empty() {
            BTreeSet::new()
        } else {
            self.known_districts()
                .into_iter()
                .filter(|n| !metric_keys.contains(&normalize_name(n)))
                .collect()
        };

        let report = RegionTableReport {
            version: self.version,
            polygons_without_mapping,
            regions_without_polygon,
            targets_missing_from_metrics,
        };
        report.log();
        report
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionTableReport {
    pub version: u32,
    /// Polygons in the boundary file that the table has no entry for.
    pub polygons_without_mapping: BTreeSet<String>,
    /// Table regions with no polygon in the boundary file.
    pub regions_without_polygon: BTreeSet<String>,
    /// Table districts that the metric table does not mention.
    pub targets_missing_from_metrics: BTreeSet<String>,
}

impl RegionTableReport {
    pub fn is_clean(&self) -> bool {
        self.polygons_without_mapping.is_empty()
            && self.regions_without_polygon.is_empty()
            && self.targets_missing_from_metrics.is_empty()
    }

    fn log(&self) {
        if self.is_clean() {
            log::debug!("Region table v{} matches boundary file and metrics", self.version);
            return;
        }
        if !self.polygons_without_mapping.is_empty() {
            log::warn!(
                "Region table v{}: polygons without mapping: {:?}",
                self.version,
                self.polygons_without_mapping
            );
        }
        if !self.regions_without_polygon.is_empty() {
            log::warn!(
                "Region table v{}: regions missing from boundary file: {:?}",
                self.version,
                self.regions_without_polygon
            );
        }
        if !self.targets_missing_from_metrics.is_empty() {
            log::info!(
                "Region table v{}: {} district(s) absent from metrics",
                self.version,
                self.targets_missing_from_metrics.len()
            );
        }
    }
}

//! Join per-district metrics onto visible polygons and their groups.
//!
//! The join key is the stable district code when both sides carry one, and
//! the normalized name otherwise. Indexes are rebuilt on every call; nothing
//! is cached across metric sets. Every metric row comes out exactly once, in
//! input order, whether or not a polygon was found for it.

use std::collections::HashMap;

use serde::Serialize;

use crate::classify::{classify, fill_color, Category, Rgb};
use crate::geometry::{GeoEntity, GroupResolution};
use crate::helpers::{normalize_code, normalize_name};
use crate::regions::RegionTable;
use crate::types::DistrictMigration;

/// One district's migration metrics. `ratio` is None when there were no
/// enrolments: "undefined", not 0%.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetric {
    pub entity_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub total_count: f64,
    pub total_secondary_count: f64,
    pub ratio: Option<f64>,
    pub intensity: f64,
}

impl EntityMetric {
    pub fn new(
        entity_name: &str,
        total_count: f64,
        total_secondary_count: f64,
        intensity: f64,
    ) -> Self {
        let ratio = (total_count > 0.0).then(|| total_secondary_count / total_count);
        Self {
            entity_name: entity_name.trim().to_string(),
            code: None,
            total_count,
            total_secondary_count,
            ratio,
            intensity: if intensity.is_finite() { intensity } else { 0.0 },
        }
    }

    pub fn with_code(mut self, code: Option<&str>) -> Self {
        self.code = normalize_code(code);
        self
    }

    /// Build from a /migration/choropleth row. The service's category label is
    /// ignored; the tier is always re-derived from intensity.
    pub fn from_migration(row: &DistrictMigration, table: &RegionTable) -> Self {
        Self::new(
            &table.canonical_name(&row.district),
            row.total_enrolments,
            row.total_demo_updates,
            row.migration_intensity,
        )
        .with_code(row.district_code.as_deref())
    }

    pub fn category(&self) -> Category {
        classify(self.intensity).category
    }

    pub fn key(&self) -> String {
        normalize_name(&self.entity_name)
    }
}

pub fn metrics_from_rows(rows: &[DistrictMigration], table: &RegionTable) -> Vec<EntityMetric> {
    rows.iter().map(|row| EntityMetric::from_migration(row, table)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Placement {
    /// Has its own polygon.
    Visible { polygon: String },
    /// Drawn inside another district's polygon.
    Grouped { polygon: String },
    /// No polygon and no group: shown in tables only.
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKey {
    Code,
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRow {
    pub metric: EntityMetric,
    pub placement: Placement,
    /// Display intensity; 0 for unmapped rows.
    pub intensity: f64,
    pub category: Category,
    pub color: Rgb,
}

impl JoinedRow {
    pub fn is_unmapped(&self) -> bool {
        self.placement == Placement::Unmapped
    }
}

/// Fill state of one visible polygon.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonFill {
    pub name: String,
    /// Intensity of the polygon's own district, None when no metric row matched.
    pub intensity: Option<f64>,
    pub category: Category,
    pub fill: Rgb,
    pub matched_by: Option<MatchKey>,
    /// Grouped districts drawn inside this polygon that have metric rows.
    pub members: Vec<String>,
}

/// A metric row with neither a polygon nor a group. Non-fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMismatch {
    pub entity_name: String,
    pub row_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMap {
    pub rows: Vec<JoinedRow>,
    pub polygons: Vec<PolygonFill>,
    pub mismatches: Vec<JoinMismatch>,
    pub code_matches: usize,
    /// Polygons that carried a code but could only be matched by name.
    pub name_fallbacks: usize,
}

impl JoinedMap {
    pub fn unmapped_count(&self) -> usize {
        self.mismatches.len()
    }

    pub fn row(&self, name: &str) -> Option<&JoinedRow> {
        let key = normalize_name(name);
        self.rows.iter().find(|r| r.metric.key() == key)
    }

    pub fn polygon(&self, name: &str) -> Option<&PolygonFill> {
        let key = normalize_name(name);
        self.polygons.iter().find(|p| normalize_name(&p.name) == key)
    }
}

/// Join metric rows onto visible polygons and groups.
pub fn join(
    metrics: &[EntityMetric],
    visible_geo: &[GeoEntity],
    groups: &GroupResolution,
) -> JoinedMap {
    let mut by_name: HashMap<String, usize> = HashMap::with_capacity(metrics.len());
    let mut by_code: HashMap<String, usize> = HashMap::new();
    for (idx, metric) in metrics.iter().enumerate() {
        if by_name.insert(metric.key(), idx).is_some() {
            log::warn!("Duplicate metric row for '{}'; joining the last one", metric.entity_name);
        }
        if let Some(code) = &metric.code {
            by_code.insert(code.clone(), idx);
        }
    }

    // Hidden district key → display name of the polygon it is drawn in.
    let polygon_names: HashMap<String, &str> = visible_geo
        .iter()
        .map(|g| (g.key(), g.name.as_str()))
        .collect();
    let mut group_of: HashMap<String, &str> = HashMap::new();
    for (group_key, members) in &groups.groups {
        if let Some(polygon) = polygon_names.get(group_key) {
            for member in members {
                group_of.entry(normalize_name(member)).or_insert(*polygon);
            }
        }
    }

    let mut joined = JoinedMap::default();
    // Keyed on the entity: duplicate rows all land on its polygon.
    let mut polygon_by_key: HashMap<String, &str> = HashMap::new();
    let mut polygon_by_code: HashMap<&str, &str> = HashMap::new();

    for geo in visible_geo {
        let by_code_hit = geo.code.as_ref().and_then(|c| by_code.get(c)).copied();
        let (idx, matched_by) = match by_code_hit {
            Some(idx) => (Some(idx), Some(MatchKey::Code)),
            None => match by_name.get(&geo.key()).copied() {
                Some(idx) => (Some(idx), Some(MatchKey::Name)),
                None => (None, None),
            },
        };
        match matched_by {
            Some(MatchKey::Code) => joined.code_matches += 1,
            Some(MatchKey::Name) if geo.code.is_some() => joined.name_fallbacks += 1,
            _ => {}
        }

        let intensity = idx.map(|i| metrics[i].intensity);
        if let Some(i) = idx {
            let metric = &metrics[i];
            polygon_by_key.entry(metric.key()).or_insert(geo.name.as_str());
            if let Some(code) = metric.code.as_deref() {
                polygon_by_code.entry(code).or_insert(geo.name.as_str());
            }
        }
        let members: Vec<String> = groups
            .groups
            .get(&geo.key())
            .map(|m| {
                m.iter()
                    .filter(|name| by_name.contains_key(&normalize_name(name)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        joined.polygons.push(PolygonFill {
            name: geo.name.clone(),
            intensity,
            category: intensity.map_or(Category::NoData, |i| classify(i).category),
            fill: intensity.map_or(Category::NoData.color(), fill_color),
            matched_by,
            members,
        });
    }

    for (idx, metric) in metrics.iter().enumerate() {
        let visible = metric
            .code
            .as_deref()
            .and_then(|code| polygon_by_code.get(code))
            .or_else(|| polygon_by_key.get(&metric.key()));
        let placement = if let Some(polygon) = visible {
            Placement::Visible {
                polygon: polygon.to_string(),
            }
        } else if let Some(polygon) = group_of.get(&metric.key()) {
            Placement::Grouped {
                polygon: polygon.to_string(),
            }
        } else {
            joined.mismatches.push(JoinMismatch {
                entity_name: metric.entity_name.clone(),
                row_index: idx,
            });
            Placement::Unmapped
        };

        let (intensity, category) = match placement {
            Placement::Unmapped => (0.0, Category::NoData),
            _ => (metric.intensity, metric.category()),
        };
        joined.rows.push(JoinedRow {
            metric: metric.clone(),
            placement,
            intensity,
            category,
            color: category.color(),
        });
    }

    if joined.name_fallbacks > 0 {
        log::info!(
            "District join: {} by code, {} by name fallback",
            joined.code_matches,
            joined.name_fallbacks
        );
    }
    if !joined.mismatches.is_empty() {
        log::warn!(
            "District join: {} unmapped district(s): {:?}",
            joined.mismatches.len(),
            joined.mismatches.iter().map(|m| m.entity_name.as_str()).collect::<Vec<_>>()
        );
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{resolve_groups, LatLng};
    use std::collections::{BTreeMap, BTreeSet};

    fn geo(name: &str, code: Option<&str>) -> GeoEntity {
        GeoEntity {
            name: name.to_string(),
            code: code.map(str::to_string),
            centroid: Some(LatLng { lat: 17.0, lng: 78.0 }),
            outline: vec![],
        }
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (Vec<EntityMetric>, Vec<GeoEntity>, GroupResolution) {
        let metrics = vec![
            EntityMetric::new("HYDERABAD ", 1000.0, 1200.0, 92.0),
            EntityMetric::new("Sangareddy", 400.0, 100.0, 35.0),
            EntityMetric::new("Atlantis", 10.0, 1.0, 5.0),
            EntityMetric::new("Medak", 0.0, 0.0, 0.0),
        ];
        let visible = vec![geo("Hyderabad", None), geo("Medak", None), geo("Nalgonda", None)];
        let all: BTreeSet<String> = metrics.iter().map(|m| m.entity_name.clone()).collect();
        let mut region_map = BTreeMap::new();
        region_map.insert("Hyderabad".to_string(), names(&["Sangareddy", "Vikarabad"]));
        let groups = resolve_groups(&names(&["Hyderabad", "Medak", "Nalgonda"]), &all, &region_map);
        (metrics, visible, groups)
    }

    #[test]
    fn test_ratio_is_undefined_without_enrolments() {
        assert_eq!(EntityMetric::new("Medak", 0.0, 5.0, 0.0).ratio, None);
        assert_eq!(EntityMetric::new("Medak", 200.0, 50.0, 10.0).ratio, Some(0.25));
    }

    #[test]
    fn test_row_count_matches_input_and_unmapped_is_flagged() {
        let (metrics, visible, groups) = fixture();
        let joined = join(&metrics, &visible, &groups);

        assert_eq!(joined.rows.len(), metrics.len());
        let atlantis = joined.row("atlantis").unwrap();
        assert!(atlantis.is_unmapped());
        assert_eq!(atlantis.category, Category::NoData);
        assert_eq!(atlantis.intensity, 0.0);
        assert_eq!(atlantis.metric.intensity, 5.0, "metric itself is untouched");
        assert_eq!(joined.unmapped_count(), 1);
        assert_eq!(joined.mismatches[0].row_index, 2);
    }

    #[test]
    fn test_case_insensitive_trimmed_name_join() {
        let (metrics, visible, groups) = fixture();
        let joined = join(&metrics, &visible, &groups);

        let hyd = joined.row("Hyderabad").unwrap();
        assert_eq!(
            hyd.placement,
            Placement::Visible {
                polygon: "Hyderabad".into()
            }
        );
        assert_eq!(hyd.category, Category::High);

        let polygon = joined.polygon("hyderabad").unwrap();
        assert_eq!(polygon.intensity, Some(92.0));
        assert_eq!(polygon.matched_by, Some(MatchKey::Name));
        assert_eq!(polygon.members, vec!["Sangareddy".to_string()]);
    }

    #[test]
    fn test_grouped_rows_keep_their_own_intensity() {
        let (metrics, visible, groups) = fixture();
        let joined = join(&metrics, &visible, &groups);

        let sanga = joined.row("sangareddy").unwrap();
        assert_eq!(
            sanga.placement,
            Placement::Grouped {
                polygon: "Hyderabad".into()
            }
        );
        assert_eq!(sanga.category, Category::Moderate);
    }

    #[test]
    fn test_polygon_without_metric_is_no_data() {
        let (metrics, visible, groups) = fixture();
        let joined = join(&metrics, &visible, &groups);

        let nalgonda = joined.polygon("Nalgonda").unwrap();
        assert_eq!(nalgonda.intensity, None);
        assert_eq!(nalgonda.category, Category::NoData);
        assert_eq!(nalgonda.fill, Category::NoData.color());
        assert_eq!(joined.polygons.len(), 3);
    }

    #[test]
    fn test_code_join_beats_name_drift() {
        let metrics =
            vec![EntityMetric::new("Yadadri", 100.0, 80.0, 75.0).with_code(Some("tg-32"))];
        let visible = vec![geo("Yadadri Bhuvanagiri", Some("TG-32"))];
        let joined = join(&metrics, &visible, &GroupResolution::default());

        assert_eq!(joined.code_matches, 1);
        assert_eq!(joined.polygons[0].matched_by, Some(MatchKey::Code));
        assert!(!joined.rows[0].is_unmapped());
    }

    #[test]
    fn test_duplicate_rows_share_the_polygon() {
        let metrics = vec![
            EntityMetric::new("Medak", 100.0, 20.0, 12.0),
            EntityMetric::new("MEDAK", 120.0, 30.0, 18.0),
        ];
        let visible = vec![geo("Medak", None)];
        let joined = join(&metrics, &visible, &GroupResolution::default());

        for row in &joined.rows {
            assert_eq!(
                row.placement,
                Placement::Visible {
                    polygon: "Medak".into()
                }
            );
        }
        assert!(joined.mismatches.is_empty());
        assert_eq!(joined.polygons[0].intensity, Some(18.0), "last row fills the polygon");
    }

    #[test]
    fn test_name_fallback_is_counted() {
        let metrics = vec![EntityMetric::new("Medak", 100.0, 20.0, 12.0)];
        let visible = vec![geo("Medak", Some("TG-14"))];
        let joined = join(&metrics, &visible, &GroupResolution::default());

        assert_eq!(joined.code_matches, 0);
        assert_eq!(joined.name_fallbacks, 1);
    }

    #[test]
    fn test_from_migration_canonicalizes_and_ignores_service_label() {
        let row = DistrictMigration {
            district: "Warangal Urban".into(),
            district_code: None,
            total_enrolments: 100.0,
            total_demo_updates: 90.0,
            migration_ratio: 0.9,
            migration_category: "Stable (Rural)".into(),
            migration_intensity: 81.0,
        };
        let metric = EntityMetric::from_migration(&row, &RegionTable::builtin());
        assert_eq!(metric.entity_name, "Warangal");
        assert_eq!(metric.category(), Category::High);
    }
}

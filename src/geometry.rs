//! District polygons: parsing, centroids, grouping and label anchors.
//!
//! Centroids are the arithmetic mean of the exterior ring's vertices (closing
//! vertex counted once). That is a known approximation: it is only close to
//! the true centroid for roughly convex, single-ring polygons and is not
//! area-weighted. It is used for label placement, never for measurement.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use geojson::{Feature, GeoJson};
use serde::Serialize;

use crate::error::GeometryError;
use crate::helpers::{normalize_code, normalize_name};

/// Feature property keys that may carry the district name, in priority order.
pub const NAME_PROPERTIES: [&str; 2] = ["district", "D_N"];
pub const CODE_PROPERTY: &str = "district_code";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// One visible district polygon (or multi-polygon).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub centroid: Option<LatLng>,
    /// Exterior ring used for the centroid, as (lng, lat) pairs.
    #[serde(skip)]
    pub outline: Vec<(f64, f64)>,
}

impl GeoEntity {
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Parsed polygon collection plus what had to be skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLayer {
    pub entities: Vec<GeoEntity>,
    /// Features without a usable name property.
    pub unnamed_features: usize,
}

impl GeoLayer {
    pub fn visible_names(&self) -> BTreeSet<String> {
        self.entities.iter().map(|e| e.name.clone()).collect()
    }
}

/// Parse a GeoJSON FeatureCollection as served by `/geojson`.
pub fn parse_geo_layer(value: serde_json::Value) -> Result<GeoLayer, GeometryError> {
    let collection = match GeoJson::from_json_value(value)? {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(_) => return Err(GeometryError::NotACollection("Feature")),
        GeoJson::Geometry(_) => return Err(GeometryError::NotACollection("Geometry")),
    };

    let mut layer = GeoLayer::default();
    for feature in &collection.features {
        let Some(name) = feature_name(feature) else {
            layer.unnamed_features += 1;
            continue;
        };
        let outline = feature
            .geometry
            .as_ref()
            .and_then(|g| exterior_ring(&g.value))
            .unwrap_or_default();
        let centroid = centroid(&outline);
        if centroid.is_none() {
            log::warn!("District polygon '{}' has no usable ring; no label anchor", name);
        }
        layer.entities.push(GeoEntity {
            code: normalize_code(feature.property(CODE_PROPERTY).and_then(|v| v.as_str())),
            name,
            centroid,
            outline,
        });
    }

    if layer.unnamed_features > 0 {
        log::warn!(
            "Skipped {} district feature(s) with no '{}' or '{}' property",
            layer.unnamed_features,
            NAME_PROPERTIES[0],
            NAME_PROPERTIES[1]
        );
    }
    Ok(layer)
}

/// Entity name from the first non-empty name property.
pub fn feature_name(feature: &Feature) -> Option<String> {
    NAME_PROPERTIES.iter().find_map(|key| {
        feature
            .property(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Exterior ring of a polygon; for multi-polygons, the exterior ring with the
/// most vertices (the main landmass).
fn exterior_ring(value: &geojson::Value) -> Option<Vec<(f64, f64)>> {
    let ring = match value {
        geojson::Value::Polygon(rings) => rings.first()?,
        geojson::Value::MultiPolygon(polygons) => polygons
            .iter()
            .filter_map(|rings| rings.first())
            .max_by_key(|ring| ring.len())?,
        _ => return None,
    };
    Some(
        ring.iter()
            .filter(|p| p.len() >= 2)
            .map(|p| (p[0], p[1]))
            .collect(),
    )
}

/// Vertex-mean centroid of a (lng, lat) ring. The closing vertex, when it
/// repeats the first, is counted once. None for an empty ring.
pub fn centroid(ring: &[(f64, f64)]) -> Option<LatLng> {
    let vertices = match ring {
        [] => return None,
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    };
    let n = vertices.len() as f64;
    let (sum_lng, sum_lat) = vertices
        .iter()
        .fold((0.0, 0.0), |(lng, lat), (x, y)| (lng + x, lat + y));
    Some(LatLng {
        lat: sum_lat / n,
        lng: sum_lng / n,
    })
}

/// Which hidden districts each visible polygon stands for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResolution {
    /// Normalized visible name → display names of the hidden districts it covers.
    pub groups: BTreeMap<String, BTreeSet<String>>,
    /// Districts with neither a polygon nor a group.
    pub unmapped: BTreeSet<String>,
}

impl GroupResolution {
    /// The visible group (normalized key) a hidden district was assigned to.
    pub fn group_of(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name);
        self.groups
            .iter()
            .find(|(_, members)| members.iter().any(|m| normalize_name(m) == key))
            .map(|(group, _)| group.as_str())
    }

    pub fn grouped_count(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }
}

/// Assign every non-visible district in `all` to at most one visible polygon
/// via `region_map` (visible name → member names). Members that are
/// themselves visible are excluded. Districts that end up nowhere are
/// reported as unmapped.
pub fn resolve_groups(
    visible: &BTreeSet<String>,
    all: &BTreeSet<String>,
    region_map: &BTreeMap<String, BTreeSet<String>>,
) -> GroupResolution {
    let visible_keys: HashSet<String> = visible.iter().map(|n| normalize_name(n)).collect();
    let display: HashMap<String, &String> = all.iter().map(|n| (normalize_name(n), n)).collect();

    let mut resolution = GroupResolution {
        groups: visible_keys.iter().map(|k| (k.clone(), BTreeSet::new())).collect(),
        unmapped: BTreeSet::new(),
    };
    let mut assigned: HashMap<String, String> = HashMap::new();

    for (target, members) in region_map {
        let target_key = normalize_name(target);
        if !visible_keys.contains(&target_key) {
            continue;
        }
        for member in members {
            let member_key = normalize_name(member);
            if visible_keys.contains(&member_key) {
                continue;
            }
            let Some(name) = display.get(&member_key) else {
                continue;
            };
            if let Some(first) = assigned.get(&member_key) {
                if *first != target_key {
                    log::warn!(
                        "District '{}' mapped to both '{}' and '{}'; keeping '{}'",
                        name,
                        first,
                        target_key,
                        first
                    );
                }
                continue;
            }
            assigned.insert(member_key, target_key.clone());
            if let Some(group) = resolution.groups.get_mut(&target_key) {
                group.insert((*name).clone());
            }
        }
    }

    for (key, name) in &display {
        if !visible_keys.contains(key) && !assigned.contains_key(key) {
            resolution.unmapped.insert((*name).clone());
        }
    }

    resolution
}

/// Where to draw a polygon's label and what it says.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAnchor {
    pub name: String,
    pub position: LatLng,
    pub grouped_count: usize,
    pub text: String,
}

pub fn label_anchors(layer: &GeoLayer, groups: &GroupResolution) -> Vec<LabelAnchor> {
    layer
        .entities
        .iter()
        .filter_map(|entity| {
            let position = entity.centroid?;
            let grouped_count = groups.groups.get(&entity.key()).map_or(0, BTreeSet::len);
            let text = if grouped_count > 0 {
                format!("{} (+{})", entity.name, grouped_count)
            } else {
                entity.name.clone()
            };
            Some(LabelAnchor {
                name: entity.name.clone(),
                position,
                grouped_count,
                text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_square_centroid_excludes_closing_vertex() {
        let ring = [(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0), (0.0, 0.0)];
        let c = centroid(&ring).unwrap();
        assert!((c.lat - 1.0).abs() < 1e-12);
        assert!((c.lng - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_swaps_to_lat_lng() {
        let ring = [(78.0, 17.0), (80.0, 17.0), (80.0, 19.0), (78.0, 19.0), (78.0, 17.0)];
        let c = centroid(&ring).unwrap();
        assert_eq!(c, LatLng { lat: 18.0, lng: 79.0 });
    }

    #[test]
    fn test_centroid_open_ring_and_empty() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[(0.0, 0.0), (3.0, 0.0), (0.0, 3.0)]).unwrap();
        assert_eq!(c, LatLng { lat: 1.0, lng: 1.0 });
    }

    #[test]
    fn test_parse_prefers_district_over_d_n() {
        let layer = parse_geo_layer(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "properties": {"district": "Hyderabad", "D_N": "HYD", "district_code": "tg-05"},
                 "geometry": {"type": "Polygon",
                              "coordinates": [[[0.0,0.0],[0.0,2.0],[2.0,2.0],[2.0,0.0],[0.0,0.0]]]}},
                {"type": "Feature",
                 "properties": {"district": "", "D_N": "Medak"},
                 "geometry": {"type": "Polygon",
                              "coordinates": [[[4.0,4.0],[4.0,6.0],[6.0,6.0],[6.0,4.0],[4.0,4.0]]]}},
                {"type": "Feature", "properties": {"other": 1}, "geometry": null}
            ]
        }))
        .unwrap();

        assert_eq!(layer.entities.len(), 2);
        assert_eq!(layer.unnamed_features, 1);
        assert_eq!(layer.entities[0].name, "Hyderabad");
        assert_eq!(layer.entities[0].code.as_deref(), Some("TG-05"));
        assert_eq!(layer.entities[1].name, "Medak");
        assert_eq!(layer.entities[1].centroid, Some(LatLng { lat: 5.0, lng: 5.0 }));
    }

    #[test]
    fn test_multipolygon_uses_largest_exterior_ring() {
        let layer = parse_geo_layer(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"district": "Khammam"},
                "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[10.0,10.0],[10.0,11.0],[11.0,10.0],[10.0,10.0]]],
                    [[[0.0,0.0],[0.0,4.0],[4.0,4.0],[4.0,0.0],[0.0,0.0]]]
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(layer.entities[0].centroid, Some(LatLng { lat: 2.0, lng: 2.0 }));
    }

    #[test]
    fn test_single_feature_is_rejected() {
        let err = parse_geo_layer(json!({
            "type": "Feature", "properties": {"district": "Medak"}, "geometry": null
        }))
        .unwrap_err();
        assert!(matches!(err, GeometryError::NotACollection("Feature")));
    }

    #[test]
    fn test_resolve_groups_excludes_visible_members_and_reports_unmapped() {
        let visible = names(&["Hyderabad", "Warangal"]);
        let all = names(&[
            "Hyderabad",
            "Sangareddy",
            "Vikarabad",
            "Warangal",
            "Mulugu",
            "Atlantis",
        ]);
        let mut region_map = BTreeMap::new();
        region_map.insert("Hyderabad".to_string(), names(&["Sangareddy", "Vikarabad", "Warangal"]));
        region_map.insert("warangal".to_string(), names(&["MULUGU"]));

        let resolution = resolve_groups(&visible, &all, &region_map);

        assert_eq!(resolution.groups["hyderabad"], names(&["Sangareddy", "Vikarabad"]));
        assert_eq!(resolution.groups["warangal"], names(&["Mulugu"]));
        assert_eq!(resolution.unmapped, names(&["Atlantis"]));
        assert_eq!(resolution.group_of("mulugu"), Some("warangal"));
    }

    #[test]
    fn test_member_is_never_double_counted() {
        let visible = names(&["Hyderabad", "Medak"]);
        let all = names(&["Hyderabad", "Medak", "Sangareddy"]);
        let mut region_map = BTreeMap::new();
        region_map.insert("Hyderabad".to_string(), names(&["Sangareddy"]));
        region_map.insert("Medak".to_string(), names(&["Sangareddy"]));

        let resolution = resolve_groups(&visible, &all, &region_map);
        assert_eq!(resolution.grouped_count(), 1);
        assert_eq!(resolution.group_of("Sangareddy"), Some("hyderabad"));
        assert!(resolution.unmapped.is_empty());
    }

    #[test]
    fn test_label_anchor_text_counts_grouped_members() {
        let layer = GeoLayer {
            entities: vec![GeoEntity {
                name: "Hyderabad".into(),
                code: None,
                centroid: Some(LatLng { lat: 17.4, lng: 78.5 }),
                outline: vec![],
            }],
            unnamed_features: 0,
        };
        let mut resolution = GroupResolution::default();
        resolution
            .groups
            .insert("hyderabad".into(), names(&["Sangareddy", "Vikarabad", "Medchal-Malkajgiri"]));

        let anchors = label_anchors(&layer, &resolution);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].text, "Hyderabad (+3)");
        assert_eq!(anchors[0].grouped_count, 3);
    }
}

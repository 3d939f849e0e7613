//! Upstream analytics routes. Paths are relative to `{base_url}{api_prefix}`
//! except the service health check, which lives outside the versioned prefix.

/// One logical upstream query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Short name used in errors, logs and latency rollups.
    pub name: &'static str,
    pub path: &'static str,
    /// Whether the route accepts the shared filter parameters.
    pub filtered: bool,
}

pub const SUMMARY: Route = Route {
    name: "summary",
    path: "/summary",
    filtered: true,
};

pub const MIGRATION_TABLE: Route = Route {
    name: "migration_choropleth",
    path: "/migration/choropleth",
    filtered: true,
};

pub const GEOJSON: Route = Route {
    name: "geojson",
    path: "/geojson",
    filtered: false,
};

pub const FORECAST: Route = Route {
    name: "workload_forecast",
    path: "/workload/forecast",
    filtered: true,
};

pub const PROJECTIONS: Route = Route {
    name: "workload_projections",
    path: "/workload/projections",
    filtered: true,
};

pub const ANOMALIES: Route = Route {
    name: "anomalies",
    path: "/anomalies",
    filtered: true,
};

pub const HEALTH_SCORES: Route = Route {
    name: "district_health",
    path: "/districts/health",
    filtered: true,
};

pub const MIGRATION_TRENDS: Route = Route {
    name: "migration_trends",
    path: "/migration/trends",
    filtered: true,
};

pub const ENROLMENTS: Route = Route {
    name: "enrolments_by_district",
    path: "/enrolments/by-district",
    filtered: true,
};

pub const AGE_DISTRIBUTION: Route = Route {
    name: "age_distribution",
    path: "/enrolments/age-distribution",
    filtered: true,
};

/// Full path, not prefixed.
pub const SERVICE_HEALTH: Route = Route {
    name: "service_health",
    path: "/api/health",
    filtered: false,
};

/// The ten queries one dashboard refresh issues.
pub const REFRESH_ROUTES: [Route; 10] = [
    SUMMARY,
    MIGRATION_TABLE,
    GEOJSON,
    FORECAST,
    PROJECTIONS,
    ANOMALIES,
    HEALTH_SCORES,
    MIGRATION_TRENDS,
    ENROLMENTS,
    AGE_DISTRIBUTION,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_refresh_routes_are_distinct() {
        let names: HashSet<&str> = REFRESH_ROUTES.iter().map(|r| r.name).collect();
        let paths: HashSet<&str> = REFRESH_ROUTES.iter().map(|r| r.path).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(paths.len(), 10);
        assert!(!REFRESH_ROUTES.contains(&SERVICE_HEALTH));
    }

    #[test]
    fn test_only_geojson_ignores_filters() {
        let unfiltered: Vec<&str> = REFRESH_ROUTES
            .iter()
            .filter(|r| !r.filtered)
            .map(|r| r.name)
            .collect();
        assert_eq!(unfiltered, vec!["geojson"]);
    }
}

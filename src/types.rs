use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration
// =============================================================================

/// Persisted dashboard configuration (~/.opsintel/config.json).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Months of workload forecast requested from the service.
    #[serde(default = "default_forecast_periods")]
    pub forecast_periods: u32,
    /// Rows requested from the workload projection ranking.
    #[serde(default = "default_projection_limit")]
    pub projection_limit: u32,
    /// Rows shown in the "top migration hubs" card.
    #[serde(default = "default_top_hubs")]
    pub top_hubs: usize,
    /// Optional severity filter passed to /anomalies. None fetches every severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_severity: Option<Severity>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            forecast_periods: default_forecast_periods(),
            projection_limit: default_projection_limit(),
            top_hubs: default_top_hubs(),
            anomaly_severity: None,
        }
    }
}

/// Where the upstream analytics service lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path prefix for the versioned analytics routes.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_forecast_periods() -> u32 {
    3
}

fn default_projection_limit() -> u32 {
    15
}

fn default_top_hubs() -> usize {
    5
}

// =============================================================================
// Upstream response shapes
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiResponse {
    pub total_enrolments: u64,
    pub predicted_updates: u64,
    pub high_migration_districts: u64,
    pub critical_anomalies: u64,
    pub avg_health_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSummary {
    pub total_projected_updates: u64,
    pub avg_per_district: u64,
    pub max_district: String,
    pub max_district_load: u64,
    pub age_5_total: u64,
    pub age_15_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MigrationSummary {
    pub total_districts: u64,
    pub high_migration_count: u64,
    pub moderate_migration_count: u64,
    pub low_migration_count: u64,
    pub avg_migration_ratio: f64,
    pub max_migration_district: String,
    pub max_migration_ratio: f64,
    #[serde(default)]
    pub high_migration_districts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnomalySummary {
    pub total_anomalies: u64,
    pub critical_count: u64,
    pub warning_count: u64,
    pub info_count: u64,
    #[serde(default)]
    pub by_type: HashMap<String, u64>,
    #[serde(default)]
    pub affected_districts: Vec<String>,
}

/// Observed data bounds, as `YYYY-MM-DD` strings. Either side may be empty
/// when the filtered data set has no rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub max: String,
}

impl DateRange {
    /// Both bounds parsed, or None if either is missing or malformed.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = NaiveDate::parse_from_str(self.min.trim(), "%Y-%m-%d").ok()?;
        let max = NaiveDate::parse_from_str(self.max.trim(), "%Y-%m-%d").ok()?;
        (min <= max).then_some((min, max))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub kpis: KpiResponse,
    pub workload: WorkloadSummary,
    pub migration: MigrationSummary,
    pub anomalies: AnomalySummary,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub districts: Vec<String>,
}

/// One row of /migration/choropleth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictMigration {
    pub district: String,
    /// Census code when the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district_code: Option<String>,
    pub total_enrolments: f64,
    pub total_demo_updates: f64,
    #[serde(default)]
    pub migration_ratio: f64,
    #[serde(default)]
    pub migration_category: String,
    #[serde(default)]
    pub migration_intensity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    #[serde(alias = "total_enrolments")]
    pub value: f64,
    #[serde(default)]
    pub is_forecast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadProjection {
    pub district: String,
    pub age_0_5: f64,
    pub age_5_17: f64,
    pub total_enrolments: f64,
    pub projected_age_5_updates: f64,
    pub projected_age_15_updates: f64,
    pub total_projected_updates: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: String,
    pub district: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictHealth {
    pub district: String,
    pub health_score: f64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationTrend {
    pub date: NaiveDate,
    pub enrolments: f64,
    pub demo_updates: f64,
    pub migration_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictEnrolment {
    pub district: String,
    pub total_enrolments: f64,
    #[serde(default)]
    pub age_0_5: f64,
    #[serde(default)]
    pub age_5_17: f64,
    #[serde(default)]
    pub age_18_greater: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgeBuckets {
    pub age_0_5: f64,
    pub age_5_17: f64,
    pub age_18_greater: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgeDistribution {
    pub totals: AgeBuckets,
    pub percentages: AgeBuckets,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub service: String,
}

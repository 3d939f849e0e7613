//! HTTP client for the district analytics service.
//!
//! One GET per logical query. The client does not retry: a failed query
//! fails the whole refresh and the caller decides what to show. The
//! `AnalyticsSource` trait is the seam the orchestrator fans out over, so
//! tests can substitute an in-memory service.
//!
//! Modules:
//! - routes: route names, paths and which ones take filter parameters

pub mod routes;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::OrchestratorError;
use crate::filter::FilterSpec;
use crate::types::{
    AgeDistribution, Anomaly, ApiConfig, DashboardSummary, DistrictEnrolment, DistrictHealth,
    DistrictMigration, ForecastPoint, MigrationTrend, ServiceHealth, Severity, WorkloadProjection,
};

use routes::Route;

/// Every query the dashboard issues. Implementations must not retry.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn summary(&self, filter: &FilterSpec) -> Result<DashboardSummary, OrchestratorError>;

    async fn migration_table(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictMigration>, OrchestratorError>;

    /// The district boundary FeatureCollection. Filter-independent.
    async fn geojson(&self) -> Result<serde_json::Value, OrchestratorError>;

    async fn forecast(
        &self,
        periods: u32,
        filter: &FilterSpec,
    ) -> Result<Vec<ForecastPoint>, OrchestratorError>;

    async fn projections(
        &self,
        limit: u32,
        filter: &FilterSpec,
    ) -> Result<Vec<WorkloadProjection>, OrchestratorError>;

    async fn anomalies(
        &self,
        severity: Option<Severity>,
        filter: &FilterSpec,
    ) -> Result<Vec<Anomaly>, OrchestratorError>;

    async fn health_scores(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictHealth>, OrchestratorError>;

    async fn migration_trends(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<MigrationTrend>, OrchestratorError>;

    async fn enrolments_by_district(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictEnrolment>, OrchestratorError>;

    async fn age_distribution(
        &self,
        filter: &FilterSpec,
    ) -> Result<AgeDistribution, OrchestratorError>;

    async fn health_check(&self) -> Result<ServiceHealth, OrchestratorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid analytics base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Analytics base URL '{0}' cannot carry a path")]
    NotABase(String),
    #[error("HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

pub struct AnalyticsClient {
    client: reqwest::Client,
    root: Url,
    api_prefix: String,
    timeout: Duration,
}

impl AnalyticsClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let root = Url::parse(config.base_url.trim()).map_err(|source| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;
        if root.cannot_be_a_base() {
            return Err(ClientError::NotABase(config.base_url.clone()));
        }
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            root,
            api_prefix: format!("/{}", config.api_prefix.trim_matches('/')),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a route with its query parameters. Prefixes compose
    /// with any path already on the base URL. Unfiltered routes never carry a
    /// query string.
    pub fn url_for(&self, route: Route, params: &[(&str, String)]) -> Url {
        let base_path = self.root.path().trim_end_matches('/');
        let path = if route == routes::SERVICE_HEALTH {
            format!("{}{}", base_path, route.path)
        } else {
            format!("{}{}{}", base_path, self.api_prefix, route.path)
        };

        let mut url = self.root.clone();
        url.set_path(&path);
        url.set_query(None);
        if route.filtered && !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        route: Route,
        params: &[(&str, String)],
    ) -> Result<T, OrchestratorError> {
        let url = self.url_for(route, params);
        log::debug!("GET {}", url);

        let resp = self.client.get(url).send().await.map_err(|e| self.send_error(route, e))?;

        let status = resp.status();
        if !status.is_success() {
            log::warn!("Analytics query {} failed with HTTP {}", route.name, status);
            return Err(OrchestratorError::Http {
                query: route.name,
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| self.send_error(route, e))?;
        serde_json::from_slice(&body).map_err(|e| OrchestratorError::Decode {
            query: route.name,
            message: e.to_string(),
        })
    }

    fn send_error(&self, route: Route, err: reqwest::Error) -> OrchestratorError {
        if err.is_timeout() {
            OrchestratorError::Timeout {
                query: route.name,
                secs: self.timeout.as_secs(),
            }
        } else {
            log::warn!("Analytics query {} failed: {}", route.name, err);
            OrchestratorError::Network {
                query: route.name,
                message: err.to_string(),
            }
        }
    }
}

fn with_param(
    filter: &FilterSpec,
    key: &'static str,
    value: String,
) -> Vec<(&'static str, String)> {
    let mut params = vec![(key, value)];
    params.extend(filter.query_params());
    params
}

#[async_trait]
impl AnalyticsSource for AnalyticsClient {
    async fn summary(&self, filter: &FilterSpec) -> Result<DashboardSummary, OrchestratorError> {
        self.get(routes::SUMMARY, &filter.query_params()).await
    }

    async fn migration_table(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictMigration>, OrchestratorError> {
        self.get(routes::MIGRATION_TABLE, &filter.query_params()).await
    }

    async fn geojson(&self) -> Result<serde_json::Value, OrchestratorError> {
        self.get(routes::GEOJSON, &[]).await
    }

    async fn forecast(
        &self,
        periods: u32,
        filter: &FilterSpec,
    ) -> Result<Vec<ForecastPoint>, OrchestratorError> {
        self.get(routes::FORECAST, &with_param(filter, "periods", periods.to_string()))
            .await
    }

    async fn projections(
        &self,
        limit: u32,
        filter: &FilterSpec,
    ) -> Result<Vec<WorkloadProjection>, OrchestratorError> {
        self.get(routes::PROJECTIONS, &with_param(filter, "limit", limit.to_string()))
            .await
    }

    async fn anomalies(
        &self,
        severity: Option<Severity>,
        filter: &FilterSpec,
    ) -> Result<Vec<Anomaly>, OrchestratorError> {
        let params = match severity {
            Some(severity) => with_param(filter, "severity", severity.as_str().to_string()),
            None => filter.query_params(),
        };
        self.get(routes::ANOMALIES, &params).await
    }

    async fn health_scores(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictHealth>, OrchestratorError> {
        self.get(routes::HEALTH_SCORES, &filter.query_params()).await
    }

    async fn migration_trends(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<MigrationTrend>, OrchestratorError> {
        self.get(routes::MIGRATION_TRENDS, &filter.query_params()).await
    }

    async fn enrolments_by_district(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<DistrictEnrolment>, OrchestratorError> {
        self.get(routes::ENROLMENTS, &filter.query_params()).await
    }

    async fn age_distribution(
        &self,
        filter: &FilterSpec,
    ) -> Result<AgeDistribution, OrchestratorError> {
        self.get(routes::AGE_DISTRIBUTION, &filter.query_params()).await
    }

    async fn health_check(&self) -> Result<ServiceHealth, OrchestratorError> {
        self.get(routes::SERVICE_HEALTH, &[]).await
    }
}

//! Dashboard refresh: fan out every analytics query for one filter spec and
//! publish the results as a single immutable snapshot.
//!
//! A refresh is all-or-nothing. Any failed or timed-out query fails the whole
//! refresh and the previously published snapshot stays current. Refreshes are
//! numbered; only the most recently started one may publish, so a slow stale
//! refresh can never overwrite a newer filter's results.
//!
//! The district boundary collection does not depend on the filter. It is
//! fetched with the first refresh and cached for the orchestrator's lifetime;
//! a failed load is not cached.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::analytics_api::{routes, AnalyticsSource};
use crate::error::OrchestratorError;
use crate::filter::FilterSpec;
use crate::geometry::{parse_geo_layer, GeoLayer};
use crate::latency::{LatencyRecorder, LatencyRollups};
use crate::types::{
    AgeDistribution, Anomaly, Config, DashboardSummary, DistrictEnrolment, DistrictHealth,
    DistrictMigration, ForecastPoint, MigrationTrend, Severity, WorkloadProjection,
};

/// Per-refresh request parameters that do not come from the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    pub forecast_periods: u32,
    pub projection_limit: u32,
    pub anomaly_severity: Option<Severity>,
    /// Independent budget for each query.
    pub query_timeout: Duration,
}

impl RefreshOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            forecast_periods: config.forecast_periods,
            projection_limit: config.projection_limit,
            anomaly_severity: config.anomaly_severity,
            query_timeout: Duration::from_secs(config.api.request_timeout_secs),
        }
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything one successful refresh produced.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub seq: u64,
    pub spec: FilterSpec,
    pub fetched_at: DateTime<Utc>,
    /// Observed data bounds from the summary, when both parse.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub summary: DashboardSummary,
    pub migration: Vec<DistrictMigration>,
    pub geography: Arc<GeoLayer>,
    pub forecast: Vec<ForecastPoint>,
    pub projections: Vec<WorkloadProjection>,
    pub anomalies: Vec<Anomaly>,
    pub health: Vec<DistrictHealth>,
    pub trends: Vec<MigrationTrend>,
    pub enrolments: Vec<DistrictEnrolment>,
    pub age_distribution: AgeDistribution,
}

pub struct DataOrchestrator {
    source: Arc<dyn AnalyticsSource>,
    options: RefreshOptions,
    latest_seq: AtomicU64,
    published: RwLock<Option<Arc<DashboardSnapshot>>>,
    geography: OnceCell<Arc<GeoLayer>>,
    latency: LatencyRecorder,
}

impl DataOrchestrator {
    pub fn new(source: Arc<dyn AnalyticsSource>, options: RefreshOptions) -> Self {
        let latency = LatencyRecorder::tracking(
            options.query_timeout,
            routes::REFRESH_ROUTES.iter().map(|route| route.name),
        );
        Self {
            source,
            options,
            latest_seq: AtomicU64::new(0),
            published: RwLock::new(None),
            geography: OnceCell::new(),
            latency,
        }
    }

    /// The last published snapshot, if any refresh has succeeded yet.
    pub fn current(&self) -> Option<Arc<DashboardSnapshot>> {
        self.published.read().clone()
    }

    pub fn latency_rollups(&self) -> LatencyRollups {
        self.latency.rollups()
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    /// Run every query for `spec` concurrently and publish the result.
    ///
    /// Returns `Superseded` when a newer refresh started before this one could
    /// publish, whether this one succeeded or failed.
    pub async fn refresh(
        &self,
        spec: FilterSpec,
    ) -> Result<Arc<DashboardSnapshot>, OrchestratorError> {
        spec.validate()?;
        let seq = self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        log::info!("Refresh #{} started: {:?}", seq, spec.query_params());

        let source = self.source.as_ref();
        let opts = &self.options;
        let fetched = tokio::try_join!(
            self.timed(routes::SUMMARY.name, source.summary(&spec)),
            self.timed(routes::MIGRATION_TABLE.name, source.migration_table(&spec)),
            self.geography(),
            self.timed(routes::FORECAST.name, source.forecast(opts.forecast_periods, &spec)),
            self.timed(routes::PROJECTIONS.name, source.projections(opts.projection_limit, &spec)),
            self.timed(routes::ANOMALIES.name, source.anomalies(opts.anomaly_severity, &spec)),
            self.timed(routes::HEALTH_SCORES.name, source.health_scores(&spec)),
            self.timed(routes::MIGRATION_TRENDS.name, source.migration_trends(&spec)),
            self.timed(routes::ENROLMENTS.name, source.enrolments_by_district(&spec)),
            self.timed(routes::AGE_DISTRIBUTION.name, source.age_distribution(&spec)),
        );

        let (
            summary,
            migration,
            geography,
            forecast,
            projections,
            anomalies,
            health,
            trends,
            enrolments,
            age_distribution,
        ) = match fetched {
            Ok(results) => results,
            Err(err) => {
                if self.is_superseded(seq) {
                    log::debug!("Refresh #{} failed after being superseded: {}", seq, err);
                    return Err(OrchestratorError::Superseded { seq });
                }
                log::warn!("Refresh #{} failed, keeping previous snapshot: {}", seq, err);
                return Err(err);
            }
        };

        let snapshot = Arc::new(DashboardSnapshot {
            seq,
            date_range: summary.date_range.bounds(),
            spec,
            fetched_at: Utc::now(),
            summary,
            migration,
            geography,
            forecast,
            projections,
            anomalies,
            health,
            trends,
            enrolments,
            age_distribution,
        });

        {
            let mut published = self.published.write();
            if self.is_superseded(seq) {
                log::info!("Refresh #{} superseded; discarding its results", seq);
                return Err(OrchestratorError::Superseded { seq });
            }
            *published = Some(Arc::clone(&snapshot));
        }

        log::info!(
            "Refresh #{} published in {}ms ({} district rows)",
            seq,
            started.elapsed().as_millis(),
            snapshot.migration.len()
        );
        Ok(snapshot)
    }

    fn is_superseded(&self, seq: u64) -> bool {
        self.latest_seq.load(Ordering::SeqCst) != seq
    }

    /// Cached boundary collection, loaded on first use.
    async fn geography(&self) -> Result<Arc<GeoLayer>, OrchestratorError> {
        self.geography
            .get_or_try_init(|| async {
                let value = self.timed(routes::GEOJSON.name, self.source.geojson()).await?;
                let layer = parse_geo_layer(value)?;
                log::info!("Loaded {} district polygons", layer.entities.len());
                Ok::<_, OrchestratorError>(Arc::new(layer))
            })
            .await
            .map(Arc::clone)
    }

    /// Apply the per-query timeout and record latency.
    async fn timed<T, F>(&self, query: &'static str, fut: F) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, OrchestratorError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.options.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout {
                query,
                secs: self.options.query_timeout.as_secs(),
            }),
        };

        match &result {
            Ok(_) => self.latency.record(query, started.elapsed()),
            Err(err) => {
                log::warn!("Query {} failed: {}", query, err);
                self.latency.record_failure(query);
            }
        }
        result
    }
}

// Dashboard service: owns the filter, drives refreshes, and turns published
// snapshots into the view model the presentation layer renders.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::runtime::{Handle, TryCurrentError};

use crate::aggregates::{self, AnomalyPartition, ForecastChartPoint, ScoreAverage};
use crate::analytics_api::AnalyticsSource;
use crate::classify::{gauge_tone, legend, severity_color, Category, GaugeTone, LegendEntry, Rgb};
use crate::error::{DashboardError, OrchestratorError};
use crate::filter::{FilterError, FilterPatch, FilterSpec, FilterState, Subscription};
use crate::geometry::{label_anchors, resolve_groups, LabelAnchor};
use crate::join::{join, metrics_from_rows, EntityMetric, JoinedMap};
use crate::orchestrator::{DashboardSnapshot, DataOrchestrator, RefreshOptions};
use crate::regions::{RegionTable, RegionTableReport};
use crate::types::{
    AgeDistribution, Anomaly, Config, DistrictEnrolment, KpiResponse, MigrationTrend, ServiceHealth,
    WorkloadProjection,
};
use crate::util::{format_compact, format_date, format_number, format_percent, percent_change};

/// Result type for a dashboard refresh
#[derive(Debug, Serialize)]
#[allow(clippy::large_enum_variant)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DashboardResult {
    Success { data: DashboardView },
    Empty { message: String },
    Error { error: DashboardError },
    /// A newer refresh replaced this one. Nothing to render.
    Superseded { seq: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiCards {
    #[serde(flatten)]
    pub raw: KpiResponse,
    pub total_enrolments_label: String,
    pub predicted_updates_label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubRow {
    pub district: String,
    pub ratio: Option<f64>,
    pub ratio_label: String,
    pub enrolments_label: String,
    pub intensity: f64,
    pub category: Category,
}

impl HubRow {
    fn from_metric(metric: &EntityMetric) -> Self {
        Self {
            district: metric.entity_name.clone(),
            ratio: metric.ratio,
            ratio_label: metric
                .ratio
                .map_or_else(|| "n/a".to_string(), |r| format_percent(r * 100.0, 1)),
            enrolments_label: format_number(metric.total_count),
            intensity: metric.intensity,
            category: metric.category(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthGauge {
    #[serde(flatten)]
    pub average: ScoreAverage,
    pub tone: Option<GaugeTone>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyCard {
    #[serde(flatten)]
    pub anomaly: Anomaly,
    pub color: Rgb,
}

impl From<&Anomaly> for AnomalyCard {
    fn from(anomaly: &Anomaly) -> Self {
        Self {
            color: severity_color(anomaly.severity),
            anomaly: anomaly.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyPreview {
    pub critical: Vec<AnomalyCard>,
    pub warning: Vec<AnomalyCard>,
    pub critical_total: usize,
    pub warning_total: usize,
    pub info_total: usize,
}

impl From<&AnomalyPartition> for AnomalyPreview {
    fn from(partition: &AnomalyPartition) -> Self {
        Self {
            critical: partition.critical_preview().iter().map(AnomalyCard::from).collect(),
            warning: partition.warning_preview().iter().map(AnomalyCard::from).collect(),
            critical_total: partition.critical.len(),
            warning_total: partition.warning.len(),
            info_total: partition.info_count,
        }
    }
}

/// Everything one render of the dashboard needs, derived from a snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub seq: u64,
    pub spec: FilterSpec,
    pub fetched_at: String,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub date_range_label: Option<String>,
    pub kpis: KpiCards,
    pub map: JoinedMap,
    pub labels: Vec<LabelAnchor>,
    pub legend: Vec<LegendEntry>,
    /// Tier counts over the joined rows; unmapped rows are left out.
    pub category_counts: BTreeMap<Category, usize>,
    /// Districts with neither a polygon nor a group, as the join saw them.
    pub unmapped: BTreeSet<String>,
    pub region_report: RegionTableReport,
    pub top_hubs: Vec<HubRow>,
    pub health: HealthGauge,
    pub anomalies: AnomalyPreview,
    pub forecast: Vec<ForecastChartPoint>,
    pub projections: Vec<WorkloadProjection>,
    pub trends: Vec<MigrationTrend>,
    /// Change in enrolments between the last two trend points.
    pub trend_change_pct: f64,
    pub enrolments: Vec<DistrictEnrolment>,
    pub age_distribution: AgeDistribution,
}

/// Derive the view model. Synchronous; no I/O.
pub fn build_view(
    snapshot: &DashboardSnapshot,
    regions: &RegionTable,
    top_hubs: usize,
) -> DashboardView {
    let metrics = metrics_from_rows(&snapshot.migration, regions);
    let layer = regions.canonical_layer(&snapshot.geography);

    let visible = layer.visible_names();
    let all: BTreeSet<String> = metrics.iter().map(|m| m.entity_name.clone()).collect();
    let groups = resolve_groups(&visible, &all, regions.groups());
    let region_report = regions.validate(&visible, &all);
    let map = join(&metrics, &layer.entities, &groups);

    let health = aggregates::average_health(&snapshot.health);
    let partition = aggregates::partition_anomalies(&snapshot.anomalies);
    let trend_change_pct = match snapshot.trends.as_slice() {
        [.., previous, last] => percent_change(last.enrolments, previous.enrolments),
        _ => 0.0,
    };
    let kpis = &snapshot.summary.kpis;

    DashboardView {
        seq: snapshot.seq,
        spec: snapshot.spec.clone(),
        fetched_at: snapshot.fetched_at.to_rfc3339(),
        date_range: snapshot.date_range,
        date_range_label: snapshot
            .date_range
            .map(|(min, max)| format!("{} to {}", format_date(min), format_date(max))),
        kpis: KpiCards {
            raw: kpis.clone(),
            total_enrolments_label: format_compact(kpis.total_enrolments as f64),
            predicted_updates_label: format_compact(kpis.predicted_updates as f64),
        },
        labels: label_anchors(&layer, &groups),
        legend: legend(),
        category_counts: aggregates::category_counts(&map.rows),
        unmapped: map.mismatches.iter().map(|m| m.entity_name.clone()).collect(),
        region_report,
        top_hubs: aggregates::top_hubs(&metrics, top_hubs)
            .into_iter()
            .map(HubRow::from_metric)
            .collect(),
        health: HealthGauge {
            tone: (health.count > 0).then(|| gauge_tone(health.value)),
            average: health,
        },
        anomalies: AnomalyPreview::from(&partition),
        forecast: aggregates::split_forecast(&snapshot.forecast),
        projections: snapshot.projections.clone(),
        trends: snapshot.trends.clone(),
        trend_change_pct,
        enrolments: snapshot.enrolments.clone(),
        age_distribution: snapshot.age_distribution.clone(),
        map,
    }
}

/// Dashboard controller. Reads the filter, refreshes through the
/// orchestrator and seeds unbounded filters from the first observed range.
pub struct Dashboard {
    source: Arc<dyn AnalyticsSource>,
    filter: Arc<FilterState>,
    orchestrator: DataOrchestrator,
    regions: RegionTable,
    top_hubs: usize,
    seeded: AtomicBool,
    seeding: AtomicBool,
}

impl Dashboard {
    pub fn new(source: Arc<dyn AnalyticsSource>, config: &Config) -> Self {
        Self::with_filter(source, config, Arc::new(FilterState::new()))
    }

    pub fn with_filter(
        source: Arc<dyn AnalyticsSource>,
        config: &Config,
        filter: Arc<FilterState>,
    ) -> Self {
        let orchestrator =
            DataOrchestrator::new(Arc::clone(&source), RefreshOptions::from_config(config));
        Self {
            source,
            filter,
            orchestrator,
            regions: RegionTable::builtin(),
            top_hubs: config.top_hubs,
            seeded: AtomicBool::new(false),
            seeding: AtomicBool::new(false),
        }
    }

    pub fn filter(&self) -> &Arc<FilterState> {
        &self.filter
    }

    pub fn orchestrator(&self) -> &DataOrchestrator {
        &self.orchestrator
    }

    /// Update the shared filter. Refreshes only if `auto_refresh` is active.
    pub fn apply_filter(&self, patch: FilterPatch) -> Result<FilterSpec, FilterError> {
        self.filter.set(patch)
    }

    /// Refresh with the current filter.
    pub async fn refresh(&self) -> DashboardResult {
        let spec = self.filter.get();
        match self.orchestrator.refresh(spec).await {
            Ok(snapshot) => {
                self.seed_filter(&snapshot);
                if snapshot.migration.is_empty() {
                    return DashboardResult::Empty {
                        message: "No district data for the selected filters".to_string(),
                    };
                }
                DashboardResult::Success {
                    data: build_view(&snapshot, &self.regions, self.top_hubs),
                }
            }
            Err(OrchestratorError::Superseded { seq }) => DashboardResult::Superseded { seq },
            Err(err) => {
                log::warn!("Dashboard failed to load: {}", err);
                DashboardResult::Error {
                    error: DashboardError::from(&err),
                }
            }
        }
    }

    /// View of the last good snapshot, whatever the latest refresh did.
    pub fn current_view(&self) -> Option<DashboardView> {
        self.orchestrator
            .current()
            .map(|snapshot| build_view(&snapshot, &self.regions, self.top_hubs))
    }

    pub async fn service_health(&self) -> Result<ServiceHealth, DashboardError> {
        self.source.health_check().await.map_err(|e| DashboardError::from(&e))
    }

    /// Refresh on every filter change, each in its own task, handing results
    /// to `sink`. Overlapping refreshes supersede each other. Stops when the
    /// returned `Subscription` is dropped. Must be called inside a Tokio runtime.
    pub fn auto_refresh<F>(self: &Arc<Self>, sink: F) -> Result<Subscription, TryCurrentError>
    where
        F: Fn(DashboardResult) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()?;
        let dashboard: Weak<Self> = Arc::downgrade(self);
        let sink = Arc::new(sink);

        Ok(self.filter.subscribe(move |_| {
            let Some(dashboard) = dashboard.upgrade() else {
                return;
            };
            // Seed notifications never trigger a refresh.
            if dashboard.seeding.load(Ordering::SeqCst) {
                return;
            }
            let sink = Arc::clone(&sink);
            runtime.spawn(async move {
                let result = dashboard.refresh().await;
                (*sink)(result);
            });
        }))
    }

    // Bootstrap only: once a snapshot with a date range has seeded the
    // filter, later refreshes never touch it.
    fn seed_filter(&self, snapshot: &DashboardSnapshot) {
        let Some((min, max)) = snapshot.date_range else {
            return;
        };
        if self.seeded.swap(true, Ordering::SeqCst) {
            return;
        }
        self.seeding.store(true, Ordering::SeqCst);
        self.filter.seed_bounds(min, max);
        self.seeding.store(false, Ordering::SeqCst);
    }
}

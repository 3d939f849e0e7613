//! Derived aggregates over joined metrics: top-N, tier counts, averages and
//! the chart/sidebar partitions built from the raw query results.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::classify::{self, health_status, Category, HealthStatus};
use crate::join::{EntityMetric, JoinedRow};
use crate::types::{Anomaly, DistrictHealth, ForecastPoint, Severity};

/// Anomalies of each severity shown in the sidebar preview.
pub const ANOMALY_PREVIEW: usize = 3;

/// The `n` items with the largest `key`, descending. The sort is stable, so
/// ties keep their input order. Keys that are NaN sort last.
pub fn top_n<T, F>(items: &[T], key: F, n: usize) -> Vec<&T>
where
    F: Fn(&T) -> f64,
{
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| descending(key(a), key(b)));
    ranked.truncate(n);
    ranked
}

fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Districts with the highest migration ratio. Undefined ratios rank last.
pub fn top_hubs(metrics: &[EntityMetric], n: usize) -> Vec<&EntityMetric> {
    top_n(metrics, |m| m.ratio.unwrap_or(f64::NAN), n)
}

/// Per-tier counts over joined rows. Unmapped rows carry `NoData` and are
/// not counted in any tier.
pub fn category_counts(rows: &[JoinedRow]) -> BTreeMap<Category, usize> {
    classify::category_counts(rows.iter().map(|row| row.category))
}

/// Arithmetic mean; 0 for an empty input.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// An average together with how many values went into it, so callers can
/// tell "no data" apart from a genuine 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAverage {
    pub value: f64,
    pub count: usize,
    pub status: Option<HealthStatus>,
}

pub fn average_health(rows: &[DistrictHealth]) -> ScoreAverage {
    let scores: Vec<f64> = rows.iter().map(|r| r.health_score).collect();
    let value = average(&scores);
    ScoreAverage {
        value,
        count: scores.len(),
        status: (!scores.is_empty()).then(|| health_status(value)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyPartition {
    pub critical: Vec<Anomaly>,
    pub warning: Vec<Anomaly>,
    pub info_count: usize,
}

impl AnomalyPartition {
    pub fn critical_preview(&self) -> &[Anomaly] {
        &self.critical[..self.critical.len().min(ANOMALY_PREVIEW)]
    }

    pub fn warning_preview(&self) -> &[Anomaly] {
        &self.warning[..self.warning.len().min(ANOMALY_PREVIEW)]
    }
}

pub fn partition_anomalies(anomalies: &[Anomaly]) -> AnomalyPartition {
    let mut partition = AnomalyPartition::default();
    for anomaly in anomalies {
        match anomaly.severity {
            Severity::Critical => partition.critical.push(anomaly.clone()),
            Severity::Warning => partition.warning.push(anomaly.clone()),
            Severity::Info => partition.info_count += 1,
        }
    }
    partition
}

/// One x-axis point of the forecast chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastChartPoint {
    pub date: NaiveDate,
    pub historical: Option<f64>,
    pub forecast: Option<f64>,
}

/// Split the forecast series into historical and forecast lines. The last
/// historical point is repeated on the forecast line so the two connect.
pub fn split_forecast(points: &[ForecastPoint]) -> Vec<ForecastChartPoint> {
    let bridge = points
        .iter()
        .position(|p| p.is_forecast)
        .and_then(|first| first.checked_sub(1));

    points
        .iter()
        .enumerate()
        .map(|(idx, p)| ForecastChartPoint {
            date: p.date,
            historical: (!p.is_forecast).then_some(p.value),
            forecast: (p.is_forecast || Some(idx) == bridge).then_some(p.value),
        })
        .collect()
}

//! In-memory latency rollups for upstream analytics queries.
//!
//! A bounded sample window per query; p50/p95/max are computed on demand.
//! One recorder lives on each orchestrator, nothing is persisted.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const MAX_SAMPLES_PER_QUERY: usize = 256;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLatencyRollup {
    pub query: String,
    pub sample_count: usize,
    pub p50_ms: u128,
    pub p95_ms: u128,
    pub max_ms: u128,
    pub budget_ms: u128,
    pub budget_violations: u64,
    pub failure_count: u64,
    pub last_recorded_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyRollups {
    pub generated_at: String,
    pub queries: Vec<QueryLatencyRollup>,
}

#[derive(Debug, Clone, Default)]
struct QueryLatencyWindow {
    samples_ms: VecDeque<u128>,
    budget_ms: u128,
    budget_violations: u64,
    failure_count: u64,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// Per-query sample windows. The budget is the query timeout.
#[derive(Debug)]
pub struct LatencyRecorder {
    budget_ms: u128,
    windows: Mutex<HashMap<&'static str, QueryLatencyWindow>>,
}

impl LatencyRecorder {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget_ms: budget.as_millis(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// A recorder that reports every named query from the start, sampled or not.
    pub fn tracking<I>(budget: Duration, queries: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let recorder = Self::new(budget);
        {
            let mut windows = recorder.windows.lock();
            for query in queries {
                windows.entry(query).or_default().budget_ms = recorder.budget_ms;
            }
        }
        recorder
    }

    pub fn record(&self, query: &'static str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis();
        let mut windows = self.windows.lock();
        let window = windows.entry(query).or_default();
        window.budget_ms = self.budget_ms;
        if elapsed_ms > self.budget_ms {
            window.budget_violations += 1;
        }
        if window.samples_ms.len() >= MAX_SAMPLES_PER_QUERY {
            window.samples_ms.pop_front();
        }
        window.samples_ms.push_back(elapsed_ms);
        window.last_recorded_at = Some(Utc::now());
    }

    /// Count a failed query. Failures carry no latency sample.
    pub fn record_failure(&self, query: &'static str) {
        let mut windows = self.windows.lock();
        let window = windows.entry(query).or_default();
        window.budget_ms = self.budget_ms;
        window.failure_count += 1;
        if window.last_recorded_at.is_none() {
            window.last_recorded_at = Some(Utc::now());
        }
    }

    pub fn rollups(&self) -> LatencyRollups {
        let windows = self.windows.lock();
        let mut queries: Vec<QueryLatencyRollup> = windows
            .iter()
            .map(|(query, window)| {
                let mut values: Vec<u128> = window.samples_ms.iter().copied().collect();
                values.sort_unstable();

                QueryLatencyRollup {
                    query: query.to_string(),
                    sample_count: values.len(),
                    p50_ms: percentile(&values, 50.0).unwrap_or(0),
                    p95_ms: percentile(&values, 95.0).unwrap_or(0),
                    max_ms: values.last().copied().unwrap_or(0),
                    budget_ms: window.budget_ms,
                    budget_violations: window.budget_violations,
                    failure_count: window.failure_count,
                    last_recorded_at: window.last_recorded_at.map(|dt| dt.to_rfc3339()),
                }
            })
            .collect();

        queries.sort_by(|a, b| b.p95_ms.cmp(&a.p95_ms).then(a.query.cmp(&b.query)));

        LatencyRollups {
            generated_at: Utc::now().to_rfc3339(),
            queries,
        }
    }
}

fn percentile(values: &[u128], p: f64) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    Some(values[idx])
}

//! Shared dashboard filter (date range + district subset).
//!
//! `FilterState` is the only mutable state the presentation layer touches.
//! Every `set` replaces the stored spec with a new immutable value and calls
//! each subscriber synchronously before returning. There is no debouncing:
//! a caller that changes start and end together passes both in one patch.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Active query parameters. An empty `entity_names` set means every district.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub entity_names: BTreeSet<String>,
}

impl FilterSpec {
    /// The spec a freshly mounted dashboard starts with.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => {
                Err(FilterError::InvertedRange { start, end })
            }
            _ => Ok(()),
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    pub fn is_all_entities(&self) -> bool {
        self.entity_names.is_empty()
    }

    /// Query parameters shared by every filtered analytics route. Absent
    /// fields are omitted rather than sent empty.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(start) = self.start_date {
            params.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            params.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        if !self.entity_names.is_empty() {
            let joined = self
                .entity_names
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("districts", joined));
        }
        params
    }
}

/// Partial update for `FilterState::set`. Only `Some` fields are replaced;
/// `start_date: Some(None)` clears the start bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub entity_names: Option<BTreeSet<String>>,
}

impl FilterPatch {
    pub fn start(mut self, date: Option<NaiveDate>) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn end(mut self, date: Option<NaiveDate>) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn range(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start(start).end(end)
    }

    pub fn entities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entity_names = Some(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.entity_names.is_none()
    }

    fn apply_to(self, spec: &FilterSpec) -> FilterSpec {
        FilterSpec {
            start_date: self.start_date.unwrap_or(spec.start_date),
            end_date: self.end_date.unwrap_or(spec.end_date),
            entity_names: self.entity_names.unwrap_or_else(|| spec.entity_names.clone()),
        }
    }
}

type Listener = Arc<dyn Fn(&FilterSpec) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Holds the current `FilterSpec` and fans changes out to subscribers.
pub struct FilterState {
    current: Mutex<FilterSpec>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

impl FilterState {
    pub fn new() -> Self {
        Self::with_spec(FilterSpec::unbounded())
    }

    pub fn with_spec(spec: FilterSpec) -> Self {
        Self {
            current: Mutex::new(spec),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current spec, by value.
    pub fn get(&self) -> FilterSpec {
        self.current.lock().clone()
    }

    /// Apply a patch and notify every subscriber before returning. A patch
    /// that would invert the date range is rejected and nothing changes.
    pub fn set(&self, patch: FilterPatch) -> Result<FilterSpec, FilterError> {
        let next = {
            let mut current = self.current.lock();
            let next = patch.apply_to(&current);
            next.validate()?;
            *current = next.clone();
            next
        };
        self.notify(&next);
        Ok(next)
    }

    /// Add or remove one district from the selection (sidebar checkbox).
    pub fn toggle_entity(&self, name: &str) -> FilterSpec {
        let name = name.trim().to_string();
        let next = {
            let mut current = self.current.lock();
            let mut next = current.clone();
            if !next.entity_names.remove(&name) && !name.is_empty() {
                next.entity_names.insert(name);
            }
            *current = next.clone();
            next
        };
        self.notify(&next);
        next
    }

    /// Back to "all districts".
    pub fn clear_entities(&self) -> FilterSpec {
        let next = {
            let mut current = self.current.lock();
            current.entity_names.clear();
            current.clone()
        };
        self.notify(&next);
        next
    }

    /// One-time bootstrap: adopt the observed data range when the user has not
    /// chosen any bounds yet. Returns None (and notifies nobody) otherwise.
    pub fn seed_bounds(&self, min: NaiveDate, max: NaiveDate) -> Option<FilterSpec> {
        if min > max {
            return None;
        }
        let next = {
            let mut current = self.current.lock();
            if current.has_bounds() {
                return None;
            }
            current.start_date = Some(min);
            current.end_date = Some(max);
            current.clone()
        };
        log::debug!("Seeded filter bounds from data: {} to {}", min, max);
        self.notify(&next);
        Some(next)
    }

    /// Register a listener. It stays registered until the returned
    /// `Subscription` is dropped or `unsubscribe`d.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FilterSpec) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self, spec: &FilterSpec) {
        // Listeners run outside the lock so they may call back into get().
        let listeners: Vec<Listener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(spec);
        }
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `FilterState::subscribe`.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_set_replaces_only_provided_fields() {
        let state = FilterState::new();
        state
            .set(FilterPatch::default().entities(["Hyderabad", "Medak"]))
            .unwrap();
        let spec = state
            .set(FilterPatch::default().start(Some(date(2025, 1, 1))))
            .unwrap();

        assert_eq!(spec.start_date, Some(date(2025, 1, 1)));
        assert_eq!(spec.end_date, None);
        assert_eq!(spec.entity_names.len(), 2);
        assert_eq!(state.get(), spec);
    }

    #[test]
    fn test_inverted_range_is_rejected_without_notifying() {
        let state = FilterState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = state.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = state
            .set(FilterPatch::default().range(Some(date(2025, 6, 1)), Some(date(2025, 1, 1))))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvertedRange { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.get(), FilterSpec::unbounded());
    }

    #[test]
    fn test_subscribers_notified_synchronously_once_per_set() {
        let state = FilterState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = state.subscribe(move |spec| sink.lock().push(spec.clone()));

        state
            .set(FilterPatch::default().range(Some(date(2025, 1, 1)), Some(date(2025, 3, 31))))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1, "start+end in one patch is one notification");
        assert_eq!(seen[0].end_date, Some(date(2025, 3, 31)));
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let state = FilterState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = state.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(state.subscriber_count(), 1);

        state.toggle_entity("Medak");
        sub.unsubscribe();
        state.toggle_entity("Medak");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.subscriber_count(), 0);
    }

    #[test]
    fn test_listener_can_read_state_during_notification() {
        let state = Arc::new(FilterState::new());
        let reader = state.clone();
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let _sub = state.subscribe(move |_| {
            *sink.lock() = Some(reader.get());
        });

        state.toggle_entity("Nalgonda");
        let observed = observed.lock().clone().unwrap();
        assert!(observed.entity_names.contains("Nalgonda"));
    }

    #[test]
    fn test_toggle_and_clear_entities() {
        let state = FilterState::new();
        state.toggle_entity(" Medak ");
        state.toggle_entity("Nizamabad");
        assert_eq!(state.get().entity_names.len(), 2);

        let spec = state.toggle_entity("Medak");
        assert_eq!(spec.entity_names.iter().collect::<Vec<_>>(), vec!["Nizamabad"]);

        assert!(state.clear_entities().is_all_entities());
    }

    #[test]
    fn test_seed_bounds_only_applies_once() {
        let state = FilterState::new();
        let seeded = state.seed_bounds(date(2025, 3, 1), date(2025, 11, 30)).unwrap();
        assert_eq!(seeded.start_date, Some(date(2025, 3, 1)));

        assert!(state.seed_bounds(date(2024, 1, 1), date(2024, 2, 1)).is_none());
        assert_eq!(state.get().start_date, Some(date(2025, 3, 1)));
    }

    #[test]
    fn test_query_params_omit_absent_fields() {
        let mut spec = FilterSpec::unbounded();
        assert!(spec.query_params().is_empty());

        spec.end_date = Some(date(2025, 2, 28));
        spec.entity_names = ["Medak", "Adilabad"].iter().map(|s| s.to_string()).collect();
        let params = spec.query_params();
        assert_eq!(
            params,
            vec![
                ("end_date", "2025-02-28".to_string()),
                ("districts", "Adilabad,Medak".to_string()),
            ]
        );
    }
}

//! Error types for dashboard refreshes
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, server-side HTTP failures
//! - NonRetryable: malformed payloads, bad filters, client-side HTTP failures
//! - Superseded: a newer refresh replaced this one; nothing to show

use thiserror::Error;

use crate::filter::FilterError;

/// Failure of one refresh cycle. Any variant other than `Superseded` means the
/// previously published snapshot stays on screen.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Network error while loading {query}: {message}")]
    Network { query: &'static str, message: String },

    #[error("{query} timed out after {secs} seconds")]
    Timeout { query: &'static str, secs: u64 },

    #[error("{query} returned HTTP {status}")]
    Http { query: &'static str, status: u16 },

    #[error("Failed to decode {query} response: {message}")]
    Decode { query: &'static str, message: String },

    #[error("Invalid geography: {0}")]
    Geography(#[from] GeometryError),

    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("Refresh #{seq} superseded by a newer refresh")]
    Superseded { seq: u64 },
}

impl OrchestratorError {
    /// Returns true if trying the same refresh again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Network { .. } | OrchestratorError::Timeout { .. } => true,
            OrchestratorError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, OrchestratorError::Superseded { .. })
    }

    /// Name of the upstream query that failed, when there is one
    pub fn query(&self) -> Option<&'static str> {
        match self {
            OrchestratorError::Network { query, .. }
            | OrchestratorError::Timeout { query, .. }
            | OrchestratorError::Http { query, .. }
            | OrchestratorError::Decode { query, .. } => Some(query),
            OrchestratorError::Geography(_) => Some("geojson"),
            OrchestratorError::InvalidFilter(_) | OrchestratorError::Superseded { .. } => None,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            OrchestratorError::Network { .. } => {
                "Check that the analytics service is reachable and try again."
            }
            OrchestratorError::Timeout { .. } => "The analytics service took too long. Try again.",
            OrchestratorError::Http { status, .. } if *status >= 500 => {
                "The analytics service reported an error. Try again shortly."
            }
            OrchestratorError::Http { .. } => "Check the selected filters and API configuration.",
            OrchestratorError::Decode { .. } => {
                "The analytics service returned an unexpected payload. Check service versions."
            }
            OrchestratorError::Geography(_) => {
                "Check the district boundary file served by /geojson."
            }
            OrchestratorError::InvalidFilter(_) => "Pick a start date on or before the end date.",
            OrchestratorError::Superseded { .. } => "A newer refresh is already in progress.",
        }
    }
}

/// Problems found while reading the polygon collection.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("expected a FeatureCollection, got {0}")]
    NotACollection(&'static str),
}

/// Serializable error representation for the presentation layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    Superseded,
}

impl From<&OrchestratorError> for DashboardError {
    fn from(err: &OrchestratorError) -> Self {
        let error_type = if err.is_superseded() {
            ErrorType::Superseded
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        DashboardError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
            query: err.query().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_and_network_are_retryable() {
        assert!(OrchestratorError::Timeout { query: "summary", secs: 30 }.is_retryable());
        assert!(OrchestratorError::Network {
            query: "summary",
            message: "connection refused".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_http_retryability_follows_status() {
        assert!(OrchestratorError::Http { query: "anomalies", status: 503 }.is_retryable());
        assert!(OrchestratorError::Http { query: "anomalies", status: 429 }.is_retryable());
        assert!(!OrchestratorError::Http { query: "anomalies", status: 404 }.is_retryable());
    }

    #[test]
    fn test_dashboard_error_carries_query_name() {
        let err = OrchestratorError::Http { query: "districts/health", status: 500 };
        let dto = DashboardError::from(&err);
        assert_eq!(dto.error_type, ErrorType::Retryable);
        assert!(dto.can_retry);
        assert_eq!(dto.query.as_deref(), Some("districts/health"));
        assert!(dto.message.contains("HTTP 500"));
    }

    #[test]
    fn test_invalid_filter_is_not_retryable() {
        let start = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let err = OrchestratorError::from(FilterError::InvertedRange { start, end });
        assert!(!err.is_retryable());
        assert_eq!(DashboardError::from(&err).error_type, ErrorType::NonRetryable);
    }

    #[test]
    fn test_superseded_is_its_own_type() {
        let dto = DashboardError::from(&OrchestratorError::Superseded { seq: 4 });
        assert_eq!(dto.error_type, ErrorType::Superseded);
        assert!(!dto.can_retry);
        assert!(dto.query.is_none());
    }
}

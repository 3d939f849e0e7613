//! District operational-intelligence dashboard core.
//!
//! One shared filter drives a concurrent fan-out of analytics queries; the
//! results are joined onto district polygons, classified into choropleth
//! tiers, and rolled up into the dashboard view.

pub mod aggregates;
pub mod analytics_api;
pub mod classify;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod helpers;
pub mod join;
pub mod latency;
pub mod orchestrator;
pub mod regions;
pub mod services;
pub mod state;
pub mod types;
pub mod util;

//! `opsintel`: run one dashboard refresh against the analytics service and
//! print the result as JSON.
//!
//! The service URL comes from ~/.opsintel/config.json or `OPSINTEL_API_URL`.

use std::sync::Arc;

use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use clap::Parser;

use opsintel_lib::analytics_api::AnalyticsClient;
use opsintel_lib::filter::FilterPatch;
use opsintel_lib::services::dashboard::{Dashboard, DashboardResult};
use opsintel_lib::state::load_config;

#[derive(Debug, Parser)]
#[command(name = "opsintel", about = "District operational intelligence dashboard refresh")]
struct Cli {
    /// First day of the date filter (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,
    /// Last day of the date filter (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,
    /// Comma-separated district names
    #[arg(long, value_delimiter = ',')]
    districts: Vec<String>,
    /// Only check that the analytics service is up
    #[arg(long)]
    health: bool,
}

impl Cli {
    fn patch(&self) -> FilterPatch {
        let mut patch = FilterPatch::default();
        if self.start.is_some() {
            patch = patch.start(self.start);
        }
        if self.end.is_some() {
            patch = patch.end(self.end);
        }
        if !self.districts.is_empty() {
            patch = patch.entities(&self.districts);
        }
        patch
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{value}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config().map_err(|e| anyhow!("Failed to load config: {e}"))?;
    let client = AnalyticsClient::new(&config.api)?;
    let dashboard = Dashboard::new(Arc::new(client), &config);

    if cli.health {
        let health = dashboard
            .service_health()
            .await
            .map_err(|e| anyhow!("Analytics service unhealthy: {}", e.message))?;
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    dashboard.apply_filter(cli.patch())?;
    let result = dashboard.refresh().await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let DashboardResult::Error { error } = result {
        bail!("{} ({})", error.message, error.recovery_suggestion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "opsintel",
            "--start",
            "2025-01-01",
            "--districts",
            "Medak, Nalgonda,",
        ])
        .unwrap();
        assert_eq!(cli.start, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(cli.end, None);
        assert!(!cli.health);

        let patch = cli.patch();
        assert_eq!(patch.end_date, None, "end untouched when not given");
        let names = patch.entity_names.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("Nalgonda"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Cli::try_parse_from(["opsintel", "--start", "01/02/2025"]).is_err());
        assert!(Cli::try_parse_from(["opsintel", "--end"]).is_err());
        assert!(Cli::try_parse_from(["opsintel", "--verbose"]).is_err());
    }
}

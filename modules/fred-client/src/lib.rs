pub mod error;
pub mod types;

pub use error::{FredError, Result};
pub use types::{
    Observation, Series, CPI_ALL_URBAN, TEN_TWO_SPREAD, TEN_YEAR_TREASURY, UNEMPLOYMENT_RATE,
};

use std::time::Duration;

use tracing::debug;
use types::ObservationsResponse;

const BASE_URL: &str = "https://api.stlouisfed.org/fred";

pub struct FredClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FredClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (FRED mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the newest `limit` observations for a series, newest first.
    /// Missing-value markers are dropped.
    pub async fn observations(&self, series_id: &str, limit: u32) -> Result<Series> {
        let url = format!("{}/series/observations", self.base_url);
        let limit = limit.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FredError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let series = parse_observations(series_id, &body)?;
        debug!(series_id, count = series.observations.len(), "fred: observations fetched");
        Ok(series)
    }
}

/// Decode an observations payload, dropping missing-value markers.
pub(crate) fn parse_observations(series_id: &str, body: &str) -> Result<Series> {
    let parsed: ObservationsResponse = serde_json::from_str(body)?;
    let observations: Vec<Observation> =
        parsed.observations.iter().filter_map(|o| o.parse()).collect();
    if observations.is_empty() {
        return Err(FredError::EmptySeries(series_id.to_string()));
    }
    Ok(Series {
        id: series_id.to_string(),
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_newest_value_falls_through_to_prior_day() {
        let body = r#"{"observations":[
            {"date":"2025-04-18","value":"."},
            {"date":"2025-04-17","value":"0.52"},
            {"date":"2025-04-16","value":"0.49"}
        ]}"#;
        let series = parse_observations(TEN_TWO_SPREAD, body).unwrap();
        let latest = series.latest().unwrap();
        assert_eq!(latest.value, 0.52);
        assert_eq!(latest.date.to_string(), "2025-04-17");
    }

    #[test]
    fn all_placeholders_is_an_empty_series() {
        let body = r#"{"observations":[{"date":"2025-04-18","value":"."}]}"#;
        assert!(matches!(
            parse_observations(TEN_TWO_SPREAD, body),
            Err(FredError::EmptySeries(id)) if id == TEN_TWO_SPREAD
        ));
    }
}

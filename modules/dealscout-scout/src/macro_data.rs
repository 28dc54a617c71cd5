//! Macro signals for the Risk Blender, sourced from FRED.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use fred_client::{
    FredClient, Series, CPI_ALL_URBAN, TEN_TWO_SPREAD, TEN_YEAR_TREASURY, UNEMPLOYMENT_RATE,
};
use tracing::{info, warn};

use dealscout_common::{LaborSignal, MacroSignals};

use crate::traits::MacroDataProvider;

/// Enough daily observations to reach a month back through holidays.
const DAILY_LOOKBACK: u32 = 40;
/// Thirteen monthly points cover year-over-year.
const CPI_LOOKBACK: u32 = 13;
const UNEMPLOYMENT_LOOKBACK: u32 = 4;

/// Observations requested per series. Daily series reach past holiday
/// placeholders, which the client drops.
fn lookback(series_id: &str) -> u32 {
    match series_id {
        CPI_ALL_URBAN => CPI_LOOKBACK,
        UNEMPLOYMENT_RATE => UNEMPLOYMENT_LOOKBACK,
        _ => DAILY_LOOKBACK,
    }
}

pub struct FredMacroProvider {
    client: FredClient,
}

impl FredMacroProvider {
    pub fn new(api_key: &str) -> Self {
        info!("Using FredMacroProvider");
        Self {
            client: FredClient::new(api_key.to_string()),
        }
    }

    pub fn with_client(client: FredClient) -> Self {
        Self { client }
    }

    async fn series(&self, id: &str) -> Option<Series> {
        match self.client.observations(id, lookback(id)).await {
            Ok(series) => Some(series),
            Err(e) => {
                warn!(series_id = id, error = %e, "Macro series unavailable");
                None
            }
        }
    }
}

/// Latest 10-year yield and its change over roughly one month, in bps.
fn rates(ten_year: &Series) -> (Option<f64>, Option<f64>) {
    let Some(latest) = ten_year.latest() else {
        return (None, None);
    };
    let month_ago = ten_year
        .at_or_before(latest.date - ChronoDuration::days(30))
        .map(|prior| ((latest.value - prior.value) * 100.0).round());
    (Some(latest.value), month_ago)
}

fn cpi_yoy(cpi: &Series) -> Option<f64> {
    let latest = cpi.latest()?;
    let year_ago = cpi.lagged(12)?;
    if year_ago.value <= 0.0 {
        return None;
    }
    Some(((latest.value / year_ago.value - 1.0) * 1000.0).round() / 10.0)
}

fn labor(unrate: &Series) -> Option<LaborSignal> {
    let latest = unrate.latest()?;
    let delta_3m = unrate
        .lagged(3)
        .map(|prior| ((latest.value - prior.value) * 10.0).round() / 10.0)
        .unwrap_or(0.0);
    Some(LaborSignal {
        rate: latest.value,
        delta_3m,
        metro: None,
    })
}

/// Fold whatever series came back into a signal set.
pub fn signals_from_series(
    ten_year: Option<&Series>,
    spread: Option<&Series>,
    cpi: Option<&Series>,
    unemployment: Option<&Series>,
) -> MacroSignals {
    let (ten_year_yield, ten_year_mom_bps) = ten_year.map(rates).unwrap_or((None, None));
    MacroSignals {
        ten_year_yield,
        ten_year_mom_bps,
        curve_spread: spread.and_then(|s| s.latest()).map(|o| o.value),
        cpi_yoy: cpi.and_then(cpi_yoy),
        labor: unemployment.and_then(labor),
        negative_news: None,
    }
}

#[async_trait]
impl MacroDataProvider for FredMacroProvider {
    async fn fetch(&self) -> Result<MacroSignals> {
        let (ten_year, spread, cpi, unemployment) = futures::join!(
            self.series(TEN_YEAR_TREASURY),
            self.series(TEN_TWO_SPREAD),
            self.series(CPI_ALL_URBAN),
            self.series(UNEMPLOYMENT_RATE),
        );
        if ten_year.is_none() && spread.is_none() && cpi.is_none() && unemployment.is_none() {
            bail!("no FRED series could be fetched");
        }
        Ok(signals_from_series(
            ten_year.as_ref(),
            spread.as_ref(),
            cpi.as_ref(),
            unemployment.as_ref(),
        ))
    }
}

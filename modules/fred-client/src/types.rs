use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 10-year treasury constant maturity rate (daily, percent).
pub const TEN_YEAR_TREASURY: &str = "DGS10";

/// 10-year minus 2-year treasury spread (daily, percent).
pub const TEN_TWO_SPREAD: &str = "T10Y2Y";

/// CPI for all urban consumers (monthly index level).
pub const CPI_ALL_URBAN: &str = "CPIAUCSL";

/// Civilian unemployment rate (monthly, percent).
pub const UNEMPLOYMENT_RATE: &str = "UNRATE";

#[derive(Debug, Deserialize)]
pub(crate) struct ObservationsResponse {
    #[serde(default)]
    pub observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawObservation {
    pub date: String,
    /// FRED reports missing values as ".".
    pub value: String,
}

/// A parsed, non-missing observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl RawObservation {
    pub(crate) fn parse(&self) -> Option<Observation> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        let value = self.value.trim().parse::<f64>().ok()?;
        Some(Observation { date, value })
    }
}

/// Newest-first list of observations for one series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub observations: Vec<Observation>,
}

impl Series {
    pub fn latest(&self) -> Option<&Observation> {
        self.observations.first()
    }

    /// Observation `n` periods before the latest one.
    pub fn lagged(&self, n: usize) -> Option<&Observation> {
        self.observations.get(n)
    }

    /// First observation dated on or before `date`.
    pub fn at_or_before(&self, date: NaiveDate) -> Option<&Observation> {
        self.observations.iter().find(|o| o.date <= date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_marker_is_skipped() {
        let raw = RawObservation {
            date: "2025-01-02".into(),
            value: ".".into(),
        };
        assert!(raw.parse().is_none());
    }

    #[test]
    fn lookups_walk_newest_first() {
        let series = Series {
            id: TEN_YEAR_TREASURY.into(),
            observations: vec![
                Observation {
                    date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                    value: 4.2,
                },
                Observation {
                    date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
                    value: 4.5,
                },
            ],
        };
        assert_eq!(series.latest().unwrap().value, 4.2);
        assert_eq!(series.lagged(1).unwrap().value, 4.5);
        let feb = NaiveDate::from_ymd_opt(2025, 2, 15).unwrap();
        assert_eq!(series.at_or_before(feb).unwrap().value, 4.5);
    }
}

//! Risk Blender: optional macro signals → one bounded risk score with a note.
//!
//! Higher is riskier. Every signal contributes an individually capped delta
//! around a neutral baseline; thin evidence shrinks the total deviation.

use dealscout_common::{MacroSignals, RiskAssessment, RiskFactor};

pub const LOW_CONFIDENCE_FACTOR: &str = "low_confidence_shrink";

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub baseline: f64,
    /// Multiplier applied to the deviation when evidence is thin.
    pub shrink: f64,
    /// Fewer categories than this triggers the shrink.
    pub min_categories: usize,
    pub rate_level_cap: f64,
    pub rate_trend_cap: f64,
    pub curve_cap: f64,
    pub inflation_cap: f64,
    pub labor_cap: f64,
    pub news_cap: f64,
    /// 10-year yield considered neutral, percent.
    pub neutral_ten_year: f64,
    /// CPI year-over-year considered neutral, percent.
    pub neutral_cpi: f64,
    /// Unemployment rate considered neutral, percent.
    pub neutral_unemployment: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            baseline: 50.0,
            shrink: 0.6,
            min_categories: 2,
            rate_level_cap: 20.0,
            rate_trend_cap: 6.0,
            curve_cap: 10.0,
            inflation_cap: 8.0,
            labor_cap: 10.0,
            news_cap: 8.0,
            neutral_ten_year: 4.0,
            neutral_cpi: 2.5,
            neutral_unemployment: 4.5,
        }
    }
}

fn capped(value: f64, cap: f64) -> f64 {
    value.clamp(-cap, cap)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn signed(value: f64) -> String {
    format!("{value:+.1}")
}

/// Blend with the default configuration.
pub fn blend(signals: &MacroSignals) -> RiskAssessment {
    blend_with(signals, &RiskConfig::default())
}

pub fn blend_with(signals: &MacroSignals, config: &RiskConfig) -> RiskAssessment {
    let mut factors = Vec::new();
    let mut notes = Vec::new();
    let mut categories = 0;

    // Rates: level and trend count as one category.
    let mut rate_notes = Vec::new();
    if let Some(level) = signals.ten_year_yield {
        let delta = capped((level - config.neutral_ten_year) * 8.0, config.rate_level_cap);
        factors.push(RiskFactor { name: "rate_level".into(), delta });
        rate_notes.push(format!("10Y at {level:.2}% ({})", signed(delta)));
    }
    if let Some(bps) = signals.ten_year_mom_bps {
        let delta = capped(bps / 5.0, config.rate_trend_cap);
        factors.push(RiskFactor { name: "rate_trend".into(), delta });
        rate_notes.push(format!("{bps:+.0}bps m/m ({})", signed(delta)));
    }
    if !rate_notes.is_empty() {
        categories += 1;
        notes.push(format!("Rates: {}", rate_notes.join(", ")));
    }

    if let Some(spread) = signals.curve_spread {
        // Inversion (negative spread) raises risk.
        let delta = capped(-spread * 10.0, config.curve_cap);
        factors.push(RiskFactor { name: "curve".into(), delta });
        categories += 1;
        notes.push(format!("Curve: 10Y-2Y {spread:+.2}% ({})", signed(delta)));
    }

    if let Some(cpi) = signals.cpi_yoy {
        let delta = capped((cpi - config.neutral_cpi) * 3.0, config.inflation_cap);
        factors.push(RiskFactor { name: "inflation".into(), delta });
        categories += 1;
        notes.push(format!("Inflation: CPI {cpi:.1}% y/y ({})", signed(delta)));
    }

    if let Some(labor) = &signals.labor {
        let delta = capped(
            labor.delta_3m * 20.0 + (labor.rate - config.neutral_unemployment) * 2.0,
            config.labor_cap,
        );
        factors.push(RiskFactor { name: "labor".into(), delta });
        categories += 1;
        let scope = labor.metro.as_deref().unwrap_or("national");
        notes.push(format!(
            "Labor: {scope} unemployment {:.1}% ({:+.1}pp 3m) ({})",
            labor.rate,
            labor.delta_3m,
            signed(delta)
        ));
    }

    if let Some(count) = signals.negative_news {
        let delta = capped((f64::from(count) - 1.0) * 2.0, config.news_cap);
        factors.push(RiskFactor { name: "news".into(), delta });
        categories += 1;
        notes.push(format!("News: {count} negative headlines ({})", signed(delta)));
    }

    let raw_deviation: f64 = factors.iter().map(|f| f.delta).sum();
    let mut deviation = raw_deviation;

    if categories > 0 && categories < config.min_categories {
        deviation = raw_deviation * config.shrink;
        factors.push(RiskFactor {
            name: LOW_CONFIDENCE_FACTOR.into(),
            delta: deviation - raw_deviation,
        });
        notes.push(format!(
            "Confidence: low ({categories} signal category), deviation x{}",
            config.shrink
        ));
    }

    let score = round1((config.baseline + deviation).clamp(0.0, 100.0));
    let note = if notes.is_empty() {
        "No macro signals available; neutral baseline.".to_string()
    } else {
        notes.join("; ")
    };

    RiskAssessment {
        score,
        factors,
        categories,
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_common::LaborSignal;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_signals_is_exactly_neutral() {
        let risk = blend(&MacroSignals::default());
        assert_eq!(risk.score, 50.0);
        assert!(risk.factors.is_empty());
        assert_eq!(risk.categories, 0);
    }

    #[test]
    fn single_category_is_shrunk_and_recorded() {
        let signals = MacroSignals {
            ten_year_yield: Some(6.5),
            ..Default::default()
        };
        let risk = blend(&signals);
        // Unshrunk would be 50 + 20 = 70.
        assert!(close(risk.score, 62.0));
        let shrink = risk
            .factors
            .iter()
            .find(|f| f.name == LOW_CONFIDENCE_FACTOR)
            .expect("shrink factor recorded");
        assert!(close(shrink.delta, -8.0));
        assert!(risk.note.contains("Confidence: low"));
    }

    #[test]
    fn level_and_trend_share_one_category() {
        let signals = MacroSignals {
            ten_year_yield: Some(4.5),
            ten_year_mom_bps: Some(20.0),
            ..Default::default()
        };
        let risk = blend(&signals);
        assert_eq!(risk.categories, 1);
        assert!(risk.factors.iter().any(|f| f.name == LOW_CONFIDENCE_FACTOR));
    }

    #[test]
    fn two_categories_are_not_shrunk() {
        let signals = MacroSignals {
            ten_year_yield: Some(5.0),
            cpi_yoy: Some(3.5),
            ..Default::default()
        };
        let risk = blend(&signals);
        assert_eq!(risk.categories, 2);
        assert!(!risk.factors.iter().any(|f| f.name == LOW_CONFIDENCE_FACTOR));
        // 50 + 8 + 3
        assert!(close(risk.score, 61.0));
    }

    #[test]
    fn extreme_inputs_stay_in_range() {
        let hot = MacroSignals {
            ten_year_yield: Some(15.0),
            ten_year_mom_bps: Some(300.0),
            curve_spread: Some(-4.0),
            cpi_yoy: Some(14.0),
            labor: Some(LaborSignal {
                rate: 12.0,
                delta_3m: 3.0,
                metro: None,
            }),
            negative_news: Some(50),
        };
        let risk = blend(&hot);
        assert_eq!(risk.score, 100.0);

        let cold = MacroSignals {
            ten_year_yield: Some(0.1),
            ten_year_mom_bps: Some(-300.0),
            curve_spread: Some(4.0),
            cpi_yoy: Some(-5.0),
            labor: Some(LaborSignal {
                rate: 2.0,
                delta_3m: -2.0,
                metro: Some("Austin".into()),
            }),
            negative_news: Some(0),
        };
        let risk = blend(&cold);
        assert_eq!(risk.score, 0.0);
    }

    #[test]
    fn note_follows_fixed_category_order() {
        let signals = MacroSignals {
            ten_year_yield: Some(4.2),
            curve_spread: Some(-0.3),
            cpi_yoy: Some(3.0),
            labor: Some(LaborSignal {
                rate: 4.1,
                delta_3m: 0.2,
                metro: Some("Dallas".into()),
            }),
            negative_news: Some(2),
            ..Default::default()
        };
        let note = blend(&signals).note;
        let positions: Vec<usize> = ["Rates:", "Curve:", "Inflation:", "Labor:", "News:"]
            .iter()
            .map(|label| note.find(label).expect("label present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(note.contains("Dallas"));
    }

    #[test]
    fn custom_shrink_factor_applies() {
        let config = RiskConfig {
            shrink: 0.5,
            ..Default::default()
        };
        let signals = MacroSignals {
            curve_spread: Some(-1.0),
            ..Default::default()
        };
        let risk = blend_with(&signals, &config);
        assert!(close(risk.score, 55.0));
    }
}

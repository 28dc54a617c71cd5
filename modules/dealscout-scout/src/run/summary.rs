//! Portfolio summary for score-only runs.

use std::collections::BTreeMap;

use dealscout_common::{PortfolioSummary, ScoreDistribution, ScoreLabel, ScoredCandidate};

const UNKNOWN_LOCATION: &str = "unknown";

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn distribution(candidates: &[ScoredCandidate]) -> ScoreDistribution {
    let mut dist = ScoreDistribution::default();
    if candidates.is_empty() {
        return dist;
    }
    for c in candidates {
        match c.label {
            ScoreLabel::Strong => dist.strong += 1,
            ScoreLabel::Promising => dist.promising += 1,
            ScoreLabel::Speculative => dist.speculative += 1,
            ScoreLabel::Weak => dist.weak += 1,
        }
    }

    let mut scores: Vec<u32> = candidates.iter().map(|c| c.score).collect();
    scores.sort_unstable();
    let n = scores.len();
    dist.mean = round1(scores.iter().map(|s| f64::from(*s)).sum::<f64>() / n as f64);
    dist.median = if n % 2 == 1 {
        f64::from(scores[n / 2])
    } else {
        f64::from(scores[n / 2 - 1] + scores[n / 2]) / 2.0
    };
    dist.max = scores[n - 1];
    dist
}

pub fn summarize(candidates: &[ScoredCandidate]) -> PortfolioSummary {
    let mut geography = BTreeMap::new();
    for c in candidates {
        let key = c
            .signals
            .location
            .clone()
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        *geography.entry(key).or_insert(0) += 1;
    }

    let caps: Vec<f64> = candidates
        .iter()
        .filter_map(|c| c.signals.cap_rate_pct)
        .collect();
    let avg_cap_rate = (!caps.is_empty())
        .then(|| (caps.iter().sum::<f64>() / caps.len() as f64 * 100.0).round() / 100.0);

    PortfolioSummary {
        candidates: candidates.len(),
        scores: distribution(candidates),
        geography,
        avg_cap_rate,
    }
}

/// Human-readable rendering of a summary for the answer stream.
pub fn describe(summary: &PortfolioSummary) -> String {
    if summary.candidates == 0 {
        return "No candidates to summarize.".to_string();
    }
    let s = &summary.scores;
    let mut text = format!(
        "{} candidates: {} strong, {} promising, {} speculative, {} weak (mean {:.1}, median {:.1}, max {}).",
        summary.candidates, s.strong, s.promising, s.speculative, s.weak, s.mean, s.median, s.max
    );
    let mut places: Vec<(&String, &usize)> = summary.geography.iter().collect();
    places.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top: Vec<String> = places
        .iter()
        .take(3)
        .map(|(place, count)| format!("{place} ({count})"))
        .collect();
    text.push_str(&format!(" Top locations: {}.", top.join(", ")));
    if let Some(cap) = summary.avg_cap_rate {
        text.push_str(&format!(" Average cap rate {cap:.2}%."));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::score_hit;
    use dealscout_common::SearchHit;

    fn candidates() -> Vec<ScoredCandidate> {
        vec![
            score_hit(
                &SearchHit::new(
                    "Walgreens | Absolute NNN | 6.0% Cap",
                    "https://www.crexi.com/properties/1000001/walgreens",
                    "Waco, TX. 15 years remaining.",
                ),
                Some("walgreens"),
            ),
            score_hit(
                &SearchHit::new(
                    "Dollar General | 7.0% Cap",
                    "https://www.crexi.com/properties/1000002/dg",
                    "Tyler, TX",
                ),
                Some("walgreens"),
            ),
            score_hit(&SearchHit::new("Office", "https://broker.example.com/o", ""), None),
        ]
    }

    #[test]
    fn summarizes_scores_geography_and_yield() {
        let all = candidates();
        let summary = summarize(&all);
        assert_eq!(summary.candidates, 3);

        let dist = &summary.scores;
        assert_eq!(dist.strong + dist.promising + dist.speculative + dist.weak, 3);
        assert_eq!(dist.max, all.iter().map(|c| c.score).max().unwrap());
        assert_eq!(summary.geography.get("unknown"), Some(&1));
        assert_eq!(summary.geography.values().sum::<usize>(), 3);
        assert_eq!(summary.avg_cap_rate, Some(6.5));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let mut all = candidates();
        all.truncate(2);
        let summary = summarize(&all);
        let expected = f64::from(all[0].score + all[1].score) / 2.0;
        assert_eq!(summary.scores.median, expected);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = summarize(&[]);
        assert_eq!(summary, PortfolioSummary::default());
        assert_eq!(describe(&summary), "No candidates to summarize.");
    }

    #[test]
    fn description_mentions_counts_and_cap_rate() {
        let text = describe(&summarize(&candidates()));
        assert!(text.starts_with("3 candidates:"));
        assert!(text.contains("Average cap rate 6.50%"));
    }
}

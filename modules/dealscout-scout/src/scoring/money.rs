//! Currency and percentage parsing for listing text.

use std::sync::LazyLock;

use regex::Regex;

/// `$4.2 million`, `$4.2M`, `$1,250,000`, `$850K`, `4.2 MM`.
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s*(million|mil|mm|m|thousand|k)?\b")
        .expect("valid money regex")
});

/// Bare amount with optional scale word, no currency sign required.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\$?\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s*(million|mil|mm|m|thousand|k)?\b")
        .expect("valid amount regex")
});

static CAP_RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:cap(?:italization)?\s*rate\s*(?:of|:|is)?\s*(\d{1,2}(?:\.\d{1,2})?)\s*%|(\d{1,2}(?:\.\d{1,2})?)\s*%\s*cap)")
        .expect("valid cap rate regex")
});

/// Apply the scale word and round to cents.
fn scale(amount: f64, suffix: Option<&str>) -> f64 {
    let scaled = match suffix.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("million" | "mil" | "mm" | "m") => amount * 1_000_000.0,
        Some("thousand" | "k") => amount * 1_000.0,
        _ => amount,
    };
    (scaled * 100.0).round() / 100.0
}

fn to_number(digits: &str) -> Option<f64> {
    digits.replace(',', "").parse::<f64>().ok()
}

/// Parse a price string like `"$4.2 million"` into 4_200_000.0.
/// The string must start with the amount (optionally `$`-prefixed).
pub fn parse_money(text: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(text)?;
    let amount = to_number(caps.get(1)?.as_str())?;
    let value = scale(amount, caps.get(2).map(|m| m.as_str()));
    (value > 0.0).then_some(value)
}

/// First `$`-prefixed amount anywhere in free text.
pub fn find_money(text: &str) -> Option<f64> {
    find_all_money(text).into_iter().next()
}

/// Every `$`-prefixed amount in free text, in order of appearance.
pub fn find_all_money(text: &str) -> Vec<f64> {
    MONEY_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let amount = to_number(caps.get(1)?.as_str())?;
            let value = scale(amount, caps.get(2).map(|m| m.as_str()));
            (value > 0.0).then_some(value)
        })
        .collect()
}

/// Cap rate percentage mentioned in free text ("6.25% cap", "cap rate: 7%").
/// Values outside (0, 25] are ignored as noise.
pub fn find_cap_rate(text: &str) -> Option<f64> {
    CAP_RATE_RE.captures_iter(text).find_map(|caps| {
        let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let pct = raw.parse::<f64>().ok()?;
        (pct > 0.0 && pct <= 25.0).then_some(pct)
    })
}

/// Parse a bare percentage ("6.5%", "6.5", "0.065") into percent units.
pub fn parse_percent(text: &str) -> Option<f64> {
    let cleaned = text.trim().trim_end_matches('%').trim();
    let value = cleaned.parse::<f64>().ok()?;
    let pct = if value > 0.0 && value < 1.0 { value * 100.0 } else { value };
    (pct > 0.0 && pct <= 25.0).then_some(pct)
}

//! Schedule expressions → fixed intervals.
//!
//! Accepted forms: `@hourly`, `@daily`, `@every <n><s|m|h|d>`,
//! `every <n> minute(s)|hour(s)`, and 5- or 6-field cron expressions. A cron
//! expression becomes the gap between its next two fire times.

use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use regex::Regex;
use tracing::warn;

static EVERY_SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^@every\s+(\d+)\s*([smhd])$").expect("valid schedule regex"));

static EVERY_LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^every\s+(\d+)\s+(minute|minutes|min|mins|hour|hours)$")
        .expect("valid schedule regex")
});

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// `n * unit` seconds; `None` for zero or on overflow.
fn scaled(raw: &str, unit: u64) -> Option<Duration> {
    let n = raw.parse::<u64>().ok().filter(|n| *n > 0)?;
    n.checked_mul(unit).map(Duration::from_secs)
}

/// Cron fields with a leading seconds field added to the classic 5-field form.
fn cron_interval(expr: &str) -> Option<Duration> {
    let fields = expr.split_whitespace().count();
    let full = match fields {
        5 => format!("0 {expr}"),
        6 => expr.to_string(),
        _ => return None,
    };
    let schedule = Schedule::from_str(&full).ok()?;
    let mut upcoming = schedule.upcoming(Utc);
    let first = upcoming.next()?;
    let second = upcoming.next()?;
    (second - first).to_std().ok().filter(|gap| !gap.is_zero())
}

/// Parse a schedule expression. `None` for anything not recognized.
pub fn parse_schedule(expr: &str) -> Option<Duration> {
    let expr = expr.trim();
    match expr.to_lowercase().as_str() {
        "@hourly" => return Some(Duration::from_secs(HOUR)),
        "@daily" => return Some(Duration::from_secs(DAY)),
        _ => {}
    }

    if let Some(caps) = EVERY_SHORT_RE.captures(expr) {
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "s" => 1,
            "m" => MINUTE,
            "h" => HOUR,
            _ => DAY,
        };
        return scaled(&caps[1], unit);
    }

    if let Some(caps) = EVERY_LONG_RE.captures(expr) {
        let unit = if caps[2].to_ascii_lowercase().starts_with('h') { HOUR } else { MINUTE };
        return scaled(&caps[1], unit);
    }

    cron_interval(expr)
}

/// Interval for a watchlist schedule, falling back to `default` (with a
/// warning for non-empty expressions that fail to parse).
pub fn interval_for(watchlist_id: &str, expr: &str, default: Duration) -> Duration {
    if expr.trim().is_empty() {
        return default;
    }
    parse_schedule(expr).unwrap_or_else(|| {
        warn!(
            watchlist_id,
            schedule = expr,
            default_secs = default.as_secs(),
            "Unrecognized schedule, using default interval"
        );
        default
    })
}

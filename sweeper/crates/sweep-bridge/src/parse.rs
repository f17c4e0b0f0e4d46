//! Number extraction from rendered tester text.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

macro_rules! re {
    ($pat:expr) => {
        LazyLock::new(|| Regex::new($pat).unwrap())
    };
}

/// Grouped form first so `1 234.50` is read whole rather than as `1`.
static RE_NUMBER: LazyLock<Regex> =
    re!(r"-?\d{1,3}(?:[,\x{00A0}\x{202F}\x{2009} ]\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?");

const GROUP_SEPARATORS: [char; 5] = [',', '\u{00A0}', '\u{202F}', '\u{2009}', ' '];

/// First signed decimal number in `text`.
///
/// Accepts the Unicode minus sign and common thousands separators; units,
/// percent signs and trailing annotations are ignored.
/// `"−1 234.50 USDT −1.23%"` reads as `-1234.5`.
pub fn parse_metric_text(text: &str) -> Option<f64> {
    let normalized = text.replace('\u{2212}', "-");
    let found = RE_NUMBER.find(&normalized)?;
    let digits: String = found
        .as_str()
        .chars()
        .filter(|c| !GROUP_SEPARATORS.contains(c))
        .collect();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y %H:%M",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%b %d, %Y", "%d.%m.%Y"];

/// Best-effort parse of a trade-list date cell.
pub fn parse_trade_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

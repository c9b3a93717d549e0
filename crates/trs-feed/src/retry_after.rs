//! `Retry-After` header parsing

use std::time::Duration;

use tracing::warn;

/// Longest server-requested delay we honour
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds (`"120"`) and HTTP-dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). A date in the past yields a zero
/// delay. Returns `None` for values that cannot be parsed or exceed one
/// hour, leaving the caller's backoff policy in charge.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        let delay = Duration::from_secs(seconds);
        return (delay <= MAX_RETRY_AFTER).then_some(delay);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let target = date.with_timezone(&chrono::Utc);
        let diff = (target - chrono::Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        return (diff <= MAX_RETRY_AFTER).then_some(diff);
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

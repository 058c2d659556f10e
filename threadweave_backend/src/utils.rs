//! Shared helpers and constants.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub const APP_NAME: &str = "threadweave_backend";

/// Fixed-width RFC 3339 timestamp so lexical order matches time order.
pub fn now_utc_iso() -> String {
    format_iso(Utc::now())
}

/// The smallest representable timestamp strictly after `previous`.
pub fn timestamp_after(previous: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(previous)
        .with_context(|| format!("stored timestamp {previous:?} is not RFC 3339"))?;
    Ok(format_iso(parsed.with_timezone(&Utc) + Duration::microseconds(1)))
}

fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn print_banner() {
    println!("{APP_NAME} v{}", env!("CARGO_PKG_VERSION"));
}

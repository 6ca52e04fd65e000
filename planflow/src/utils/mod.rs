//! Utility functions for identifiers and timestamp handling.

use chrono::Utc;
use uuid::Uuid;

/// Formats "now" for context and event timestamps.
///
/// Microsecond precision with an explicit `+00:00` offset, which parses as
/// RFC 3339:
///
/// ```
/// use planflow::utils::iso_timestamp;
///
/// assert!(iso_timestamp().ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Generates a new session identifier (UUID v4, hyphenated).
#[must_use]
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns true if the string is a parseable UUID.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

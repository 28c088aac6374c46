//! Built-in tools available to every chat without MCP configuration.

mod web_fetch;
mod web_search;

pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::time::Duration;

use serde_json::{json, Value};

/// Request timeout for the built-in web tools. These endpoints return
/// complete bodies, so no streaming-sized timeout is needed.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Renders a structured error payload.
///
/// The web tools report argument and network failures in-band as
/// `{"error": …}` output rather than through the error channel, so the
/// model sees the reason and can adjust its arguments.
pub(crate) fn error_payload(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Reads an integer argument, tolerating models that quote numbers.
pub(crate) fn integer_argument(arguments: &Value, key: &str) -> Option<i64> {
    let value = arguments.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arguments_accept_numbers_and_numeric_strings() {
        let arguments = json!({ "count": 7, "max_chars": "350", "bad": "many" });
        assert_eq!(integer_argument(&arguments, "count"), Some(7));
        assert_eq!(integer_argument(&arguments, "max_chars"), Some(350));
        assert_eq!(integer_argument(&arguments, "bad"), None);
        assert_eq!(integer_argument(&arguments, "missing"), None);
    }

    #[test]
    fn error_payload_is_valid_json() {
        let parsed: Value = serde_json::from_str(&error_payload("it broke")).unwrap();
        assert_eq!(parsed["error"], "it broke");
    }
}

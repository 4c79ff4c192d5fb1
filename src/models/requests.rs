//! Request DTOs for the cache HTTP facade
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds; 0 = never expires, omitted = default TTL
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: serde_json::Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "test", "value": "hello"}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value, json!("hello"));
        assert!(req.ttl.is_none());
    }

    #[test]
    fn test_set_request_structured_value() {
        let json = r#"{"key": "session:42", "value": {"user": "ahmet"}, "ttl": 5}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.value, json!({"user": "ahmet"}));
        assert_eq!(req.ttl, Some(5));
    }

    #[test]
    fn test_set_request_negative_ttl_parses() {
        // Rejected by the client, not by deserialization
        let json = r#"{"key": "k", "value": 1, "ttl": -1}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ttl, Some(-1));
    }
}

//! Completion envelope posted by the login dialog to its opener.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The single message a login dialog posts when it finishes.
///
/// Wire format:
/// `{"status":"success","accessToken":..,"accountId":..,"cache":{..}}` or
/// `{"status":"error","error":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DialogCompletion {
    Success {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(rename = "accountId")]
        account_id: String,
        /// Identity-provider cache entries from the dialog's storage.
        #[serde(default)]
        cache: BTreeMap<String, String>,
    },
    Error {
        #[serde(default)]
        error: Value,
    },
}

impl DialogCompletion {
    pub fn parse(message: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(message)
    }

    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(error: impl Into<Value>) -> Self {
        DialogCompletion::Error {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DialogCompletion::Success { .. })
    }
}

/// Render an error payload the way the user should see it.
pub fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown error".to_string(),
        Value::Object(map) => map
            .get("errorMessage")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_success_envelope() {
        let completion = DialogCompletion::parse(
            r#"{"status":"success","accessToken":"t","accountId":"a","cache":{"idp.k":"v"}}"#,
        )
        .unwrap();

        match completion {
            DialogCompletion::Success {
                access_token,
                account_id,
                cache,
            } => {
                assert_eq!(access_token, "t");
                assert_eq!(account_id, "a");
                assert_eq!(cache.get("idp.k").map(String::as_str), Some("v"));
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn test_missing_cache_defaults_to_empty() {
        let completion =
            DialogCompletion::parse(r#"{"status":"success","accessToken":"t","accountId":"a"}"#)
                .unwrap();
        assert!(matches!(
            completion,
            DialogCompletion::Success { ref cache, .. } if cache.is_empty()
        ));
    }

    #[test]
    fn test_rejects_unknown_status_and_missing_fields() {
        assert!(DialogCompletion::parse(r#"{"status":"pending"}"#).is_err());
        assert!(DialogCompletion::parse(r#"{"status":"success","accessToken":"t"}"#).is_err());
        assert!(DialogCompletion::parse("not json").is_err());
    }

    #[test]
    fn test_error_envelope_serializes_with_status_tag() {
        let message = DialogCompletion::error("popup blocked").to_message().unwrap();
        let value: Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value, json!({ "status": "error", "error": "popup blocked" }));
    }

    #[test]
    fn test_error_text() {
        assert_eq!(error_text(&json!("plain")), "plain");
        assert_eq!(
            error_text(&json!({ "errorMessage": "AADSTS65001", "errorCode": "consent" })),
            "AADSTS65001"
        );
        assert_eq!(error_text(&json!({ "code": 7 })), r#"{"code":7}"#);
        assert_eq!(error_text(&Value::Null), "Unknown error");
    }
}

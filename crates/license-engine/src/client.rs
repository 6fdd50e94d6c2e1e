//! Licensing backend REST client.
//!
//! Two endpoints under the configured base URL:
//! - `POST /identify` returns the caller's [`EntitlementRecord`]
//! - `POST /activate {licenseKey}` returns `{activated}`
//!
//! Both authenticate with the caller's bearer token. Error bodies may carry
//! a `message` field, which is kept verbatim so the "license not found"
//! match can run on it.

use crate::entitlement::EntitlementRecord;
use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Body of `POST /activate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub license_key: String,
}

/// Response of `POST /activate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResponse {
    pub activated: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Licensing backend operations.
#[async_trait]
pub trait LicensingApi: Send + Sync {
    async fn identify(&self, access_token: &str) -> LicenseResult<EntitlementRecord>;

    async fn activate(
        &self,
        access_token: &str,
        request: &ActivationRequest,
    ) -> LicenseResult<ActivationResponse>;
}

/// [`LicensingApi`] over HTTP.
#[derive(Clone)]
pub struct HttpLicensingApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpLicensingApi {
    /// Create a client for `base_url` (e.g. `https://app.example.com/api`).
    pub fn new(base_url: &str) -> LicenseResult<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http_client: reqwest::Client, base_url: &str) -> LicenseResult<Self> {
        let parsed = Url::parse(base_url)?;
        Ok(Self {
            http_client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, access_token: &str, body: &B) -> LicenseResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path);
        tracing::debug!(url = %url, "Calling licensing backend");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            tracing::error!(status = %status, path, message = %message, "Licensing request failed");
            return Err(LicenseError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// `message` from a JSON error body, else the trimmed body text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl LicensingApi for HttpLicensingApi {
    async fn identify(&self, access_token: &str) -> LicenseResult<EntitlementRecord> {
        let record: EntitlementRecord = self
            .post("identify", access_token, &serde_json::json!({}))
            .await?;
        tracing::debug!(status = ?record.status, "Entitlement fetched");
        Ok(record)
    }

    async fn activate(
        &self,
        access_token: &str,
        request: &ActivationRequest,
    ) -> LicenseResult<ActivationResponse> {
        self.post("activate", access_token, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::EntitlementStatus;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            HttpLicensingApi::new("not a url"),
            Err(LicenseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"message":"License not found"}"#),
            "License not found"
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_message(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
    }

    #[tokio::test]
    async fn test_identify_sends_bearer_and_parses_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/identify"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "active",
                "hasAccess": true,
                "validated": true,
                "licenseTags": [],
                "licenseEntitlements": ["analysis"],
                "licenseStatus": "ACTIVE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpLicensingApi::new(&format!("{}/api/", server.uri())).unwrap();
        let record = api.identify("tok-1").await.unwrap();

        assert_eq!(record.status, EntitlementStatus::Active);
        assert_eq!(record.license_entitlements, vec!["analysis".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_posts_license_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/activate"))
            .and(body_json(serde_json::json!({ "licenseKey": "ABC-123" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "activated": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpLicensingApi::new(&server.uri()).unwrap();
        let response = api
            .activate(
                "tok",
                &ActivationRequest {
                    license_key: "ABC-123".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(response.activated);
    }

    #[tokio::test]
    async fn test_error_body_message_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/activate"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "message": "License Not Found" })),
            )
            .mount(&server)
            .await;

        let api = HttpLicensingApi::new(&server.uri()).unwrap();
        let err = api
            .activate(
                "tok",
                &ActivationRequest {
                    license_key: "nope".to_string(),
                },
            )
            .await
            .unwrap_err();

        match &err {
            LicenseError::Api { status, message } => {
                assert_eq!(*status, 404);
                assert_eq!(message, "License Not Found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_license_not_found());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identify"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let api = HttpLicensingApi::new(&server.uri()).unwrap();
        let err = api.identify("tok").await.unwrap_err();
        assert!(err.is_transient());
    }
}

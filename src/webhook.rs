//! Run-completion webhook.
//!
//! After a run, a JSON summary can be POSTed to a URL. With a token, the
//! body is signed with HMAC-SHA256 and the lower-case hex digest sent in
//! `X-Versioner-Signature`. Delivery is best effort: failures are logged
//! and never change the exit code.

use std::time::Duration;

use anyhow::{
    Context,
    Result,
};
use hmac::{
    Hmac,
    Mac,
};
use serde::Serialize;
use sha2::Sha256;
use tracing::{
    debug,
    info,
    warn,
};

pub const SIGNATURE_HEADER: &str = "X-Versioner-Signature";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for waiting on delivery before the process exits.
const JOIN_TIMEOUT: Duration = Duration::from_secs(15);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersioningResult {
    pub build_label: String,
    pub artifact_version: String,
    pub git_hash: String,
    pub working_folder: String,
    pub is_mono_repo: bool,
    pub artifacts_versioned: usize,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

/// Lower-case hex HMAC-SHA256 of `payload` keyed with `secret`.
pub fn signature(payload: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid webhook secret: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// POST `result` to `url`. Returns the response status.
pub async fn send(url: &str, token: Option<&str>, result: &VersioningResult) -> Result<u16> {
    let payload = serde_json::to_string(result).context("Failed to serialize webhook payload")?;
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;

    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("User-Agent", "versioner");
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        request = request.header(SIGNATURE_HEADER, signature(&payload, token)?);
    }

    let response = request
        .body(payload)
        .send()
        .await
        .with_context(|| format!("Failed to send webhook to {}", url))?;
    Ok(response.status().as_u16())
}

/// Deliver the notification on a short-lived runtime, waiting at most a
/// bounded time. Never fails.
pub fn dispatch(url: Option<&str>, token: Option<&str>, result: &VersioningResult) {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        debug!("Webhook URL not provided, skipping notification");
        return;
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            warn!(error = %e, "Failed to create runtime for webhook");
            return;
        }
    };
    let outcome = rt.block_on(async {
        let task = tokio::spawn({
            let url = url.to_string();
            let token = token.map(str::to_string);
            let result = result.clone();
            async move { send(&url, token.as_deref(), &result).await }
        });
        tokio::time::timeout(JOIN_TIMEOUT, task).await
    });
    match outcome {
        Ok(Ok(Ok(status))) if (200..300).contains(&status) => {
            info!(%url, status, "Webhook notification sent");
        }
        Ok(Ok(Ok(status))) => warn!(%url, status, "Webhook notification rejected"),
        Ok(Ok(Err(e))) => warn!(%url, error = %format!("{:#}", e), "Webhook notification failed"),
        Ok(Err(e)) => warn!(%url, error = %e, "Webhook task panicked"),
        Err(_) => warn!(%url, "Webhook notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{
        header_exists,
        method,
        path,
    };
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn result() -> VersioningResult {
        VersioningResult {
            build_label: "REV_20251014_0930_abc1234".to_string(),
            artifact_version: "25.10.42".to_string(),
            git_hash: "abc1234".to_string(),
            working_folder: "/repo".to_string(),
            is_mono_repo: true,
            artifacts_versioned: 3,
            timestamp: "2025-10-14T09:30:00Z".to_string(),
        }
    }

    #[test]
    fn test_signature_known_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            signature("what do ya want for nothing?", "Jefe").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_payload_is_camel_case() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!(json["buildLabel"], "REV_20251014_0930_abc1234");
        assert_eq!(json["isMonoRepo"], true);
        assert_eq!(json["artifactsVersioned"], 3);
        assert!(json.get("build_label").is_none());
    }

    #[tokio::test]
    async fn test_send_signs_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let status = send(&format!("{}/hook", server.uri()), Some("secret"), &result())
            .await
            .unwrap();
        assert_eq!(status, 204);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let sent = requests[0]
            .headers
            .get(SIGNATURE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(sent, signature(&body, "secret").unwrap());
    }

    #[tokio::test]
    async fn test_send_without_token_has_no_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        send(&server.uri(), None, &result()).await.unwrap();
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    }

    #[test]
    fn test_dispatch_swallows_failures() {
        dispatch(None, None, &result());
        dispatch(Some("   "), None, &result());
        // Nothing listens on port 9 of localhost; the error is only logged.
        dispatch(Some("http://127.0.0.1:9/hook"), Some("t"), &result());
    }

    #[test]
    fn test_dispatch_delivers() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
            server
        });

        dispatch(Some(&server.uri()), None, &result());

        let requests = rt.block_on(server.received_requests()).unwrap();
        assert_eq!(requests.len(), 1);
    }
}

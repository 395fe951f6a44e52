use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::ConnectorError;
use crate::secret::Secret;

/// Builds a `reqwest::Client` with a default bearer-auth header baked in, so
/// every call site sends it automatically rather than re-attaching it per
/// request. Mirrors the pattern used for outbound service-to-service
/// clients elsewhere in this workspace.
pub fn authed_client(secret: &Secret) -> Result<reqwest::Client, ConnectorError> {
    let mut headers = HeaderMap::new();
    let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", secret.expose()))
        .map_err(|e| ConnectorError::Credential(e.to_string()))?;
    auth_value.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth_value);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .user_agent("sentinel-connectors/0.1")
        .build()
        .map_err(|e| ConnectorError::Config(e.to_string()))
}

/// Maps a non-success HTTP response into the connector error taxonomy:
/// 429 and honored `Retry-After` become `RateLimited`, 5xx is `Transient`
/// (worth retrying), anything else is `Terminal`.
pub async fn map_error_response(response: reqwest::Response) -> ConnectorError {
    let status = response.status();
    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        return ConnectorError::RateLimited { retry_after_secs };
    }
    if status.is_server_error() {
        return ConnectorError::Transient(format!("server error: {status}"));
    }
    let body = response.text().await.unwrap_or_default();
    ConnectorError::Terminal(format!("{status}: {body}"))
}

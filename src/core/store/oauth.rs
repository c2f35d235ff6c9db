use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::core::error::StoreError;

/// Overrides the credentials file with a ready-made bearer token, e.g. the
/// output of `gcloud auth print-access-token`.
pub const ACCESS_TOKEN_ENV: &str = "RANKMON_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    Static {
        access_token: String,
    },
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub async fn load_credentials(path: &Path) -> Result<Credentials, StoreError> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV)
        && !token.trim().is_empty()
    {
        debug!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(Credentials::Static {
            access_token: token.trim().to_string(),
        });
    }

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        StoreError::Connection(format!("cannot read credentials {:?}: {}", path, e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        StoreError::Connection(format!("cannot parse credentials {:?}: {}", path, e))
    })
}

/// Resolves a bearer token, running the refresh-token grant when needed.
pub async fn access_token(
    client: &reqwest::Client,
    credentials: &Credentials,
    default_token_url: &str,
) -> Result<String, StoreError> {
    let (client_id, client_secret, refresh_token, token_uri) = match credentials {
        Credentials::Static { access_token } => return Ok(access_token.clone()),
        Credentials::Refresh {
            client_id,
            client_secret,
            refresh_token,
            token_uri,
        } => (client_id, client_secret, refresh_token, token_uri),
    };
    let token_url = token_uri.as_deref().unwrap_or(default_token_url);

    let params = [
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];

    let response = client
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| StoreError::Connection(format!("token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StoreError::Connection(format!("failed to read token response: {}", e)))?;

    if !status.is_success() {
        return Err(StoreError::Connection(format!(
            "token refresh failed (HTTP {}): {}",
            status, body
        )));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| StoreError::Connection(format!("failed to parse token response: {}", e)))?;

    if let Some(error) = token.error {
        let desc = token.error_description.unwrap_or_default();
        return Err(StoreError::Connection(format!(
            "OAuth error: {} - {}",
            error, desc
        )));
    }

    let access = token
        .access_token
        .ok_or_else(|| StoreError::Connection("no access_token in token response".to_string()))?;
    info!(
        "Obtained store access token (expires in {}s)",
        token.expires_in.unwrap_or_default()
    );
    Ok(access)
}

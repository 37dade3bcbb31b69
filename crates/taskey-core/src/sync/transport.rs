//! HTTP transport for the workspace sync protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{
    FullSyncResponse, HeartbeatResponse, JoinRequest, JoinResponse, PullResponse, PushRequest,
    PushResponse, ValidateKeyRequest, ValidateKeyResponse,
};
use super::{SyncError, SyncResult};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Join key sent when only probing whether a server answers
const PROBE_JOIN_KEY: &str = "TEST-TEST";

/// Request/response calls against a sync server.
///
/// Every call takes the server base URL so one transport can serve any
/// number of connections.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn validate_key(&self, server_url: &str, join_key: &str)
        -> SyncResult<ValidateKeyResponse>;

    async fn join(&self, server_url: &str, request: &JoinRequest) -> SyncResult<JoinResponse>;

    async fn push(&self, server_url: &str, request: &PushRequest) -> SyncResult<PushResponse>;

    async fn pull(
        &self,
        server_url: &str,
        client_id: &str,
        since_version: i64,
    ) -> SyncResult<PullResponse>;

    async fn full_sync(&self, server_url: &str, client_id: &str) -> SyncResult<FullSyncResponse>;

    async fn heartbeat(&self, server_url: &str, client_id: &str)
        -> SyncResult<HeartbeatResponse>;

    /// Whether the server answers at all; any status below 500 counts
    async fn test_connection(&self, server_url: &str) -> bool;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientRequest<'a> {
    client_id: &'a str,
}

/// `reqwest`-backed transport
#[derive(Clone)]
pub struct HttpSyncClient {
    client: reqwest::Client,
}

impl HttpSyncClient {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("taskey/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    async fn post_json<B, R>(&self, server_url: &str, path: &str, body: &B) -> SyncResult<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = endpoint(server_url, path)?;
        tracing::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl SyncTransport for HttpSyncClient {
    async fn validate_key(
        &self,
        server_url: &str,
        join_key: &str,
    ) -> SyncResult<ValidateKeyResponse> {
        let request = ValidateKeyRequest {
            join_key: join_key.to_string(),
        };
        self.post_json(server_url, "/api/validate-key", &request)
            .await
    }

    async fn join(&self, server_url: &str, request: &JoinRequest) -> SyncResult<JoinResponse> {
        self.post_json(server_url, "/api/join", request).await
    }

    async fn push(&self, server_url: &str, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_json(server_url, "/api/sync/push", request).await
    }

    async fn pull(
        &self,
        server_url: &str,
        client_id: &str,
        since_version: i64,
    ) -> SyncResult<PullResponse> {
        let url = endpoint(server_url, "/api/sync/pull")?;
        tracing::debug!("GET {url} since version {since_version}");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("clientId", client_id.to_string()),
                ("sinceVersion", since_version.to_string()),
            ])
            .send()
            .await?;
        read_json(response).await
    }

    async fn full_sync(&self, server_url: &str, client_id: &str) -> SyncResult<FullSyncResponse> {
        self.post_json(server_url, "/api/sync/full", &ClientRequest { client_id })
            .await
    }

    async fn heartbeat(
        &self,
        server_url: &str,
        client_id: &str,
    ) -> SyncResult<HeartbeatResponse> {
        self.post_json(server_url, "/api/sync/heartbeat", &ClientRequest { client_id })
            .await
    }

    async fn test_connection(&self, server_url: &str) -> bool {
        let Ok(url) = endpoint(server_url, "/api/validate-key") else {
            return false;
        };
        let request = ValidateKeyRequest {
            join_key: PROBE_JOIN_KEY.to_string(),
        };
        match self.client.post(&url).json(&request).send().await {
            Ok(response) => response.status().as_u16() < 500,
            Err(error) => {
                tracing::debug!("Server probe to {url} failed: {error}");
                false
            }
        }
    }
}

async fn read_json<R: DeserializeOwned>(response: Response) -> SyncResult<R> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Api {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        });
    }
    Ok(response.json::<R>().await?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Validate a server base URL and strip trailing slashes.
pub fn normalize_server_url(raw: &str) -> SyncResult<String> {
    let url = normalize_text_option(Some(raw.to_string())).ok_or_else(|| {
        SyncError::InvalidConfiguration("server URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "server URL must include http:// or https://".to_string(),
        ))
    }
}

fn endpoint(server_url: &str, path: &str) -> SyncResult<String> {
    Ok(format!("{}{path}", normalize_server_url(server_url)?))
}

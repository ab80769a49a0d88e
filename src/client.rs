//! HTTP client for the timer server's REST endpoints.
//!
//! One typed method per endpoint, no retries: the server is an external
//! collaborator, and every caller treats a failed call as a logged,
//! abandoned operation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A discovered (not necessarily connected) timer device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Per-device connection state from `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub devices: Vec<DeviceStatus>,
}

/// Response of `POST /connect`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Response of `POST /disconnect`.
#[derive(Debug, Clone, Deserialize)]
pub struct DisconnectResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// One recorded session as listed by `GET /sessions`. A read-only projection
/// computed server-side from the export file, never derived from live state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionSummary {
    /// The server sends this as a number or as the export's filename stem;
    /// both are accepted.
    #[serde(deserialize_with = "de_sess_id")]
    pub sess_id: u64,
    #[serde(default)]
    pub total_shots: u32,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub best_split: f64,
    /// First-to-last-shot span, seconds.
    #[serde(default)]
    pub duration: f64,
}

/// Response of `POST /clear_sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearSessionsResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub archived: u64,
    #[serde(default)]
    pub archive_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct SessionsEnvelope {
    #[serde(default)]
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct TitleEnvelope {
    #[serde(default)]
    title: String,
}

#[derive(Serialize)]
struct ConnectBody<'a> {
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct AddressBody<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct TitleBody<'a> {
    title: &'a str,
}

/// Errors from talking to the timer server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to timer server at {addr} — is the server running?")]
    Unreachable { addr: String },

    #[error("request to timer server at {addr} timed out")]
    TimedOut { addr: String },

    #[error("server returned status {status} for {path}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
    },

    #[error("invalid response body for {path}: {source}")]
    Body {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Typed client for one timer server.
#[derive(Debug, Clone)]
pub struct ServerClient {
    base: String,
    http: reqwest::Client,
}

impl ServerClient {
    /// Build a client for `server`, which is either `host:port` or a full
    /// `http(s)://` URL.
    pub fn new(server: &str) -> Result<Self, ClientError> {
        let base = normalize_base(server);
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { base, http })
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:8000`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The WebSocket endpoint for this server.
    pub fn ws_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", self.base)
        };
        format!("{}/ws", ws_base)
    }

    /// `GET /devices`: scan for nearby timers.
    pub async fn devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        let env: DevicesEnvelope = self.get_json("/devices").await?;
        Ok(env.devices)
    }

    /// `GET /status`: current connection state.
    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        self.get_json("/status").await
    }

    /// `POST /connect`: take ownership of a device.
    pub async fn connect_device(
        &self,
        address: &str,
        name: Option<&str>,
    ) -> Result<ConnectResponse, ClientError> {
        self.post_json("/connect", &ConnectBody { address, name })
            .await
    }

    /// `POST /disconnect`: release a device.
    pub async fn disconnect_device(
        &self,
        address: &str,
    ) -> Result<DisconnectResponse, ClientError> {
        self.post_json("/disconnect", &AddressBody { address }).await
    }

    /// `GET /sessions?offset&limit`: one page of recorded sessions, in
    /// server order.
    pub async fn sessions(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, ClientError> {
        let path = format!("/sessions?offset={}&limit={}", offset, limit);
        let env: SessionsEnvelope = self.get_json(&path).await?;
        Ok(env.sessions)
    }

    /// `GET /download/{sess_id}`: the raw line-oriented session export.
    pub async fn download(&self, sess_id: u64) -> Result<String, ClientError> {
        let path = format!("/download/{}", sess_id);
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !resp.status().is_success() {
            return Err(ClientError::Status {
                status: resp.status(),
                path,
            });
        }
        resp.text().await.map_err(|e| ClientError::Body {
            path,
            source: e,
        })
    }

    /// `GET /get_title`: the current competition title.
    pub async fn title(&self) -> Result<String, ClientError> {
        let env: TitleEnvelope = self.get_json("/get_title").await?;
        Ok(env.title)
    }

    /// `POST /set_title`: set and broadcast a new title.
    pub async fn set_title(&self, title: &str) -> Result<(), ClientError> {
        let _: TitleEnvelope = self.post_json("/set_title", &TitleBody { title }).await?;
        Ok(())
    }

    /// `POST /clear_sessions`: archive all recorded sessions server-side.
    pub async fn clear_sessions(&self) -> Result<ClearSessionsResponse, ClientError> {
        self.post_json("/clear_sessions", &serde_json::json!({}))
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.parse_json(path, resp).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.parse_json(path, resp).await
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !resp.status().is_success() {
            return Err(ClientError::Status {
                status: resp.status(),
                path: path.to_string(),
            });
        }
        resp.json().await.map_err(|e| ClientError::Body {
            path: path.to_string(),
            source: e,
        })
    }

    /// Map transport-level failures to human-friendly errors.
    fn transport_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::Unreachable {
                addr: self.base.clone(),
            }
        } else if e.is_timeout() {
            ClientError::TimedOut {
                addr: self.base.clone(),
            }
        } else {
            ClientError::Http(e)
        }
    }
}

fn normalize_base(server: &str) -> String {
    let base = if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{}", server)
    };
    base.trim_end_matches('/').to_string()
}

/// Accept `sess_id` as either a JSON number or a filename-stem string.
fn de_sess_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n,
        Raw::Str(s) => s.trim().parse().unwrap_or(0),
    })
}

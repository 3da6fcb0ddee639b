use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::error::SourceError;

/// Minimal async session used by the photo library.
///
/// How the session was authenticated is not this crate's concern; it only
/// needs to issue requests that the service will accept.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, SourceError>;

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError>;
}

/// On-disk description of an already-authenticated session.
///
/// ```json
/// {
///   "service_endpoint": "https://p00-ckdatabasews.icloud.com:443/database/1/com.apple.photos.cloud/production/private",
///   "params": {"dsid": "123", "clientBuildNumber": "2522Project44"},
///   "headers": {"Cookie": "X-APPLE-WEBAUTH-TOKEN=..."}
/// }
/// ```
#[derive(Deserialize)]
pub struct SessionFile {
    pub service_endpoint: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for SessionFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&String> = self.headers.keys().collect();
        f.debug_struct("SessionFile")
            .field("service_endpoint", &self.service_endpoint)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("headers", &header_names)
            .finish()
    }
}

impl SessionFile {
    /// Read a session file. A missing or unparsable file means there is no
    /// usable session, which is reported as an authentication failure.
    pub async fn load(path: &Path) -> Result<Self, SourceError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            SourceError::Authentication(format!(
                "cannot read session file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            SourceError::Authentication(format!(
                "invalid session file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// `reqwest`-backed session carrying the persisted auth headers on every
/// request.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn new(file: &SessionFile, timeout: Duration) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &file.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                SourceError::Authentication(format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                SourceError::Authentication(format!("invalid value for header {name}: {e}"))
            })?;
            headers.insert(name, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .read_timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http {
                url: file.service_endpoint.clone(),
                source: e,
            })?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Session for HttpSession {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, SourceError> {
        let response = self
            .client
            .post(url)
            .header("Content-type", "text/plain")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| SourceError::Http {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status.as_u16(), url));
        }
        let text = response.text().await.map_err(|e| SourceError::Http {
            url: url.to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| SourceError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| SourceError::Http {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status.as_u16(), url));
        }
        Ok(response)
    }
}

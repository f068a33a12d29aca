//! HTTP implementation of [`RemoteApi`].
//!
//! Uses `reqwest` on a private tokio runtime so callers stay synchronous.
//! Authentication is the OAuth2 client-credentials grant: `API_KEY` is the
//! client id and `API_SECRET` the client secret.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Runtime;

use super::{ApiError, ObservedObject, RemoteApi, Result};
use crate::model::{Fields, RemoteHandle};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum retry attempts for a single request.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff, in seconds.
const RETRY_BASE_DELAY_SECS: u64 = 2;

const PAGE_SIZE: usize = 1000;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

const MAX_ERROR_BODY_LENGTH: usize = 200;

pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "Results", default)]
    results: Option<Vec<Value>>,
}

pub struct HttpRemote {
    client: Client,
    runtime: Runtime,
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
    retry_base_delay: Duration,
}

impl HttpRemote {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {}", e)))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to start runtime: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            base_url: endpoint.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
            retry_base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
        })
    }

    fn collection_url(&self, object_type: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, collection_path(object_type))
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting access token from {}", self.base_url);
        let response = self
            .client
            .post(format!("{}/iam/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                (
                    "client_secret",
                    self.credentials.client_secret.expose_secret(),
                ),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::new(
                status.as_u16(),
                format!("Token request failed: {}", truncate(&body)),
            ));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to parse token: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let cached = CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        };
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(cached);
        Ok(token.access_token)
    }

    fn forget_token(&self) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_token();
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::new(status.as_u16(), error_message(&body)));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await.map_err(transport_error)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::new(status.as_u16(), format!("Invalid JSON response: {}", e)))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        idempotent: bool,
    ) -> Result<Value> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                info!(
                    "Retrying {} {} (attempt {}/{}) after {:?}",
                    method, url, attempt, MAX_RETRIES, delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(method.clone(), url, query, body).await {
                Ok(value) => return Ok(value),
                Err(e) if may_retry(idempotent, &e) && attempt < MAX_RETRIES => {
                    warn!("{} {} failed: {}", method, url, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::transport("request was never sent")))
    }

    async fn list_all(&self, object_type: &str) -> Result<Vec<ObservedObject>> {
        let url = self.collection_url(object_type);
        let mut objects = Vec::new();
        let mut skip = 0usize;

        loop {
            let query = [
                ("$top", PAGE_SIZE.to_string()),
                ("$skip", skip.to_string()),
            ];
            let page = self.send(Method::GET, &url, &query, None, true).await?;
            let page: ListResponse = serde_json::from_value(page)
                .map_err(|e| ApiError::new(200, format!("Unexpected list response: {}", e)))?;
            let results = page.results.unwrap_or_default();
            let count = results.len();
            for item in results {
                objects.push(ObservedObject::from_json(item)?);
            }
            if count < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        debug!("Listed {} objects of type {}", objects.len(), object_type);
        Ok(objects)
    }
}

impl RemoteApi for HttpRemote {
    fn list_objects(&self, object_type: &str) -> Result<Vec<ObservedObject>> {
        self.runtime.block_on(self.list_all(object_type))
    }

    fn create_object(&self, object_type: &str, fields: &Fields) -> Result<RemoteHandle> {
        let url = self.collection_url(object_type);
        let body = Value::Object(fields.clone());
        let created = self
            .runtime
            .block_on(self.send(Method::POST, &url, &[], Some(&body), false))?;
        created
            .get("Moid")
            .and_then(Value::as_str)
            .map(RemoteHandle::new)
            .ok_or_else(|| ApiError::new(200, "create response carries no Moid"))
    }

    fn update_object(
        &self,
        object_type: &str,
        handle: &RemoteHandle,
        fields: &Fields,
    ) -> Result<()> {
        let url = format!("{}/{}", self.collection_url(object_type), handle);
        let body = Value::Object(fields.clone());
        self.runtime
            .block_on(self.send(Method::POST, &url, &[], Some(&body), true))
            .map(|_| ())
    }

    fn delete_object(&self, object_type: &str, handle: &RemoteHandle) -> Result<()> {
        let url = format!("{}/{}", self.collection_url(object_type), handle);
        self.runtime
            .block_on(self.send(Method::DELETE, &url, &[], None, true))
            .map(|_| ())
    }
}

/// A create is only repeated when the backend refused it outright. After a
/// dropped connection or a server error the object may already exist.
fn may_retry(idempotent: bool, error: &ApiError) -> bool {
    if idempotent {
        error.is_retryable()
    } else {
        error.status == 429
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    match e.status() {
        Some(status) => ApiError::new(status.as_u16(), e.to_string()),
        None => ApiError::transport(e.to_string()),
    }
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// Extracts the backend's `message` from an error body when present.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate(body))
}

/// REST collection path of an object type: `bios.Policy` → `bios/Policies`.
pub fn collection_path(object_type: &str) -> String {
    match object_type.split_once('.') {
        Some((package, kind)) => format!("{}/{}", package, pluralize(kind)),
        None => pluralize(object_type),
    }
}

fn pluralize(word: &str) -> String {
    let consonant_y = word.ends_with('y')
        && !word
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| "aeiouAEIOU".contains(c));
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if let Some(stem) = word.strip_suffix("is") {
        format!("{}es", stem)
    } else if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_paths() {
        assert_eq!(collection_path("bios.Policy"), "bios/Policies");
        assert_eq!(collection_path("organization.Organization"), "organization/Organizations");
        assert_eq!(collection_path("vnic.EthIf"), "vnic/EthIfs");
        assert_eq!(collection_path("equipment.Chassis"), "equipment/Chasses");
        assert_eq!(collection_path("server.ProfileTemplate"), "server/ProfileTemplates");
        assert_eq!(collection_path("fabric.SwitchClusterProfile"), "fabric/SwitchClusterProfiles");
    }

    #[test]
    fn test_error_message_prefers_backend_message() {
        assert_eq!(
            error_message(r#"{"code":"InvalidRequest","message":"Name already in use"}"#),
            "Name already in use"
        );
        assert_eq!(error_message("plain failure"), "plain failure");
        assert!(error_message(&"x".repeat(500)).ends_with("(truncated)"));
    }

    #[test]
    fn test_creates_are_not_repeated_after_ambiguous_failures() {
        let dropped = ApiError::transport("connection reset");
        let server = ApiError::new(502, "bad gateway");
        let throttled = ApiError::new(429, "slow down");
        let conflict = ApiError::new(409, "already exists");

        assert!(!may_retry(false, &dropped));
        assert!(!may_retry(false, &server));
        assert!(may_retry(false, &throttled));
        assert!(!may_retry(false, &conflict));

        assert!(may_retry(true, &dropped));
        assert!(may_retry(true, &server));
        assert!(may_retry(true, &throttled));
        assert!(!may_retry(true, &conflict));
    }

    #[test]
    fn test_unreachable_endpoint_is_a_transport_error() {
        let mut remote = HttpRemote::new(
            "http://127.0.0.1:9",
            Credentials {
                client_id: "id".to_string(),
                client_secret: SecretString::from("secret".to_string()),
            },
        )
        .unwrap();
        remote.retry_base_delay = Duration::from_millis(1);
        let err = remote.list_objects("ntp.Policy").unwrap_err();
        assert_eq!(err.status, 0);
    }
}

//! HTTP transport: bearer-token authentication and JSON request plumbing

use reqwest::header::{ACCEPT, LOCATION};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use stratus_core::{Error, Result};

/// Connection settings for one provisioning service endpoint
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service origin, e.g. `https://vra.example.com`
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub tenant: String,
    /// Skip TLS certificate verification. Only for lab appliances with
    /// self-signed certificates.
    pub insecure: bool,
}

/// REST client for the provisioning service.
///
/// Authentication is lazy: the first request obtains a bearer token and
/// caches it for the lifetime of the client. The service invalidates tokens
/// after a fixed window, at which point a fresh client must be built.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    tenant: String,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
    tenant: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    id: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
            username: config.username,
            password: config.password,
            tenant: config.tenant,
            token: RwLock::new(None),
        })
    }

    /// Obtain and cache a bearer token for the configured tenant
    pub async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/identity/api/tokens", self.base_url);
        let body = TokenRequest {
            username: &self.username,
            password: &self.password,
            tenant: &self.tenant,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::api(format!("token request failed: {e}")))?;
        let response = expect_success("POST", "/identity/api/tokens", response).await?;
        let token: TokenResponse = decode(response, "/identity/api/tokens").await?;

        info!(tenant = %self.tenant, "authenticated against the provisioning service");
        *self.token.write().await = Some(token.id.clone());
        Ok(token.id)
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.bearer().await?;
        debug!(path, "GET");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::api(format!("GET {path}: {e}")))?;
        let response = expect_success("GET", path, response).await?;
        decode(response, path).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.post(path, body).await?;
        decode(response, path).await
    }

    /// POST and return the `Location` header, which carries the URL of the
    /// asynchronous request the service created
    pub(crate) async fn post_for_location<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String> {
        let response = self.post(path, body).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::api(format!("POST {path}: response carries no Location header")))
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let token = self.bearer().await?;
        debug!(path, "POST");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::api(format!("POST {path}: {e}")))?;
        expect_success("POST", path, response).await
    }
}

async fn expect_success(
    method: &str,
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::api(format!("{method} {path} returned {status}: {body}")))
}

// Bodies are read as text first so decode failures surface as decode errors
// with the serde message, not as transport errors.
async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| Error::api(format!("failed to read response body for {path}: {e}")))?;
    Ok(serde_json::from_str(&body)?)
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

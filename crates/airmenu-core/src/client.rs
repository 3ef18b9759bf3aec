//! HTTP client for the Airthings consumer API.
//!
//! Authenticates with the OAuth2 client-credentials grant and caches the
//! bearer token until shortly before it expires.
//!
//! # Example
//!
//! ```no_run
//! use airmenu_core::client::{AirthingsClient, Endpoints};
//! use airmenu_core::{Credentials, DataSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AirthingsClient::new(
//!     Credentials::new("client-id", "client-secret"),
//!     Endpoints::default(),
//! )?;
//!
//! for device in client.list_devices().await? {
//!     let reading = client.latest_reading(&device.id).await?;
//!     println!("{}: {} ppm", device.product_name, reading.co2);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use airmenu_types::{Device, Reading};

use crate::error::{Error, Result};
use crate::traits::{ClientFactory, ClientHandle, Credentials, DataSource};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://ext-api.airthings.com/v1";

/// Default OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts-api.airthings.com/v1/token";

/// A token is refreshed this long before it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;

/// Where the API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
    token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Both URLs must be http(s); trailing slashes are dropped.
    pub fn new(base_url: &str, token_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_url(base_url)?,
            token_url: normalize_url(token_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim_end_matches('/');
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            url
        )));
    }
    Ok(url.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME
}

#[derive(Debug, Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct SamplesEnvelope {
    data: Option<Reading>,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Airthings API client for one set of credentials.
#[derive(Debug)]
pub struct AirthingsClient {
    http: Client,
    credentials: Credentials,
    endpoints: Endpoints,
    token: Mutex<Option<CachedToken>>,
}

impl AirthingsClient {
    /// Create a client. No request is made until the first fetch.
    pub fn new(credentials: Credentials, endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))?;
        Ok(Self::with_client(http, credentials, endpoints))
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(http: Client, credentials: Credentials, endpoints: Endpoints) -> Self {
        Self {
            http,
            credentials,
            endpoints,
            token: Mutex::new(None),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// A valid bearer token, fetched if missing or about to expire.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting access token for {}", self.credentials.client_id);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Token {
                status: status.as_u16(),
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Authenticated GET; anything but 200 is an error.
    async fn get<T: DeserializeOwned>(&self, endpoint: &'static str, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next call.
            self.token.lock().await.take();
        }
        if status != StatusCode::OK {
            return Err(Error::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DataSource for AirthingsClient {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = format!("{}/devices", self.endpoints.base_url);
        let envelope: DevicesEnvelope = self.get("devices", &url).await?;
        Ok(envelope.devices)
    }

    async fn latest_reading(&self, device_id: &str) -> Result<Reading> {
        let url = format!(
            "{}/devices/{}/latest-samples",
            self.endpoints.base_url, device_id
        );
        let envelope: SamplesEnvelope = self.get("latest-samples", &url).await?;
        envelope.data.ok_or_else(|| Error::InvalidResponse {
            endpoint: "latest-samples",
            message: "missing data".to_string(),
        })
    }
}

/// Builds an [`AirthingsClient`] per credential set.
#[derive(Debug, Clone, Default)]
pub struct AirthingsClientFactory {
    endpoints: Endpoints,
}

impl AirthingsClientFactory {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

impl ClientFactory for AirthingsClientFactory {
    fn create(&self, credentials: &Credentials) -> Result<ClientHandle> {
        let client = AirthingsClient::new(credentials.clone(), self.endpoints.clone())?;
        Ok(Arc::new(client))
    }
}

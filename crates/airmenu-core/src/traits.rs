//! Trait abstractions for the engine's collaborators.
//!
//! The engine never talks to the network, the disk or the user directly.
//! Each of those is behind one of these traits so that the HTTP client, the
//! settings file and the interactive prompt can be swapped for the mocks in
//! [`crate::mock`] under test.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use airmenu_types::{Device, Reading};

use crate::error::Result;

/// A remote source of devices and readings.
///
/// Calls are independent of each other; the only session state is whatever
/// the implementation derives from its credentials (for the HTTP client, a
/// cached bearer token).
///
/// # Example
///
/// ```ignore
/// use airmenu_core::{DataSource, Result};
///
/// async fn first_co2<D: DataSource + ?Sized>(source: &D) -> Result<f64> {
///     let devices = source.list_devices().await?;
///     let reading = source.latest_reading(&devices[0].id).await?;
///     Ok(reading.co2)
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch every device registered on the account.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Fetch the latest samples for one device.
    async fn latest_reading(&self, device_id: &str) -> Result<Reading>;
}

/// Shared handle to the live data source.
pub type ClientHandle = Arc<dyn DataSource>;

/// A client id and secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Builds a data source from credentials.
pub trait ClientFactory: Send + Sync {
    fn create(&self, credentials: &Credentials) -> Result<ClientHandle>;
}

/// Keys understood by a [`SettingsStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ClientId,
    ClientSecret,
    /// Name of the metric focused in the title, empty for none.
    SelectedMetric,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::ClientId => "client-id",
            SettingKey::ClientSecret => "client-secret",
            SettingKey::SelectedMetric => "selected-sensor",
        }
    }
}

/// Simple string key/value persistence.
///
/// No atomicity is required across keys; credentials are only written from
/// the client lifecycle manager.
pub trait SettingsStore: Send + Sync {
    /// Stored value, `None` when never set.
    fn get(&self, key: SettingKey) -> Option<String>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: SettingKey, value: &str) -> Result<()>;
}

/// Answer from a [`CredentialPrompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user confirmed; one string per requested field, untrimmed.
    Confirmed([String; 2]),
    /// The user dismissed the prompt.
    Cancelled,
}

/// Interactive prompt asking the user for two values.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn prompt(&self, message: &str, fields: [&str; 2]) -> PromptOutcome;
}

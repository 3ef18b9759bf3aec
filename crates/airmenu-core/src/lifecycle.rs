//! Client lifecycle management.
//!
//! [`ClientLifecycle::ensure_client`] is the only place credentials change.
//! It collects them (from the settings store or the user), builds a new
//! data source and installs it with a single exclusive mutation that also
//! clears everything derived from the previous client, so no reader ever
//! sees a new client next to a stale reading.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state::StateStore;
use crate::traits::{
    ClientFactory, CredentialPrompt, Credentials, PromptOutcome, SettingKey, SettingsStore,
};

/// Message shown when asking for credentials.
pub const PROMPT_MESSAGE: &str = "Please input the Airthings API client ID and secret";

/// Labels of the two prompt fields.
pub const PROMPT_FIELDS: [&str; 2] = ["Client ID", "Client secret"];

/// What [`ClientLifecycle::ensure_client`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// A client is already live and no new one was requested.
    Unchanged,
    /// A new client was installed.
    Installed,
    /// The user dismissed the prompt; state is untouched.
    Cancelled,
}

/// Validates credentials and swaps the live client.
pub struct ClientLifecycle {
    state: Arc<StateStore>,
    settings: Arc<dyn SettingsStore>,
    prompt: Arc<dyn CredentialPrompt>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientLifecycle {
    pub fn new(
        state: Arc<StateStore>,
        settings: Arc<dyn SettingsStore>,
        prompt: Arc<dyn CredentialPrompt>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            state,
            settings,
            prompt,
            factory,
        }
    }

    /// Make sure a client is installed.
    ///
    /// Without `force_new`, stored credentials are used when both halves are
    /// present, and nothing happens if a client is already live. Otherwise
    /// the user is prompted until they enter two non-empty values or cancel.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built. Failing to persist
    /// the credentials is logged and does not prevent installation.
    pub async fn ensure_client(&self, force_new: bool) -> Result<ClientOutcome> {
        let stored = self.stored_credentials();

        let credentials = if !force_new && stored.is_complete() {
            if self.state.read(|s| s.has_client()).await {
                return Ok(ClientOutcome::Unchanged);
            }
            debug!("Using stored credentials for {}", stored.client_id);
            stored
        } else {
            match self.collect_credentials().await {
                Some(credentials) => credentials,
                None => {
                    info!("Credential prompt cancelled, keeping current client");
                    return Ok(ClientOutcome::Cancelled);
                }
            }
        };

        let client = self.factory.create(&credentials)?;
        self.persist(&credentials);
        self.state.clear_for_new_client(client).await;

        info!("Installed client for {}", credentials.client_id);
        Ok(ClientOutcome::Installed)
    }

    fn stored_credentials(&self) -> Credentials {
        Credentials::new(
            self.settings.get(SettingKey::ClientId).unwrap_or_default(),
            self.settings.get(SettingKey::ClientSecret).unwrap_or_default(),
        )
    }

    /// Prompt until both values are non-empty after trimming.
    async fn collect_credentials(&self) -> Option<Credentials> {
        loop {
            match self.prompt.prompt(PROMPT_MESSAGE, PROMPT_FIELDS).await {
                PromptOutcome::Confirmed([client_id, client_secret]) => {
                    let credentials =
                        Credentials::new(client_id.trim(), client_secret.trim());
                    if credentials.is_complete() {
                        return Some(credentials);
                    }
                    debug!("Empty client id or secret, prompting again");
                }
                PromptOutcome::Cancelled => return None,
            }
        }
    }

    fn persist(&self, credentials: &Credentials) {
        let writes = [
            (SettingKey::ClientId, &credentials.client_id),
            (SettingKey::ClientSecret, &credentials.client_secret),
        ];
        for (key, value) in writes {
            if let Err(e) = self.settings.set(key, value) {
                warn!("Failed to persist {}: {}", key.as_str(), e);
            }
        }
    }
}

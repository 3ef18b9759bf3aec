//! Terminal credential prompt.

use std::io::{self, IsTerminal};

use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use tracing::warn;

use airmenu_core::{CredentialPrompt, PromptOutcome};

/// Asks for credentials on the terminal.
///
/// Declining the confirmation (or pressing Esc) cancels. Without a terminal
/// on stdin every prompt is cancelled.
#[derive(Debug, Default)]
pub struct DialoguerPrompt;

impl DialoguerPrompt {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialPrompt for DialoguerPrompt {
    async fn prompt(&self, message: &str, fields: [&str; 2]) -> PromptOutcome {
        if !io::stdin().is_terminal() {
            warn!("stdin is not a terminal, cannot ask for credentials");
            return PromptOutcome::Cancelled;
        }

        let message = message.to_string();
        let fields = fields.map(String::from);
        match tokio::task::spawn_blocking(move || ask(&message, &fields)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("Credential prompt failed: {}", e);
                PromptOutcome::Cancelled
            }
            Err(e) => {
                warn!("Credential prompt task failed: {}", e);
                PromptOutcome::Cancelled
            }
        }
    }
}

fn ask(message: &str, fields: &[String; 2]) -> dialoguer::Result<PromptOutcome> {
    let theme = ColorfulTheme::default();

    let proceed = Confirm::with_theme(&theme)
        .with_prompt(message)
        .default(true)
        .interact_opt()?;
    if proceed != Some(true) {
        return Ok(PromptOutcome::Cancelled);
    }

    // Empty answers are passed through; the caller decides whether to ask again.
    let client_id: String = Input::with_theme(&theme)
        .with_prompt(&fields[0])
        .allow_empty(true)
        .interact_text()?;
    let client_secret = Password::with_theme(&theme)
        .with_prompt(&fields[1])
        .allow_empty_password(true)
        .interact()?;

    Ok(PromptOutcome::Confirmed([client_id, client_secret]))
}

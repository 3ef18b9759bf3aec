//! Polling and state-synchronization engine for Airthings menu bar apps.
//!
//! This crate keeps the latest reading of one Airthings device in a shared
//! state object that is written by a background poller and by user
//! actions, and derives a menu bar title and menu from it.
//!
//! # Features
//!
//! - **Background polling**: every 5 minutes, 60 s backoff after failures
//! - **Device selection**: first device picked automatically, switchable
//! - **Focused metric**: one metric shown compactly in the title
//! - **Credential reset**: swaps the API client atomically
//! - **Change notification**: a `watch` channel bumped after every mutation
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`StateStore`] | the shared state behind one reader/writer lock |
//! | [`Poller`] | fetches devices and readings under the exclusive lock |
//! | [`ClientLifecycle`] | collects credentials and installs a new client |
//! | [`projection`] | pure title and menu derivation |
//! | [`AirMenu`] | ties the above together for a host UI |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use airmenu_core::client::{AirthingsClientFactory, Endpoints};
//! use airmenu_core::mock::{MemorySettingsStore, MockPrompt};
//! use airmenu_core::{AirMenu, MenuAction, MetricKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AirMenu::new(
//!         Arc::new(MemorySettingsStore::new().with_credentials("id", "secret")),
//!         Arc::new(MockPrompt::new()),
//!         Arc::new(AirthingsClientFactory::new(Endpoints::default())),
//!     );
//!     engine.start().await;
//!     engine.ensure_client().await?;
//!     engine.activate(MenuAction::ToggleMetric(MetricKey::Co2)).await;
//!
//!     let mut changes = engine.subscribe();
//!     changes.changed().await?;
//!     println!("{}", engine.title().await);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod poller;
pub mod projection;
pub mod state;
pub mod traits;

pub use engine::AirMenu;
pub use error::{Error, PollError, Result};
pub use lifecycle::{ClientLifecycle, ClientOutcome};
pub use poller::{CycleOutcome, PollMode, Poller};
pub use projection::{MenuAction, MenuEntry};
pub use state::{AppState, StateStore};
pub use traits::{
    ClientFactory, ClientHandle, CredentialPrompt, Credentials, DataSource, PromptOutcome,
    SettingKey, SettingsStore,
};

// Re-export from airmenu-types
pub use airmenu_types::{Device, MetricKey, ParseError, Reading};

//! The engine a menu bar host drives.
//!
//! [`AirMenu`] owns the shared [`StateStore`] and the collaborators, runs
//! the background poller and turns [`MenuAction`]s into state changes.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use airmenu_core::AirMenu;
//! use airmenu_core::client::AirthingsClientFactory;
//! use airmenu_core::mock::{MemorySettingsStore, MockPrompt};
//!
//! # async fn example() -> airmenu_core::Result<()> {
//! let engine = AirMenu::new(
//!     Arc::new(MemorySettingsStore::new().with_credentials("id", "secret")),
//!     Arc::new(MockPrompt::new()),
//!     Arc::new(AirthingsClientFactory::default()),
//! );
//! engine.start().await;
//! engine.ensure_client().await?;
//!
//! let mut changes = engine.subscribe();
//! while changes.changed().await.is_ok() {
//!     println!("{}", engine.title().await);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use airmenu_types::MetricKey;

use crate::error::Result;
use crate::lifecycle::{ClientLifecycle, ClientOutcome};
use crate::poller::{PollMode, Poller};
use crate::projection::{self, MenuAction, MenuEntry};
use crate::state::StateStore;
use crate::traits::{ClientFactory, CredentialPrompt, SettingKey, SettingsStore};

/// Polling engine plus the operations a host UI needs.
pub struct AirMenu {
    state: Arc<StateStore>,
    lifecycle: Arc<ClientLifecycle>,
    settings: Arc<dyn SettingsStore>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl AirMenu {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        prompt: Arc<dyn CredentialPrompt>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let state = Arc::new(StateStore::new());
        let lifecycle = Arc::new(ClientLifecycle::new(
            Arc::clone(&state),
            Arc::clone(&settings),
            prompt,
            factory,
        ));
        Self {
            state,
            lifecycle,
            settings,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// The shared state, for hosts that render it themselves.
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Restore the focused metric and start the recurring poller.
    ///
    /// Only the first call has any effect. The poller idles until a client
    /// is installed.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("AirMenu already started");
            return;
        }

        let focused = self.stored_metric();
        if focused.is_some() {
            self.state.set_focused_metric(focused).await;
        }

        let poller = Poller::with_cancellation(Arc::clone(&self.state), self.cancel.child_token());
        self.tasks
            .spawn(async move { poller.run(PollMode::Recurring).await });
        info!("AirMenu started");
    }

    fn stored_metric(&self) -> Option<MetricKey> {
        let stored = self.settings.get(SettingKey::SelectedMetric)?;
        if stored.is_empty() {
            return None;
        }
        match stored.parse() {
            Ok(metric) => Some(metric),
            Err(e) => {
                warn!("Ignoring stored focus: {}", e);
                None
            }
        }
    }

    /// Install a client from stored credentials, prompting if they are
    /// incomplete.
    pub async fn ensure_client(&self) -> Result<ClientOutcome> {
        self.lifecycle.ensure_client(false).await
    }

    /// Prompt for new credentials, then poll once in the background.
    ///
    /// The poll runs whatever the prompt outcome, so a cancelled reset
    /// still refreshes the current client's data.
    pub async fn reset_credentials(&self) -> Result<ClientOutcome> {
        let outcome = self.lifecycle.ensure_client(true).await;
        self.spawn_one_shot_poll();
        outcome
    }

    fn spawn_one_shot_poll(&self) {
        let poller = Poller::with_cancellation(Arc::clone(&self.state), self.cancel.child_token());
        self.tasks.spawn(async move { poller.poll_once().await });
    }

    pub async fn title(&self) -> String {
        self.state.read(projection::title).await
    }

    pub async fn menu(&self) -> Vec<MenuEntry> {
        let now = OffsetDateTime::now_utc();
        self.state
            .read(|state| projection::menu_entries(state, now))
            .await
    }

    /// Apply a menu activation.
    ///
    /// Selection changes wait for any in-flight fetch. A credential reset
    /// runs on its own task so the caller is not blocked by the prompt.
    pub async fn activate(&self, action: MenuAction) {
        match action {
            MenuAction::ToggleMetric(metric) => self.toggle_metric(metric).await,
            MenuAction::SelectDevice(device_id) => {
                self.state.set_selected_device(device_id).await;
            }
            MenuAction::ResetCredentials => {
                let lifecycle = Arc::clone(&self.lifecycle);
                let poller =
                    Poller::with_cancellation(Arc::clone(&self.state), self.cancel.child_token());
                let cancel = self.cancel.child_token();
                self.tasks.spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => debug!("Credential reset abandoned"),
                        _ = reset_and_poll(lifecycle, poller) => {}
                    }
                });
            }
        }
    }

    /// Persisted under the lock so the stored value follows the order of
    /// state changes.
    async fn toggle_metric(&self, metric: MetricKey) {
        let mut state = self.state.write().await;
        let next = if state.focused_metric() == Some(metric) {
            None
        } else {
            Some(metric)
        };
        state.set_focused_metric(next);

        let value = next.map(|m| m.as_str()).unwrap_or_default();
        if let Err(e) = self.settings.set(SettingKey::SelectedMetric, value) {
            warn!("Failed to persist focused metric: {}", e);
        }
    }

    /// Notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.subscribe()
    }

    /// Stop background work and wait for it to wind down.
    ///
    /// Fetches already in flight complete first.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("AirMenu stopped");
    }
}

async fn reset_and_poll(lifecycle: Arc<ClientLifecycle>, poller: Poller) {
    match lifecycle.ensure_client(true).await {
        Ok(outcome) => debug!("Credential reset: {:?}", outcome),
        Err(e) => warn!("Credential reset failed: {}", e),
    }
    poller.poll_once().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{
        MemorySettingsStore, MockClientFactory, MockDataSource, MockPrompt, sample_reading,
    };
    use airmenu_types::Reading;

    struct Fixture {
        engine: AirMenu,
        settings: Arc<MemorySettingsStore>,
        factory: Arc<MockClientFactory>,
    }

    fn fixture(settings: MemorySettingsStore, prompt: MockPrompt) -> Fixture {
        let settings = Arc::new(settings);
        let factory = Arc::new(MockClientFactory::new());
        let engine = AirMenu::new(settings.clone(), Arc::new(prompt), factory.clone());
        Fixture {
            engine,
            settings,
            factory,
        }
    }

    fn source_with_co2(co2: f64) -> Arc<MockDataSource> {
        Arc::new(MockDataSource::new().with_reading(Reading {
            co2,
            ..sample_reading()
        }))
    }

    #[tokio::test]
    async fn test_start_restores_focused_metric() {
        let f = fixture(
            MemorySettingsStore::new().with_value(SettingKey::SelectedMetric, "radon"),
            MockPrompt::new(),
        );
        f.engine.start().await;
        assert_eq!(
            f.engine.state().read(|s| s.focused_metric()).await,
            Some(MetricKey::Radon)
        );
        f.engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_ignores_unknown_stored_metric() {
        let f = fixture(
            MemorySettingsStore::new().with_value(SettingKey::SelectedMetric, "ozone"),
            MockPrompt::new(),
        );
        f.engine.start().await;
        assert!(f.engine.state().read(|s| s.focused_metric()).await.is_none());
        f.engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_toggle_metric_persists_focus() {
        let f = fixture(MemorySettingsStore::new(), MockPrompt::new());

        f.engine.activate(MenuAction::ToggleMetric(MetricKey::Co2)).await;
        assert_eq!(
            f.settings.get(SettingKey::SelectedMetric).as_deref(),
            Some("co2")
        );

        f.engine.activate(MenuAction::ToggleMetric(MetricKey::Voc)).await;
        assert_eq!(
            f.engine.state().read(|s| s.focused_metric()).await,
            Some(MetricKey::Voc)
        );

        f.engine.activate(MenuAction::ToggleMetric(MetricKey::Voc)).await;
        assert!(f.engine.state().read(|s| s.focused_metric()).await.is_none());
        assert_eq!(f.settings.get(SettingKey::SelectedMetric).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_toggle_survives_persist_failure() {
        let f = fixture(MemorySettingsStore::new(), MockPrompt::new());
        f.settings.fail_writes(true);

        f.engine.activate(MenuAction::ToggleMetric(MetricKey::Pm25)).await;
        assert_eq!(
            f.engine.state().read(|s| s.focused_metric()).await,
            Some(MetricKey::Pm25)
        );
    }

    #[tokio::test]
    async fn test_select_device() {
        let f = fixture(MemorySettingsStore::new(), MockPrompt::new());
        f.engine
            .activate(MenuAction::SelectDevice("dev-2".to_string()))
            .await;
        assert_eq!(
            f.engine
                .state()
                .read(|s| s.selected_device().map(String::from))
                .await,
            Some("dev-2".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_to_first_title() {
        let f = fixture(
            MemorySettingsStore::new()
                .with_credentials("id", "secret")
                .with_value(SettingKey::SelectedMetric, "co2"),
            MockPrompt::new(),
        );
        f.factory.push(source_with_co2(412.7));

        f.engine.start().await;
        assert_eq!(f.engine.title().await, "");
        assert_eq!(f.engine.ensure_client().await.unwrap(), ClientOutcome::Installed);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.engine.title().await, "CO2: 412 ppm");

        let menu = f.engine.menu().await;
        assert_eq!(menu[0].label, "CO2: 412 ppm");
        assert_eq!(menu[0].selected, Some(true));
        assert_eq!(menu[9].children.len(), 2);

        f.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_action_swaps_client_and_polls() {
        let f = fixture(
            MemorySettingsStore::new()
                .with_credentials("old-id", "old-secret")
                .with_value(SettingKey::SelectedMetric, "co2"),
            MockPrompt::new().confirm("new-id", "new-secret"),
        );
        let old = source_with_co2(500.0);
        let new = source_with_co2(800.0);
        f.factory.push(Arc::clone(&old));
        f.factory.push(Arc::clone(&new));

        f.engine.start().await;
        f.engine.ensure_client().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.engine.title().await, "CO2: 500 ppm");

        f.engine.activate(MenuAction::ResetCredentials).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(f.engine.title().await, "CO2: 800 ppm");
        assert_eq!(new.device_calls().len(), 1);
        assert_eq!(
            f.settings.get(SettingKey::ClientId).as_deref(),
            Some("new-id")
        );
        assert_eq!(f.engine.state().read(|s| s.client_generation()).await, 2);

        f.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reset_keeps_client_and_refreshes() {
        let f = fixture(
            MemorySettingsStore::new().with_credentials("id", "secret"),
            MockPrompt::new().cancel(),
        );
        let source = Arc::new(MockDataSource::new());
        f.factory.push(Arc::clone(&source));

        f.engine.ensure_client().await.unwrap();
        let outcome = f.engine.reset_credentials().await.unwrap();
        assert_eq!(outcome, ClientOutcome::Cancelled);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.reading_call_count(), 1);
        assert_eq!(f.engine.state().read(|s| s.client_generation()).await, 1);

        f.engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let f = fixture(
            MemorySettingsStore::new().with_credentials("id", "secret"),
            MockPrompt::new(),
        );
        let source = Arc::new(MockDataSource::new());
        f.factory.push(Arc::clone(&source));

        f.engine.start().await;
        f.engine.ensure_client().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        f.engine.shutdown().await;

        let calls = source.reading_call_count();
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(source.reading_call_count(), calls);
    }

    #[tokio::test]
    async fn test_subscribe_sees_activations() {
        let f = fixture(MemorySettingsStore::new(), MockPrompt::new());
        let mut changes = f.engine.subscribe();
        f.engine.activate(MenuAction::ToggleMetric(MetricKey::Temp)).await;
        assert!(changes.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_does_not_spawn_another_poller() {
        let f = fixture(
            MemorySettingsStore::new().with_credentials("id", "secret"),
            MockPrompt::new(),
        );
        let source = Arc::new(MockDataSource::new());
        f.factory.push(Arc::clone(&source));

        f.engine.start().await;
        f.engine.start().await;
        f.engine.ensure_client().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(source.device_calls().len(), 1);
        assert_eq!(source.reading_call_count(), 1);

        f.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_persist_the_final_focus() {
        let f = fixture(MemorySettingsStore::new(), MockPrompt::new());
        let engine = Arc::new(f.engine);

        let toggles: Vec<_> = (0..64)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let metric = MetricKey::ALL[i % MetricKey::ALL.len()];
                tokio::spawn(async move {
                    engine.activate(MenuAction::ToggleMetric(metric)).await;
                })
            })
            .collect();
        for toggle in toggles {
            toggle.await.unwrap();
        }

        let focused = engine.state().read(|s| s.focused_metric()).await;
        let expected = focused.map(|m| m.as_str()).unwrap_or_default();
        assert_eq!(
            f.settings.get(SettingKey::SelectedMetric).as_deref(),
            Some(expected)
        );
    }
}

//! Background poller.
//!
//! Each poll cycle runs under the exclusive state lock:
//!
//! 1. no client → release and retry after [`NO_CLIENT_RETRY`]
//! 2. no selected device → fetch the device list and select the first one
//! 3. fetch the latest reading for the selected device and publish it
//!
//! A failed fetch records a [`PollError`] and retries after
//! [`FAILURE_RETRY`]. After a successful cycle the recurring loop waits
//! [`POLL_INTERVAL`]; the one-shot mode used after a credential reset
//! returns instead.
//!
//! The device list is only fetched while nothing is selected, so a device
//! removed from the account goes unnoticed until a client reset clears the
//! selection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, PollError};
use crate::state::StateStore;

/// Wait before re-checking for a client.
pub const NO_CLIENT_RETRY: Duration = Duration::from_secs(1);

/// Wait after a failed fetch.
pub const FAILURE_RETRY: Duration = Duration::from_secs(60);

/// Wait between successful polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Whether the poller keeps running after a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Poll forever.
    Recurring,
    /// Return after the first successful cycle.
    OneShot,
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No client installed yet.
    NoClient,
    /// A fetch failed; the error was recorded.
    Failed(PollError),
    /// A reading was published for the device.
    Published { device_id: String },
}

/// Fetches devices and readings into the shared [`StateStore`].
pub struct Poller {
    state: Arc<StateStore>,
    cancel: CancellationToken,
}

impl Poller {
    /// Create a poller that runs until the process exits.
    pub fn new(state: Arc<StateStore>) -> Self {
        Self::with_cancellation(state, CancellationToken::new())
    }

    /// Create a poller that stops at its next wait once `cancel` fires.
    ///
    /// A fetch already in flight always completes and publishes.
    pub fn with_cancellation(state: Arc<StateStore>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Spawn the recurring loop on the current runtime.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(PollMode::Recurring).await })
    }

    /// Poll until the first successful cycle.
    pub async fn poll_once(&self) {
        self.run(PollMode::OneShot).await;
    }

    /// Run the poll loop in `mode`.
    pub async fn run(&self, mode: PollMode) {
        debug!("Poller running ({:?})", mode);
        let mut consecutive_failures = 0u32;

        loop {
            let wait = match self.poll_cycle().await {
                CycleOutcome::NoClient => NO_CLIENT_RETRY,
                CycleOutcome::Failed(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("{} (attempt {})", err, consecutive_failures);
                    } else if consecutive_failures == 4 {
                        error!(
                            "Poll failed {} times in a row, will keep retrying every {}s",
                            consecutive_failures,
                            FAILURE_RETRY.as_secs()
                        );
                    }
                    FAILURE_RETRY
                }
                CycleOutcome::Published { device_id } => {
                    if consecutive_failures > 0 {
                        info!("Polling recovered after {} failure(s)", consecutive_failures);
                    }
                    consecutive_failures = 0;
                    debug!("Published reading for {}", device_id);
                    if mode == PollMode::OneShot {
                        return;
                    }
                    POLL_INTERVAL
                }
            };

            if !self.wait(wait).await {
                info!("Poller stopped");
                return;
            }
        }
    }

    /// Run one cycle under the exclusive lock.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        let mut state = self.state.write().await;

        let Some(client) = state.client().cloned() else {
            return CycleOutcome::NoClient;
        };

        let device_id = match state.selected_device() {
            Some(id) => id.to_string(),
            None => {
                debug!("No device selected, fetching device list");
                let fetched = client.list_devices().await.and_then(|devices| {
                    let first = devices.first().map(|d| d.id.clone());
                    first.map(|id| (devices, id)).ok_or(Error::NoDevices)
                });
                match fetched {
                    Ok((devices, first)) => {
                        info!("Fetched {} device(s), selecting {}", devices.len(), first);
                        state.set_devices(devices);
                        state.set_selected_device(first.clone());
                        first
                    }
                    Err(e) => {
                        let err = PollError::devices(&e);
                        state.set_error(Some(err.clone()));
                        return CycleOutcome::Failed(err);
                    }
                }
            }
        };

        match client.latest_reading(&device_id).await {
            Ok(reading) => {
                state.set_reading(reading);
                state.set_error(None);
                CycleOutcome::Published { device_id }
            }
            Err(e) => {
                let err = PollError::reading(&e);
                state.set_error(Some(err.clone()));
                CycleOutcome::Failed(err)
            }
        }
    }

    /// Sleep for `duration`; `false` if cancelled first.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::mock::{MockDataSource, sample_devices, sample_reading};
    use crate::traits::ClientHandle;
    use airmenu_types::{Device, Reading};

    async fn store_with(source: &Arc<MockDataSource>) -> Arc<StateStore> {
        let store = Arc::new(StateStore::new());
        let client: ClientHandle = source.clone();
        store.set_client(client).await;
        store
    }

    #[tokio::test]
    async fn test_cycle_without_client() {
        let store = Arc::new(StateStore::new());
        let poller = Poller::new(Arc::clone(&store));
        assert_eq!(poller.poll_cycle().await, CycleOutcome::NoClient);
        assert_eq!(store.version(), 0);
    }

    #[tokio::test]
    async fn test_cycle_selects_first_device_and_publishes() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        assert_eq!(
            poller.poll_cycle().await,
            CycleOutcome::Published {
                device_id: "dev-1".to_string()
            }
        );
        store
            .read(|s| {
                assert_eq!(s.devices(), sample_devices().as_slice());
                assert_eq!(s.selected_device(), Some("dev-1"));
                assert!(s.reading().is_some());
                assert!(s.error().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_device_list_only_fetched_without_selection() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        poller.poll_cycle().await;
        poller.poll_cycle().await;
        assert_eq!(source.device_calls().len(), 1);
        assert_eq!(source.reading_call_count(), 2);
    }

    #[tokio::test]
    async fn test_vanished_device_stays_selected() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        poller.poll_cycle().await;
        store.set_selected_device("dev-2").await;

        // dev-2 is removed from the account; the poller never notices.
        source.set_devices(vec![Device::new("dev-1", "View Plus")]);
        poller.poll_cycle().await;

        assert_eq!(source.device_calls().len(), 1);
        let calls = source.reading_calls();
        assert_eq!(calls.last().map(|(id, _)| id.as_str()), Some("dev-2"));
        assert_eq!(
            store.read(|s| s.selected_device().map(String::from)).await,
            Some("dev-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_device_failure_keeps_previous_devices() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        store.set_devices(vec![Device::new("old", "Old Wave")]).await;
        source.fail_devices(true);

        let poller = Poller::new(Arc::clone(&store));
        let outcome = poller.poll_cycle().await;

        let expected = PollError::Devices("GET devices 503".to_string());
        assert_eq!(outcome, CycleOutcome::Failed(expected.clone()));
        store
            .read(|s| {
                assert_eq!(s.error(), Some(&expected));
                assert_eq!(s.devices().len(), 1);
                assert_eq!(s.devices()[0].id, "old");
                assert!(s.selected_device().is_none());
            })
            .await;
        assert_eq!(source.reading_call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_device_list_is_a_device_error() {
        let source = Arc::new(MockDataSource::new().with_devices(Vec::new()));
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        let outcome = poller.poll_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Failed(PollError::Devices(_))));
        assert!(store.read(|s| s.selected_device().is_none()).await);
    }

    #[tokio::test]
    async fn test_reading_failure_then_success_clears_error() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        source.fail_readings(true);
        let outcome = poller.poll_cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Failed(PollError::Reading("GET latest-samples 503".to_string()))
        );
        assert!(store.read(|s| s.reading().is_none()).await);

        source.fail_readings(false);
        poller.poll_cycle().await;
        store
            .read(|s| {
                assert!(s.reading().is_some());
                assert!(s.error().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_reading_failure_keeps_previous_reading() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));
        poller.poll_cycle().await;

        source.fail_readings(true);
        poller.poll_cycle().await;
        store
            .read(|s| {
                assert!(s.reading().is_some());
                assert!(matches!(s.error(), Some(PollError::Reading(_))));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_backs_off_sixty_seconds() {
        let source = Arc::new(MockDataSource::new());
        source.fail_devices(true);
        let store = store_with(&source).await;
        let cancel = CancellationToken::new();
        let handle = Poller::with_cancellation(Arc::clone(&store), cancel.clone()).start();

        tokio::time::sleep(Duration::from_secs(60 * 3 + 30)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = source.device_calls();
        assert_eq!(calls.len(), 4);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= FAILURE_RETRY);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_polls_every_five_minutes() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let cancel = CancellationToken::new();
        let handle = Poller::with_cancellation(Arc::clone(&store), cancel.clone()).start();

        tokio::time::sleep(Duration::from_secs(300 * 2 + 10)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = source.reading_calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= POLL_INTERVAL && gap < POLL_INTERVAL + Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_client_at_one_hertz() {
        let store = Arc::new(StateStore::new());
        let cancel = CancellationToken::new();
        let handle = Poller::with_cancellation(Arc::clone(&store), cancel.clone()).start();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let source = Arc::new(MockDataSource::new());
        let client: ClientHandle = source.clone();
        let installed_at = Instant::now();
        store.set_client(client).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        handle.await.unwrap();

        let first = source.device_calls()[0];
        assert!(first - installed_at <= NO_CLIENT_RETRY);
        assert!(store.read(|s| s.reading().is_some()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_returns_after_success() {
        let source = Arc::new(MockDataSource::new());
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        let start = Instant::now();
        poller.poll_once().await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(source.reading_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_retries_failures() {
        let source = Arc::new(MockDataSource::new());
        source.fail_readings(true);
        let store = store_with(&source).await;
        let poller = Arc::new(Poller::new(Arc::clone(&store)));

        let task = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(!task.is_finished());
        assert_eq!(source.reading_call_count(), 2);

        source.fail_readings(false);
        task.await.unwrap();
        assert!(store.read(|s| s.error().is_none()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_waits_for_in_flight_fetch() {
        let source = Arc::new(MockDataSource::new());
        source.set_latency(Duration::from_secs(5));
        let store = store_with(&source).await;
        let poller = Arc::new(Poller::new(Arc::clone(&store)));

        let cycle = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll_cycle().await })
        };
        // Let the poller take the lock and start its fetch.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let start = Instant::now();
        store.set_selected_device("dev-2").await;
        assert!(start.elapsed() >= Duration::from_secs(9));

        cycle.await.unwrap();
        assert_eq!(
            store.read(|s| s.selected_device().map(String::from)).await,
            Some("dev-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_reading_for_deselected_device_is_still_applied() {
        let source = Arc::new(MockDataSource::new());
        source.set_reading_for(
            "dev-1",
            Reading {
                co2: 1234.0,
                ..sample_reading()
            },
        );
        let store = store_with(&source).await;
        let poller = Poller::new(Arc::clone(&store));

        poller.poll_cycle().await;
        store.set_selected_device("dev-2").await;

        // The stored reading still belongs to dev-1 until the next cycle.
        let co2 = store.read(|s| s.reading().map(|r| r.co2)).await;
        assert_eq!(co2, Some(1234.0));
    }
}

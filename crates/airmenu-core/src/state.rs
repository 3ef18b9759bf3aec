//! Shared application state.
//!
//! # Locking discipline
//!
//! All state lives in one [`AppState`] behind a single `tokio::sync::RwLock`
//! owned by [`StateStore`]:
//!
//! - **Reads** ([`StateStore::read`]) take the shared lock and may run
//!   concurrently with other reads.
//! - **Mutations** take the exclusive lock and exclude every read and every
//!   other mutation for their duration.
//! - The poller holds the exclusive lock across its whole
//!   ensure-client → ensure-device → fetch → publish sequence, network round
//!   trips included. A selection change issued meanwhile waits for the
//!   round trip to finish.
//!
//! # Change notification
//!
//! Every exclusive section that touched the state bumps a version counter
//! published on a `watch` channel, so a host can re-render its title without
//! polling. Slow subscribers only ever see the latest version.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tokio::sync::{RwLock, RwLockWriteGuard, watch};
use tracing::debug;

use airmenu_types::{Device, MetricKey, Reading};

use crate::error::PollError;
use crate::traits::ClientHandle;

/// The aggregate application state.
///
/// Fields are only reachable through accessors; mutation goes through
/// [`StateStore`] so it is always serialized by the lock.
#[derive(Default)]
pub struct AppState {
    client: Option<ClientHandle>,
    client_generation: u64,
    devices: Vec<Device>,
    selected_device: Option<String>,
    reading: Option<Reading>,
    focused_metric: Option<MetricKey>,
    error: Option<PollError>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("client", &self.client.as_ref().map(|_| "<client>"))
            .field("client_generation", &self.client_generation)
            .field("devices", &self.devices)
            .field("selected_device", &self.selected_device)
            .field("reading", &self.reading)
            .field("focused_metric", &self.focused_metric)
            .field("error", &self.error)
            .finish()
    }
}

impl AppState {
    /// The live data source, if credentials have been supplied.
    pub fn client(&self) -> Option<&ClientHandle> {
        self.client.as_ref()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Incremented every time a client is installed; 0 before the first one.
    pub fn client_generation(&self) -> u64 {
        self.client_generation
    }

    /// Devices from the last successful device fetch.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    pub fn focused_metric(&self) -> Option<MetricKey> {
        self.focused_metric
    }

    pub fn error(&self) -> Option<&PollError> {
        self.error.as_ref()
    }

    pub(crate) fn set_client(&mut self, client: ClientHandle) {
        self.client = Some(client);
        self.client_generation += 1;
    }

    pub(crate) fn set_devices(&mut self, devices: Vec<Device>) {
        self.devices = devices;
    }

    /// Not validated against the device list.
    pub(crate) fn set_selected_device(&mut self, device_id: String) {
        self.selected_device = Some(device_id);
    }

    pub(crate) fn set_reading(&mut self, reading: Reading) {
        self.reading = Some(reading);
    }

    pub(crate) fn set_error(&mut self, error: Option<PollError>) {
        self.error = error;
    }

    pub(crate) fn set_focused_metric(&mut self, metric: Option<MetricKey>) {
        self.focused_metric = metric;
    }

    /// Drop everything derived from the previous client and install a new one.
    ///
    /// The selection is cleared too so the next poll re-fetches the device
    /// list for the new account.
    pub(crate) fn clear_for_new_client(&mut self, client: ClientHandle) {
        self.devices.clear();
        self.selected_device = None;
        self.reading = None;
        self.error = None;
        self.set_client(client);
    }
}

/// The single shared instance of [`AppState`].
///
/// Created empty at startup and shared by `Arc` between the poller, the
/// client lifecycle manager and the projection.
pub struct StateStore {
    inner: RwLock<AppState>,
    changes: watch::Sender<u64>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("version", &*self.changes.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: RwLock::new(AppState::default()),
            changes,
        }
    }

    /// Run `f` against a consistent snapshot under the shared lock.
    pub async fn read<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        let state = self.inner.read().await;
        f(&state)
    }

    /// Subscribe to change notifications.
    ///
    /// The value is a version number that increases after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current version number.
    pub fn version(&self) -> u64 {
        *self.changes.borrow()
    }

    /// Take the exclusive lock for a multi-step sequence.
    pub(crate) async fn write(&self) -> StateWriteGuard<'_> {
        StateWriteGuard {
            guard: self.inner.write().await,
            changes: &self.changes,
            dirty: false,
        }
    }

    pub async fn set_client(&self, client: ClientHandle) {
        self.write().await.set_client(client);
    }

    pub async fn set_devices(&self, devices: Vec<Device>) {
        self.write().await.set_devices(devices);
    }

    /// Select a device by id.
    ///
    /// The id is not checked against the current device list: a device that
    /// disappeared from the account stays selectable until a client reset.
    pub async fn set_selected_device(&self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        debug!("Selecting device {}", device_id);
        self.write().await.set_selected_device(device_id);
    }

    pub async fn set_reading(&self, reading: Reading) {
        self.write().await.set_reading(reading);
    }

    pub async fn set_error(&self, error: Option<PollError>) {
        self.write().await.set_error(error);
    }

    pub async fn set_focused_metric(&self, metric: Option<MetricKey>) {
        self.write().await.set_focused_metric(metric);
    }

    /// Clear devices, selection, reading and error and install `client`, as
    /// one exclusive mutation.
    pub async fn clear_for_new_client(&self, client: ClientHandle) {
        self.write().await.clear_for_new_client(client);
    }
}

/// Exclusive access to [`AppState`].
///
/// Publishes a change notification on drop if the state was borrowed
/// mutably.
pub(crate) struct StateWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, AppState>,
    changes: &'a watch::Sender<u64>,
    dirty: bool,
}

impl Deref for StateWriteGuard<'_> {
    type Target = AppState;

    fn deref(&self) -> &AppState {
        &self.guard
    }
}

impl DerefMut for StateWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut AppState {
        self.dirty = true;
        &mut self.guard
    }
}

impl Drop for StateWriteGuard<'_> {
    fn drop(&mut self) {
        if self.dirty {
            self.changes.send_modify(|version| *version += 1);
        }
    }
}

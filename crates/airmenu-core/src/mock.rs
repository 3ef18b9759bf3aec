//! Mock collaborators for testing.
//!
//! This module provides in-memory stand-ins for every trait in
//! [`crate::traits`] so the engine can be exercised without network access,
//! a settings file, or a user at the keyboard.
//!
//! # Features
//!
//! - **Failure injection**: make device or reading fetches fail
//! - **Latency simulation**: delay fetches (works with paused tokio time)
//! - **Call logs**: timestamps of every fetch, for backoff assertions

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::time::Instant;

use airmenu_types::{Device, Reading};

use crate::error::{Error, Result};
use crate::traits::{
    ClientFactory, ClientHandle, CredentialPrompt, Credentials, DataSource, PromptOutcome,
    SettingKey, SettingsStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Two devices, `dev-1` and `dev-2`.
pub fn sample_devices() -> Vec<Device> {
    vec![
        Device {
            id: "dev-1".to_string(),
            device_type: "VIEW_PLUS".to_string(),
            sensors: vec!["co2".to_string(), "radonShortTermAvg".to_string()],
            product_name: "View Plus".to_string(),
        },
        Device {
            id: "dev-2".to_string(),
            device_type: "WAVE_MINI".to_string(),
            sensors: vec!["temp".to_string(), "humidity".to_string()],
            product_name: "Wave Mini".to_string(),
        },
    ]
}

/// A plausible indoor reading taken just now.
pub fn sample_reading() -> Reading {
    Reading {
        time: OffsetDateTime::now_utc().unix_timestamp(),
        battery: 87,
        co2: 612.4,
        humidity: 41.26,
        pm1: 3.0,
        pm25: 5.8,
        pressure: 1012.3,
        radon_short_term_avg: 38.0,
        relay_device_type: "hub".to_string(),
        rssi: -61,
        temp: 21.44,
        voc: 142.9,
    }
}

/// A mock data source.
///
/// Implements [`DataSource`] for use wherever a [`ClientHandle`] is expected.
///
/// # Example
///
/// ```
/// use airmenu_core::mock::MockDataSource;
/// use airmenu_core::DataSource;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockDataSource::new();
///     let devices = source.list_devices().await.unwrap();
///     assert_eq!(devices[0].id, "dev-1");
///
///     source.fail_readings(true);
///     assert!(source.latest_reading("dev-1").await.is_err());
/// }
/// ```
pub struct MockDataSource {
    devices: Mutex<Vec<Device>>,
    readings: Mutex<HashMap<String, Reading>>,
    default_reading: Mutex<Reading>,
    fail_devices: AtomicBool,
    fail_readings: AtomicBool,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    device_calls: Mutex<Vec<Instant>>,
    reading_calls: Mutex<Vec<(String, Instant)>>,
}

impl std::fmt::Debug for MockDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDataSource")
            .field("devices", &lock(&self.devices).len())
            .field("fail_devices", &self.fail_devices.load(Ordering::Relaxed))
            .field("fail_readings", &self.fail_readings.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDataSource {
    /// Create a source serving [`sample_devices`] and [`sample_reading`].
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(sample_devices()),
            readings: Mutex::new(HashMap::new()),
            default_reading: Mutex::new(sample_reading()),
            fail_devices: AtomicBool::new(false),
            fail_readings: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            device_calls: Mutex::new(Vec::new()),
            reading_calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `devices` instead of the samples.
    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        self.set_devices(devices);
        self
    }

    /// Serve `reading` for every device without a specific reading.
    pub fn with_reading(self, reading: Reading) -> Self {
        *lock(&self.default_reading) = reading;
        self
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *lock(&self.devices) = devices;
    }

    /// Serve `reading` for `device_id` only.
    pub fn set_reading_for(&self, device_id: &str, reading: Reading) {
        lock(&self.readings).insert(device_id.to_string(), reading);
    }

    pub fn fail_devices(&self, fail: bool) {
        self.fail_devices.store(fail, Ordering::Relaxed);
    }

    pub fn fail_readings(&self, fail: bool) {
        self.fail_readings.store(fail, Ordering::Relaxed);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Start times of every `list_devices` call.
    pub fn device_calls(&self) -> Vec<Instant> {
        lock(&self.device_calls).clone()
    }

    /// Device ids and start times of every `latest_reading` call.
    pub fn reading_calls(&self) -> Vec<(String, Instant)> {
        lock(&self.reading_calls).clone()
    }

    pub fn reading_call_count(&self) -> usize {
        lock(&self.reading_calls).len()
    }

    async fn simulate_latency(&self) {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        lock(&self.device_calls).push(Instant::now());
        self.simulate_latency().await;

        if self.fail_devices.load(Ordering::Relaxed) {
            return Err(Error::Status {
                endpoint: "devices",
                status: 503,
            });
        }
        Ok(lock(&self.devices).clone())
    }

    async fn latest_reading(&self, device_id: &str) -> Result<Reading> {
        lock(&self.reading_calls).push((device_id.to_string(), Instant::now()));
        self.simulate_latency().await;

        if self.fail_readings.load(Ordering::Relaxed) {
            return Err(Error::Status {
                endpoint: "latest-samples",
                status: 503,
            });
        }
        let specific = lock(&self.readings).get(device_id).cloned();
        Ok(specific.unwrap_or_else(|| lock(&self.default_reading).clone()))
    }
}

/// Factory handing out queued [`MockDataSource`]s.
///
/// When the queue is empty a fresh default source is built.
#[derive(Debug, Default)]
pub struct MockClientFactory {
    queued: Mutex<VecDeque<Arc<MockDataSource>>>,
    created: Mutex<Vec<Credentials>>,
    fail: AtomicBool,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out `source` on the next `create`.
    pub fn push(&self, source: Arc<MockDataSource>) {
        lock(&self.queued).push_back(source);
    }

    /// Make `create` fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Credentials of every successful `create`, in order.
    pub fn created(&self) -> Vec<Credentials> {
        lock(&self.created).clone()
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, credentials: &Credentials) -> Result<ClientHandle> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::ClientBuild("mock factory failure".to_string()));
        }
        lock(&self.created).push(credentials.clone());
        let source: ClientHandle = lock(&self.queued)
            .pop_front()
            .unwrap_or_else(|| Arc::new(MockDataSource::new()));
        Ok(source)
    }
}

/// Prompt answering from a scripted queue; cancels once the queue is empty.
#[derive(Debug, Default)]
pub struct MockPrompt {
    answers: Mutex<VecDeque<PromptOutcome>>,
    asked: Mutex<Vec<String>>,
}

impl MockPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a confirmed answer.
    pub fn confirm(self, client_id: &str, client_secret: &str) -> Self {
        lock(&self.answers).push_back(PromptOutcome::Confirmed([
            client_id.to_string(),
            client_secret.to_string(),
        ]));
        self
    }

    /// Queue a cancellation.
    pub fn cancel(self) -> Self {
        lock(&self.answers).push_back(PromptOutcome::Cancelled);
        self
    }

    /// Number of times the prompt was shown.
    pub fn times_asked(&self) -> usize {
        lock(&self.asked).len()
    }

    /// Messages shown, in order.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl CredentialPrompt for MockPrompt {
    async fn prompt(&self, message: &str, _fields: [&str; 2]) -> PromptOutcome {
        lock(&self.asked).push(message.to_string());
        lock(&self.answers)
            .pop_front()
            .unwrap_or(PromptOutcome::Cancelled)
    }
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<SettingKey, String>>,
    fail_writes: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate stored credentials.
    pub fn with_credentials(self, client_id: &str, client_secret: &str) -> Self {
        {
            let mut values = lock(&self.values);
            values.insert(SettingKey::ClientId, client_id.to_string());
            values.insert(SettingKey::ClientSecret, client_secret.to_string());
        }
        self
    }

    /// Pre-populate any value.
    pub fn with_value(self, key: SettingKey, value: &str) -> Self {
        lock(&self.values).insert(key, value.to_string());
        self
    }

    /// Make `set` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: SettingKey) -> Option<String> {
        lock(&self.values).get(&key).cloned()
    }

    fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Settings(format!("mock write of {} failed", key.as_str())));
        }
        lock(&self.values).insert(key, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_serves_samples() {
        let source = MockDataSource::new();
        let devices = source.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        let reading = source.latest_reading("dev-1").await.unwrap();
        assert!((reading.co2 - 612.4).abs() < f64::EPSILON);
        assert_eq!(source.device_calls().len(), 1);
        assert_eq!(source.reading_calls()[0].0, "dev-1");
    }

    #[tokio::test]
    async fn test_mock_source_per_device_reading() {
        let source = MockDataSource::new();
        source.set_reading_for(
            "dev-2",
            Reading {
                co2: 999.0,
                ..Reading::default()
            },
        );
        let reading = source.latest_reading("dev-2").await.unwrap();
        assert!((reading.co2 - 999.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_mock_source_failure_injection() {
        let source = MockDataSource::new();
        source.fail_devices(true);
        let err = source.list_devices().await.unwrap_err();
        assert_eq!(err.to_string(), "GET devices 503");

        source.fail_devices(false);
        assert!(source.list_devices().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_source_latency() {
        let source = MockDataSource::new();
        source.set_latency(Duration::from_secs(2));
        let start = Instant::now();
        source.latest_reading("dev-1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_mock_prompt_cancels_when_exhausted() {
        let prompt = MockPrompt::new().confirm("id", "secret");
        assert_eq!(
            prompt.prompt("msg", ["a", "b"]).await,
            PromptOutcome::Confirmed(["id".to_string(), "secret".to_string()])
        );
        assert_eq!(prompt.prompt("msg", ["a", "b"]).await, PromptOutcome::Cancelled);
        assert_eq!(prompt.times_asked(), 2);
    }

    #[test]
    fn test_memory_settings_store() {
        let store = MemorySettingsStore::new().with_credentials("id", "secret");
        assert_eq!(store.get(SettingKey::ClientId).as_deref(), Some("id"));
        assert!(store.get(SettingKey::SelectedMetric).is_none());

        store.set(SettingKey::SelectedMetric, "co2").unwrap();
        assert_eq!(store.get(SettingKey::SelectedMetric).as_deref(), Some("co2"));

        store.fail_writes(true);
        assert!(store.set(SettingKey::SelectedMetric, "voc").is_err());
        assert_eq!(store.get(SettingKey::SelectedMetric).as_deref(), Some("co2"));
    }

    #[test]
    fn test_mock_factory_queue_and_failure() {
        let factory = MockClientFactory::new();
        factory.push(Arc::new(MockDataSource::new().with_devices(Vec::new())));
        let creds = Credentials::new("id", "secret");

        assert!(factory.create(&creds).is_ok());
        assert!(factory.create(&creds).is_ok());
        assert_eq!(factory.created().len(), 2);

        factory.fail(true);
        assert!(matches!(factory.create(&creds), Err(Error::ClientBuild(_))));
        assert_eq!(factory.created().len(), 2);
    }
}

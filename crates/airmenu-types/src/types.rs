//! Core types for Airthings sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A device registered on the Airthings account.
///
/// The API returns the whole device list at once; a fetched list is always
/// replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Device {
    /// Unique device identifier (serial number).
    pub id: String,
    /// Device type tag, e.g. `"VIEW_PLUS"` or `"WAVE_MINI"`.
    pub device_type: String,
    /// Sensor kinds supported by this device.
    pub sensors: Vec<String>,
    /// Human-readable product name shown in the device menu.
    pub product_name: String,
}

impl Device {
    /// Create a device with an id and product name and no sensor metadata.
    pub fn new(id: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            product_name: product_name.into(),
            ..Self::default()
        }
    }
}

/// Latest samples for a single device.
///
/// Fields the device does not measure are absent from the API response and
/// default to zero.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Reading {
    /// Sample time as a Unix timestamp in seconds.
    pub time: i64,
    /// Battery level percentage.
    pub battery: i32,
    /// CO2 concentration in ppm.
    pub co2: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// PM1 concentration in µg/m³.
    pub pm1: f64,
    /// PM2.5 concentration in µg/m³.
    pub pm25: f64,
    /// Atmospheric pressure in hPa.
    pub pressure: f64,
    /// Short-term radon average in Bq/m³.
    pub radon_short_term_avg: f64,
    /// Type of the hub that relayed the sample.
    pub relay_device_type: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    /// Temperature in degrees Celsius.
    pub temp: f64,
    /// Volatile organic compounds in ppb.
    pub voc: f64,
}

/// A metric that can be focused for compact display in the menu bar title.
///
/// The declaration order is the order in which metric rows appear in the menu.
///
/// ```
/// use airmenu_types::MetricKey;
///
/// assert_eq!("pm25".parse::<MetricKey>(), Ok(MetricKey::Pm25));
/// assert_eq!(MetricKey::Radon.to_string(), "radon");
/// assert!("ozone".parse::<MetricKey>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKey {
    /// Carbon dioxide.
    Co2,
    /// Particulate matter up to 2.5 µm.
    Pm25,
    /// Temperature.
    Temp,
    /// Relative humidity.
    Humidity,
    /// Short-term radon average.
    Radon,
    /// Particulate matter up to 1 µm.
    Pm1,
    /// Volatile organic compounds.
    Voc,
}

impl MetricKey {
    /// All metrics in menu order.
    pub const ALL: [MetricKey; 7] = [
        MetricKey::Co2,
        MetricKey::Pm25,
        MetricKey::Temp,
        MetricKey::Humidity,
        MetricKey::Radon,
        MetricKey::Pm1,
        MetricKey::Voc,
    ];

    /// Canonical name, also used as the persisted preference value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Co2 => "co2",
            MetricKey::Pm25 => "pm25",
            MetricKey::Temp => "temp",
            MetricKey::Humidity => "humidity",
            MetricKey::Radon => "radon",
            MetricKey::Pm1 => "pm1",
            MetricKey::Voc => "voc",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ParseError::UnknownMetric(s.to_string()))
    }
}

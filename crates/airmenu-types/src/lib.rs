//! Platform-agnostic types for the Airthings consumer API.
//!
//! This crate provides the data shared between the polling engine
//! (airmenu-core) and the frontends:
//!
//! - [`Device`]: one entry of the account's device list
//! - [`Reading`]: the latest samples of one device
//! - [`MetricKey`]: the metric focused in the menu bar title
//!
//! # Example
//!
//! ```
//! use airmenu_types::{MetricKey, Reading};
//!
//! let reading = Reading { co2: 612.0, ..Reading::default() };
//! assert_eq!(MetricKey::ALL[0], MetricKey::Co2);
//! assert_eq!(reading.co2 as i64, 612);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{Device, MetricKey, Reading};

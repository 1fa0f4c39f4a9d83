//! # agilewatch - Agile tariff watcher for inverter/charger control
//!
//! Polls the Octopus Energy Agile unit-rate API, caches two days of
//! half-hourly prices, and switches an inverter-like device on the sign of
//! the price that is active right now.
//!
//! ## Architecture
//!
//! - `timebucket`: pure 30-minute window arithmetic
//! - `rate_cache`: two-day price cache with lazy refresh-on-miss
//! - `octopus`: tariff source trait, region codes and the REST client
//! - `control`: price-sign classification and the device controller seam
//! - `scheduler`: the boundary-aligned polling loop
//! - `config`: YAML configuration and validation
//! - `logging`: structured logging and tracing
//! - `error`: error taxonomy

pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod octopus;
pub mod rate_cache;
pub mod scheduler;
pub mod timebucket;

// Re-export commonly used types
pub use config::Config;
pub use control::{ControlSignal, DeviceController};
pub use error::{AgileWatchError, Result};
pub use rate_cache::{RateCache, RateWindow};
pub use scheduler::{Clock, LoopState, Scheduler, SystemClock};

/// Version string baked in by the build script
pub const APP_VERSION: &str = env!("APP_VERSION");

//! Octopus Energy Agile tariff integration
//!
//! `TariffSource` is the narrow seam the rate cache talks to; `OctopusClient`
//! is the HTTP implementation against the versioned REST API.

pub mod client;
pub mod types;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::Result;

pub use client::OctopusClient;
pub use types::{Region, UnitRate, UnitRatesPage};

/// Supplier of published half-hour unit rates
#[async_trait]
pub trait TariffSource: Send + Sync {
    /// Rates whose windows start within `[period_from, period_to)`.
    ///
    /// Transport or status failures surface as `DataUnavailable`.
    async fn fetch(
        &self,
        period_from: &DateTime<Tz>,
        period_to: &DateTime<Tz>,
    ) -> Result<Vec<UnitRate>>;
}

//! Two-day cache of half-hourly unit rates
//!
//! The cache only talks to its `TariffSource` when it is asked for a window
//! it does not hold. A refresh always fetches two full local days starting at
//! midnight and replaces the previous contents wholesale.

use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::{AgileWatchError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::octopus::{TariffSource, UnitRate};
use crate::timebucket::{floor30, two_day_span, window_end};

/// A single priced half-hour window
#[derive(Debug, Clone, PartialEq)]
pub struct RateWindow {
    /// Window start, aligned to :00 or :30
    pub start: DateTime<Tz>,
    /// Unit price including VAT, pence per kWh
    pub price: f64,
}

impl RateWindow {
    pub fn end(&self) -> DateTime<Tz> {
        window_end(&self.start)
    }
}

/// Window-start → price map covering at most two local calendar days
pub struct RateCache {
    tz: Tz,
    rates: BTreeMap<DateTime<Tz>, f64>,
    refreshed_at: Option<DateTime<Tz>>,
    refresh_count: u64,
    logger: StructuredLogger,
}

impl RateCache {
    /// Create an empty cache evaluating civil time in `tz`
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            rates: BTreeMap::new(),
            refreshed_at: None,
            refresh_count: 0,
            logger: get_logger("rate_cache"),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// When the last successful refresh happened
    pub fn refreshed_at(&self) -> Option<&DateTime<Tz>> {
        self.refreshed_at.as_ref()
    }

    /// Number of successful refreshes since creation
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Price of the window containing `instant`, without touching the source
    pub fn price_at(&self, instant: &DateTime<Tz>) -> Option<f64> {
        let key = floor30(&instant.with_timezone(&self.tz));
        self.rates.get(&key).copied()
    }

    /// Whether the window containing `instant` is cached
    pub fn contains_window(&self, instant: &DateTime<Tz>) -> bool {
        self.price_at(instant).is_some()
    }

    /// Discard current contents and load `rates` in their place
    pub fn replace<I>(&mut self, rates: I)
    where
        I: IntoIterator<Item = UnitRate>,
    {
        let tz = self.tz;
        self.rates = rates
            .into_iter()
            .map(|r| (floor30(&r.valid_from.with_timezone(&tz)), r.value_inc_vat))
            .collect();
    }

    /// Fetch two local days starting at midnight of `now` and replace the cache.
    ///
    /// Source failures propagate unchanged; the previous contents survive a
    /// failed fetch.
    pub async fn refresh<S>(&mut self, source: &S, now: &DateTime<Tz>) -> Result<()>
    where
        S: TariffSource + ?Sized,
    {
        let now = now.with_timezone(&self.tz);
        let (period_from, period_to) = two_day_span(&now)?;
        self.logger.debug(&format!(
            "Refreshing rates {} .. {}",
            period_from.format("%Y-%m-%d %H:%M"),
            period_to.format("%Y-%m-%d %H:%M")
        ));

        let rates = source.fetch(&period_from, &period_to).await?;
        self.replace(rates);
        self.refreshed_at = Some(now);
        self.refresh_count += 1;

        self.logger.info(&format!(
            "Cached {} rate windows for {}",
            self.rates.len(),
            period_from.format("%Y-%m-%d")
        ));
        Ok(())
    }

    /// Price of the window containing `now`, refreshing once on a miss.
    ///
    /// Fails with `CacheGap` when the window is still absent after the refresh.
    pub async fn current_price<S>(&mut self, now: &DateTime<Tz>, source: &S) -> Result<f64>
    where
        S: TariffSource + ?Sized,
    {
        let start = floor30(&now.with_timezone(&self.tz));

        if !self.rates.contains_key(&start) {
            self.logger.info(&format!(
                "No cached rate for {}, refreshing",
                start.format("%Y-%m-%d %H:%M")
            ));
            self.refresh(source, now).await?;
        }

        let price = self.rates.get(&start).copied().ok_or_else(|| {
            self.logger.error(&format!(
                "Upstream published no rate for {}",
                start.format("%Y-%m-%d %H:%M")
            ));
            AgileWatchError::cache_gap(start.format("%Y-%m-%d %H:%M %Z").to_string())
        })?;

        self.logger.info(&format!(
            "New tariff rate - Start: {} End: {} Price: {:.2}p",
            start.format("%H:%M"),
            window_end(&start).format("%H:%M"),
            price
        ));
        Ok(price)
    }

    /// Cached windows with `floor30(start) < window.start < end`, in order.
    ///
    /// Display helper only; never consulted for control decisions.
    pub fn windows_between(&self, start: &DateTime<Tz>, end: &DateTime<Tz>) -> Vec<RateWindow> {
        let lo = floor30(&start.with_timezone(&self.tz));
        let hi = end.with_timezone(&self.tz);
        if lo >= hi {
            return Vec::new();
        }
        self.rates
            .range((Bound::Excluded(lo), Bound::Excluded(hi)))
            .map(|(start, price)| RateWindow {
                start: *start,
                price: *price,
            })
            .collect()
    }

    /// All cached windows in start order
    pub fn windows(&self) -> impl Iterator<Item = RateWindow> + '_ {
        self.rates.iter().map(|(start, price)| RateWindow {
            start: *start,
            price: *price,
        })
    }
}

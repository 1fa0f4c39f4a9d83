//! Half-hour aligned polling loop
//!
//! `STARTUP` primes the rate cache and prints the schedule; `STEADY_STATE`
//! then repeats forever: read the current price, dispatch the control signal,
//! and sleep until the next window boundary. The wait re-reads the clock on
//! every wake, so a long device action or clock drift never leaves the loop
//! chasing a stale target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::control::{ControlSignal, DeviceController};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::octopus::TariffSource;
use crate::rate_cache::RateCache;
use crate::timebucket::{floor30, next_boundary};

/// Source of wall-clock time and suspension
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real time: chrono for the wall clock, tokio for sleeping
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polling loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Startup,
    SteadyState,
}

/// Outcome of one steady-state tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Instant the price was read for
    pub at: DateTime<Tz>,
    pub price: f64,
    pub signal: ControlSignal,
    /// Boundary computed after the device action completed
    pub next_boundary: DateTime<Tz>,
}

/// Single-task control loop owning the rate cache
pub struct Scheduler<S, D, C = SystemClock> {
    source: S,
    controller: D,
    clock: C,
    tz: Tz,
    cache: RateCache,
    settings: SchedulerConfig,
    state: LoopState,
    ticks: u64,
    logger: StructuredLogger,
}

impl<S, D, C> Scheduler<S, D, C>
where
    S: TariffSource,
    D: DeviceController,
    C: Clock,
{
    pub fn new(source: S, controller: D, clock: C, tz: Tz, settings: SchedulerConfig) -> Self {
        Self {
            source,
            controller,
            clock,
            tz,
            cache: RateCache::new(tz),
            settings,
            state: LoopState::Startup,
            ticks: 0,
            logger: get_logger("scheduler"),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    pub fn controller(&self) -> &D {
        &self.controller
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Completed ticks since start
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current time in the market zone
    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    /// Prime the cache and report the schedule.
    ///
    /// Returns the price of the current window.
    pub async fn startup(&mut self) -> Result<f64> {
        let now = self.now();
        self.logger.info("Fetching Agile tariff schedule");
        self.cache.refresh(&self.source, &now).await?;
        let price = self.cache.current_price(&now, &self.source).await?;

        self.logger.info("Agile tariff schedule");
        for line in self.schedule_lines(&now) {
            self.logger.info(&line);
        }
        self.state = LoopState::SteadyState;
        Ok(price)
    }

    /// Human-readable schedule table with the current window marked
    pub fn schedule_lines(&self, now: &DateTime<Tz>) -> Vec<String> {
        let current = floor30(&now.with_timezone(&self.tz));
        self.cache
            .windows()
            .map(|w| {
                let tag = if w.start == current {
                    " <-- You are here"
                } else {
                    ""
                };
                format!("{} {:.2}p{}", w.start.format("%Y-%m-%d %H:%M"), w.price, tag)
            })
            .collect()
    }

    /// Read the current price and dispatch its control signal
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.now();
        let price = self.cache.current_price(&now, &self.source).await?;
        self.logger.info(&format!(
            "{} - Tariff now = {:.2}p",
            now.format("%Y-%m-%d %H:%M:%S"),
            price
        ));

        let signal = ControlSignal::from_price(price);
        self.controller.apply(signal, price).await?;

        // Recompute from a fresh reading: the action may have taken a while
        let next = next_boundary(&self.now());
        self.ticks += 1;
        self.logger.debug(&format!(
            "Tick {} dispatched {}, next boundary {}",
            self.ticks,
            signal,
            next.format("%H:%M")
        ));

        Ok(TickReport {
            at: now,
            price,
            signal,
            next_boundary: next,
        })
    }

    /// Tick with the configured retry policy.
    ///
    /// `Ok(None)` means the tick was abandoned and the loop should wait for
    /// the next boundary.
    async fn tick_with_policy(&mut self) -> Result<Option<TickReport>> {
        let attempts = self.settings.tick_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.tick().await {
                Ok(report) => return Ok(Some(report)),
                Err(e) if attempt < attempts => {
                    self.logger.warn(&format!(
                        "Tick attempt {}/{} failed: {}",
                        attempt, attempts, e
                    ));
                    attempt += 1;
                    self.clock
                        .sleep(Duration::from_millis(self.settings.retry_delay_ms))
                        .await;
                }
                Err(e) if self.settings.skip_failed_ticks => {
                    self.logger
                        .error(&format!("Tick failed, skipping to next window: {}", e));
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Suspend until the clock reaches `target`.
    ///
    /// Sleeps in slices of at most `check_interval_ms` and re-reads the clock
    /// after each one; returns immediately if `target` has already passed.
    pub async fn wait_until(&self, target: &DateTime<Tz>) {
        let slice = Duration::from_millis(self.settings.check_interval_ms.max(1));
        loop {
            let now = self.now();
            if now >= *target {
                return;
            }
            let remaining = (*target - now).to_std().unwrap_or(Duration::ZERO);
            self.clock.sleep(remaining.min(slice)).await;
        }
    }

    /// One pass of the loop: startup if needed, tick, then wait for the
    /// next boundary
    pub async fn step(&mut self) -> Result<Option<TickReport>> {
        if self.state == LoopState::Startup {
            match self.startup().await {
                Ok(_) => {}
                Err(e) if self.settings.skip_failed_ticks => {
                    // The cache refreshes lazily on the first tick
                    self.logger.error(&format!("Startup refresh failed: {}", e));
                    self.state = LoopState::SteadyState;
                }
                Err(e) => return Err(e),
            }
        }

        let report = self.tick_with_policy().await?;
        let target = match &report {
            Some(r) => r.next_boundary,
            None => next_boundary(&self.now()),
        };
        self.wait_until(&target).await;
        Ok(report)
    }

    /// Run until the process is terminated or a tick fails fatally
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting tariff polling loop");
        loop {
            self.step().await?;
        }
    }
}

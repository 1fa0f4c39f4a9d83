//! Price-sign control decisions
//!
//! Maps the active unit price onto one of three mutually exclusive device
//! actions and hands it to a `DeviceController`.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};

/// Action derived from the sign of the current unit price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Positive price: run the inverter and supply the load
    EnableLoad,

    /// Negative price: stop the inverter and charge the battery from grid
    EnableChargeDisableLoad,

    /// Zero (or non-finite) price: neither action fires
    NoAction,
}

impl ControlSignal {
    /// Classify a price. NaN is treated like zero.
    pub fn from_price(price: f64) -> Self {
        if price > 0.0 {
            Self::EnableLoad
        } else if price < 0.0 {
            Self::EnableChargeDisableLoad
        } else {
            Self::NoAction
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnableLoad => "ENABLE_LOAD",
            Self::EnableChargeDisableLoad => "ENABLE_CHARGE_DISABLE_LOAD",
            Self::NoAction => "NO_ACTION",
        }
    }

    pub fn is_action(&self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for control decisions
#[async_trait]
pub trait DeviceController: Send {
    async fn apply(&mut self, signal: ControlSignal, price: f64) -> Result<()>;
}

/// Controller that only reports the decision.
///
/// Hardware integrations (Modbus inverter, battery charger) plug in behind
/// the same trait.
pub struct LoggingController {
    logger: StructuredLogger,
    last_signal: Option<ControlSignal>,
}

impl LoggingController {
    pub fn new(serial_no: &str) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("control").with_field("serial", serial_no.to_string()),
        );
        Self {
            logger,
            last_signal: None,
        }
    }

    /// Most recently applied signal
    pub fn last_signal(&self) -> Option<ControlSignal> {
        self.last_signal
    }
}

#[async_trait]
impl DeviceController for LoggingController {
    async fn apply(&mut self, signal: ControlSignal, price: f64) -> Result<()> {
        match signal {
            ControlSignal::EnableLoad => self.logger.info("Turn on inverter"),
            ControlSignal::EnableChargeDisableLoad => {
                self.logger.info("Turn off inverter, turn on charger")
            }
            ControlSignal::NoAction => self
                .logger
                .debug(&format!("Price {:.2}p is zero, leaving devices as they are", price)),
        }
        self.last_signal = Some(signal);
        Ok(())
    }
}

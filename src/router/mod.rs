//! Router module - address-prefix dispatch to drivers
//!
//! The leading path segment of a command selects the driver; the driver
//! receives the remainder (`/lights/mix/3/fader` → `lights` gets
//! `/mix/3/fader`, a bare `/lights` becomes `/`). Fade values are routed the
//! same way by key.

mod driver;


use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::command::{split_leading_segment, Command};
use crate::drivers::Driver;

/// Routing failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("address '{0}' has no prefix segment")]
    Malformed(String),

    #[error("no driver registered for prefix '{prefix}' (address {address})")]
    UnknownPrefix { prefix: String, address: String },

    #[error("prefix '{0}' is already registered")]
    DuplicatePrefix(String),

    #[error("prefix '{0}' is reserved by the hub")]
    ReservedPrefix(String),

    /// A hub command with arguments it cannot use
    #[error("{address}: {reason}")]
    InvalidArguments { address: String, reason: String },
}

/// Prefix → driver table
pub struct Router {
    /// Registered drivers by prefix (no slashes)
    pub(crate) drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Forward a command to the driver owning its prefix
    ///
    /// Unroutable commands are logged and dropped; the error is returned for
    /// callers that want to report it.
    pub fn route(&self, command: &Command) -> Result<(), RouteError> {
        let Some((prefix, rest)) = split_leading_segment(&command.address) else {
            warn!("Dropping command with malformed address '{}'", command.address);
            return Err(RouteError::Malformed(command.address.clone()));
        };

        let driver = self.drivers.read().get(prefix).cloned();
        match driver {
            Some(driver) => {
                debug!("→ {} {}", driver.name(), command);
                driver.handle_osc(rest, &command.args);
                Ok(())
            },
            None => {
                warn!(
                    "No driver for prefix '{}', dropping {}",
                    prefix, command.address
                );
                Err(RouteError::UnknownPrefix {
                    prefix: prefix.to_string(),
                    address: command.address.clone(),
                })
            },
        }
    }

    /// Forward a fade value to the driver owning the key's prefix.
    /// Returns false when no driver owns the key.
    pub fn route_fade_tick(&self, key: &str, value: f64) -> bool {
        let Some((prefix, rest)) = split_leading_segment(key) else {
            return false;
        };
        let driver = self.drivers.read().get(prefix).cloned();
        match driver {
            Some(driver) => {
                driver.handle_fade_tick(rest, value);
                true
            },
            None => {
                trace!("Fade key {} has no driver; table only", key);
                false
            },
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

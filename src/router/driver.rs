//! Driver registration and lifecycle management

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::RouteError;
use crate::config::RESERVED_PREFIXES;
use crate::drivers::Driver;

impl super::Router {
    /// Register a driver under its prefix
    pub fn register(&self, driver: Arc<dyn Driver>) -> Result<(), RouteError> {
        let prefix = driver.prefix().to_string();
        if RESERVED_PREFIXES.contains(&prefix.as_str()) {
            return Err(RouteError::ReservedPrefix(prefix));
        }

        let mut drivers = self.drivers.write();
        if drivers.contains_key(&prefix) {
            return Err(RouteError::DuplicatePrefix(prefix));
        }
        debug!("Registering driver '{}' at /{}", driver.name(), prefix);
        drivers.insert(prefix, driver);
        Ok(())
    }

    /// Remove the driver under `prefix`
    pub fn unregister(&self, prefix: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.write().remove(prefix.trim_matches('/'))
    }

    /// Get a driver by prefix
    pub fn get(&self, prefix: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().get(prefix.trim_matches('/')).cloned()
    }

    /// All drivers, sorted by prefix
    pub fn drivers(&self) -> Vec<Arc<dyn Driver>> {
        let mut list: Vec<_> = self.drivers.read().values().cloned().collect();
        list.sort_by(|a, b| a.prefix().cmp(b.prefix()));
        list
    }

    /// List registered prefixes
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<_> = self.drivers.read().keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Connect every driver concurrently; failures are logged and left to
    /// the retry loop. A driver that stalls never holds up the others.
    pub async fn connect_all(&self) {
        let mut pending = JoinSet::new();
        for driver in self.drivers() {
            if driver.is_connected() {
                continue;
            }
            pending.spawn(async move {
                if let Err(e) = driver.connect().await {
                    warn!(
                        "Driver '{}' not reachable yet ({}); retrying in background",
                        driver.name(),
                        e
                    );
                }
            });
        }
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("Driver connect task failed: {}", e);
            }
        }
    }

    /// Disconnect every driver
    pub async fn disconnect_all(&self) {
        let drivers = self.drivers();
        debug!("Disconnecting {} driver(s)...", drivers.len());
        for driver in drivers {
            driver.disconnect().await;
        }
        info!("All drivers disconnected");
    }
}

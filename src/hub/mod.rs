//! The hub: owns the fade engine, the router and the telemetry, and wires
//! them together
//!
//! Engine `value` signals feed the router so fade steps reach the driver that
//! owns the key's prefix. Drivers get the engine only through
//! [`HubContext`].

mod commands;
pub mod context;

pub use context::{EngineContext, HubContext};

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::command::{split_leading_segment, Command};
use crate::config::AppConfig;
use crate::device_state::DeviceStateStore;
use crate::drivers::{self, Driver};
use crate::fade::{FadeEngine, FadeValue, SystemClock};
use crate::router::{RouteError, Router};
use crate::signal::SubscriptionId;
use crate::stats::{DriverStats, StatsRegistry};

/// Snapshot served by `/system/status` and the status API
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub drivers: Vec<DriverStats>,
    pub devices: BTreeMap<String, Value>,
    pub active_fades: usize,
    pub engine_running: bool,
}

pub struct Hub {
    engine: Arc<FadeEngine>,
    router: Arc<Router>,
    stats: StatsRegistry,
    devices: DeviceStateStore,
    context: Arc<dyn HubContext>,
    value_subscription: SubscriptionId,
}

impl Hub {
    /// Hub on the system clock
    pub fn new(tick_interval: Duration) -> Self {
        Self::with_engine(Arc::new(FadeEngine::with_clock(
            Arc::new(SystemClock),
            tick_interval,
        )))
    }

    /// Hub around an existing engine
    pub fn with_engine(engine: Arc<FadeEngine>) -> Self {
        let router = Arc::new(Router::new());

        let weak_router = Arc::downgrade(&router);
        let value_subscription = engine.value_signal().subscribe(move |v: &FadeValue| {
            if let Some(router) = weak_router.upgrade() {
                router.route_fade_tick(&v.key, v.value);
            }
        });

        let context: Arc<dyn HubContext> = Arc::new(EngineContext::new(Arc::clone(&engine)));
        Self {
            engine,
            router,
            stats: StatsRegistry::new(),
            devices: DeviceStateStore::new(),
            context,
            value_subscription,
        }
    }

    /// Build the hub and every configured driver
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let hub = Self::new(Duration::from_millis(config.hub.tick_interval_ms));
        for driver_config in &config.drivers {
            let name = driver_config.name().to_string();
            let driver = drivers::build(driver_config.clone())
                .with_context(|| format!("Failed to build driver '{}'", name))?;
            hub.add_driver(driver)
                .with_context(|| format!("Failed to register driver '{}'", name))?;
        }
        Ok(hub)
    }

    /// Register a driver: routing, context and stats
    pub fn add_driver(&self, driver: Arc<dyn Driver>) -> Result<(), RouteError> {
        self.router.register(Arc::clone(&driver))?;
        driver.attach_context(Arc::clone(&self.context));
        self.stats.attach(&driver);
        info!(
            "🔗 Driver '{}' ({}) mounted at /{} -> {}",
            driver.name(),
            driver.config().kind,
            driver.prefix(),
            driver.config().target()
        );
        Ok(())
    }

    /// Start the engine and connect every driver
    pub async fn start(&self) {
        self.engine.start();
        self.router.connect_all().await;
    }

    /// Handle one command: hub namespaces first, then prefix routing
    pub fn dispatch(&self, command: &Command) -> Result<(), RouteError> {
        match split_leading_segment(&command.address) {
            Some(("fade", rest)) => self.handle_fade_command(command, rest),
            Some(("system", rest)) => self.handle_system_command(command, rest),
            _ => self.router.route(command),
        }
    }

    /// Stop the engine and close every driver
    pub async fn shutdown(&self) {
        debug!("Hub shutting down");
        self.engine.stop();
        self.router.disconnect_all().await;
    }

    pub fn status(&self) -> HubStatus {
        HubStatus {
            drivers: self.stats.snapshot(),
            devices: self.devices.snapshot(),
            active_fades: self.engine.active_count(),
            engine_running: self.engine.is_running(),
        }
    }

    pub fn engine(&self) -> &Arc<FadeEngine> {
        &self.engine
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    pub fn devices(&self) -> &DeviceStateStore {
        &self.devices
    }

    pub fn context(&self) -> &Arc<dyn HubContext> {
        &self.context
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.engine.value_signal().unsubscribe(self.value_subscription);
        self.engine.stop();
    }
}

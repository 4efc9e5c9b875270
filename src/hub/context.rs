//! Hub context - the narrow capability surface drivers use to reach the
//! fade engine's current-value table and fade lifecycle.
//!
//! Drivers only ever see `Arc<dyn HubContext>`; they never hold the engine.

use std::sync::Arc;
use tracing::debug;

use crate::fade::{Easing, FadeEngine};

/// Fade and current-value operations available to drivers
pub trait HubContext: Send + Sync {
    /// Start (or replace) a fade for `key`
    fn start_fade(
        &self,
        key: &str,
        start_hint: Option<f64>,
        end_value: f64,
        duration_ms: u64,
        easing: Easing,
    );

    /// Cancel the fade for `key`, optionally snapping to its target
    fn cancel_fade(&self, key: &str, snap_to_target: bool);

    /// Cancel every fade without emissions
    fn cancel_all_fades(&self);

    /// Record a value reported by a device
    fn set_current_value(&self, key: &str, value: f64);

    /// Last known value for `key`
    fn get_current_value(&self, key: &str) -> Option<f64>;
}

/// The hub's implementation: forwards to the engine and logs every request
/// that crosses the driver boundary
pub struct EngineContext {
    engine: Arc<FadeEngine>,
}

impl EngineContext {
    /// Wrap an engine
    pub fn new(engine: Arc<FadeEngine>) -> Self {
        Self { engine }
    }
}

impl HubContext for EngineContext {
    fn start_fade(
        &self,
        key: &str,
        start_hint: Option<f64>,
        end_value: f64,
        duration_ms: u64,
        easing: Easing,
    ) {
        debug!(
            key = key,
            end = end_value,
            duration_ms = duration_ms,
            easing = %easing,
            "context: start_fade"
        );
        self.engine
            .start_fade(key, start_hint, end_value, duration_ms, easing);
    }

    fn cancel_fade(&self, key: &str, snap_to_target: bool) {
        debug!(key = key, snap = snap_to_target, "context: cancel_fade");
        self.engine.cancel_fade(key, snap_to_target);
    }

    fn cancel_all_fades(&self) {
        debug!("context: cancel_all_fades");
        self.engine.cancel_all();
    }

    fn set_current_value(&self, key: &str, value: f64) {
        debug!(key = key, value = value, "context: set_current_value");
        self.engine.set_current_value(key, value);
    }

    fn get_current_value(&self, key: &str) -> Option<f64> {
        self.engine.get_current_value(key)
    }
}

//! Per-driver telemetry
//!
//! Stats are written only by listeners the registry attaches to a driver's
//! signals; drivers never touch their own record.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::TransportKind;
use crate::drivers::Driver;
use crate::signal::SubscriptionId;

/// Read-only snapshot of one driver's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverStats {
    pub name: String,
    pub prefix: String,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub connected: bool,
    /// Successful re-establishments after a loss; the first connect is not one
    pub reconnect_count: u64,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StatsEntry {
    stats: DriverStats,
    /// A `disconnected` was seen since the last `connected`
    seen_disconnect: bool,
    ever_connected: bool,
}

/// Subscriptions held on one driver, released by `detach`
struct Attachment {
    driver: Arc<dyn Driver>,
    ids: [SubscriptionId; 4],
}

/// Stats for every attached driver, keyed by prefix
pub struct StatsRegistry {
    entries: Arc<DashMap<String, StatsEntry>>,
    attachments: DashMap<String, Attachment>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            attachments: DashMap::new(),
        }
    }

    /// Start tracking `driver`; re-attaching replaces the previous record
    pub fn attach(&self, driver: &Arc<dyn Driver>) {
        let key = driver.prefix().to_string();
        self.detach(&key);

        let config = driver.config();
        self.entries.insert(
            key.clone(),
            StatsEntry {
                stats: DriverStats {
                    name: driver.name().to_string(),
                    prefix: key.clone(),
                    kind: config.kind,
                    host: config.host().to_string(),
                    port: config.port(),
                    connected: driver.is_connected(),
                    reconnect_count: 0,
                    last_connected: None,
                    last_disconnected: None,
                    last_message: None,
                    last_error: None,
                    last_error_at: None,
                },
                seen_disconnect: false,
                ever_connected: driver.is_connected(),
            },
        );

        let events = driver.events();

        let entries = Arc::clone(&self.entries);
        let k = key.clone();
        let connected = events.connected.subscribe(move |_| {
            if let Some(mut entry) = entries.get_mut(&k) {
                let entry = entry.value_mut();
                if entry.stats.connected {
                    return;
                }
                if entry.ever_connected && entry.seen_disconnect {
                    entry.stats.reconnect_count += 1;
                }
                entry.ever_connected = true;
                entry.seen_disconnect = false;
                entry.stats.connected = true;
                entry.stats.last_connected = Some(Utc::now());
            }
        });

        let entries = Arc::clone(&self.entries);
        let k = key.clone();
        let disconnected = events.disconnected.subscribe(move |_| {
            if let Some(mut entry) = entries.get_mut(&k) {
                let entry = entry.value_mut();
                entry.seen_disconnect = true;
                entry.stats.connected = false;
                entry.stats.last_disconnected = Some(Utc::now());
            }
        });

        let entries = Arc::clone(&self.entries);
        let k = key.clone();
        let error = events.error.subscribe(move |reason: &String| {
            if let Some(mut entry) = entries.get_mut(&k) {
                entry.stats.last_error = Some(reason.clone());
                entry.stats.last_error_at = Some(Utc::now());
            }
        });

        let entries = Arc::clone(&self.entries);
        let k = key.clone();
        let message = events.message.subscribe(move |_| {
            if let Some(mut entry) = entries.get_mut(&k) {
                entry.stats.last_message = Some(Utc::now());
            }
        });

        debug!("Stats attached to driver '{}' ({})", driver.name(), key);
        self.attachments.insert(
            key,
            Attachment {
                driver: Arc::clone(driver),
                ids: [connected, disconnected, error, message],
            },
        );
    }

    /// Stop tracking the driver under `prefix`
    pub fn detach(&self, prefix: &str) -> bool {
        self.entries.remove(prefix);
        let Some((_, attachment)) = self.attachments.remove(prefix) else {
            return false;
        };

        let events = attachment.driver.events();
        let [connected, disconnected, error, message] = attachment.ids;
        events.connected.unsubscribe(connected);
        events.disconnected.unsubscribe(disconnected);
        events.error.unsubscribe(error);
        events.message.unsubscribe(message);
        true
    }

    pub fn get(&self, prefix: &str) -> Option<DriverStats> {
        self.entries.get(prefix).map(|e| e.stats.clone())
    }

    /// All records, sorted by prefix
    pub fn snapshot(&self) -> Vec<DriverStats> {
        let mut all: Vec<DriverStats> = self.entries.iter().map(|e| e.stats.clone()).collect();
        all.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        all
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::config::DriverConfig;
    use crate::drivers::{DriverError, DriverEvents};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Driver whose signals the test fires by hand
    struct SignalOnly {
        config: DriverConfig,
        events: DriverEvents,
    }

    #[async_trait]
    impl Driver for SignalOnly {
        fn name(&self) -> &str {
            self.config.name()
        }
        fn prefix(&self) -> &str {
            self.config.prefix()
        }
        fn config(&self) -> &DriverConfig {
            &self.config
        }
        fn events(&self) -> &DriverEvents {
            &self.events
        }
        async fn connect(&self) -> Result<(), DriverError> {
            Ok(())
        }
        async fn disconnect(&self) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn handle_osc(&self, _address: &str, _args: &[Value]) {}
        fn handle_fade_tick(&self, _key: &str, _value: f64) {}
    }

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SignalOnly {
            config: DriverConfig::new(TransportKind::OscTcp, "avantis", "10.0.0.30", 51325),
            events: DriverEvents::new(),
        })
    }

    #[test]
    fn test_initial_record() {
        let registry = StatsRegistry::new();
        let d = driver();
        registry.attach(&d);

        let stats = registry.get("avantis").unwrap();
        assert_eq!(stats.name, "osc-tcp");
        assert_eq!(stats.host, "10.0.0.30");
        assert_eq!(stats.port, 51325);
        assert!(!stats.connected);
        assert_eq!(stats.reconnect_count, 0);
        assert!(stats.last_connected.is_none());
    }

    #[test]
    fn test_reconnect_count_rules() {
        let registry = StatsRegistry::new();
        let d = driver();
        registry.attach(&d);
        let events = d.events();

        // First connection is not a reconnect; a redundant one is ignored
        events.connected.emit(&());
        events.connected.emit(&());
        assert_eq!(registry.get("avantis").unwrap().reconnect_count, 0);

        events.disconnected.emit(&());
        events.disconnected.emit(&());
        events.connected.emit(&());
        let stats = registry.get("avantis").unwrap();
        assert_eq!(stats.reconnect_count, 1);
        assert!(stats.connected);
        assert!(stats.last_disconnected.is_some());

        events.disconnected.emit(&());
        events.connected.emit(&());
        assert_eq!(registry.get("avantis").unwrap().reconnect_count, 2);
    }

    #[test]
    fn test_errors_and_messages_recorded() {
        let registry = StatsRegistry::new();
        let d = driver();
        registry.attach(&d);

        d.events().error.emit(&"connection refused".to_string());
        d.events().message.emit(&Command::new("/ch/1/mute", vec![]));

        let stats = registry.get("avantis").unwrap();
        assert_eq!(stats.last_error.as_deref(), Some("connection refused"));
        assert!(stats.last_error_at.is_some());
        assert!(stats.last_message.is_some());
    }

    #[test]
    fn test_detach_unsubscribes() {
        let registry = StatsRegistry::new();
        let d = driver();
        registry.attach(&d);
        assert_eq!(d.events().connected.listener_count(), 1);

        assert!(registry.detach("avantis"));
        assert_eq!(d.events().connected.listener_count(), 0);
        assert!(registry.get("avantis").is_none());
        assert!(!registry.detach("avantis"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = StatsRegistry::new();
        registry.attach(&driver());
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json[0]["type"], "osc-tcp");
        assert_eq!(json[0]["reconnect_count"], 0);
    }
}

//! Hub command namespaces: `/fade/...` and `/system/...`
//!
//! ```text
//! /fade/<key…> <end> <duration_ms> [easing]
//! /fade/cancel/<key…> [snap]
//! /fade/cancelall
//! /system/ping | /system/status | /system/reconnect
//! ```

use tracing::{info, warn};

use super::Hub;
use crate::command::Command;
use crate::drivers::{normalize_args, numeric_value, Arg};
use crate::fade::Easing;
use crate::router::RouteError;

fn invalid(command: &Command, reason: impl Into<String>) -> RouteError {
    let err = RouteError::InvalidArguments {
        address: command.address.clone(),
        reason: reason.into(),
    };
    warn!("Dropping hub command: {}", err);
    err
}

fn is_truthy(arg: &Arg) -> bool {
    match arg {
        Arg::Int(i) => *i != 0,
        Arg::Float(f) => *f != 0.0,
        Arg::Str(s) => matches!(s.to_ascii_lowercase().as_str(), "1" | "snap" | "true" | "yes"),
    }
}

impl Hub {
    pub(super) fn handle_fade_command(
        &self,
        command: &Command,
        rest: &str,
    ) -> Result<(), RouteError> {
        let args = normalize_args(&command.args).map_err(|e| invalid(command, e.to_string()))?;

        if rest == "/cancelall" {
            let count = self.engine.active_count();
            self.context.cancel_all_fades();
            info!("⏹️  Cancelled {} fade(s)", count);
            return Ok(());
        }

        if let Some(key) = rest.strip_prefix("/cancel/") {
            let key = format!("/{}", key.trim_matches('/'));
            if key == "/" {
                return Err(invalid(command, "missing fade key"));
            }
            let snap = args.first().is_some_and(is_truthy);
            self.context.cancel_fade(&key, snap);
            return Ok(());
        }

        if rest == "/" {
            return Err(invalid(command, "missing fade key"));
        }

        // Target and duration stay f64; only the easing name needs normalizing
        let end = command
            .args
            .first()
            .and_then(numeric_value)
            .ok_or_else(|| invalid(command, "expected numeric target value"))?;
        let duration = command
            .args
            .get(1)
            .and_then(numeric_value)
            .filter(|d| *d >= 0.0)
            .ok_or_else(|| invalid(command, "expected non-negative duration_ms"))?;
        let easing = match args.get(2) {
            None => Easing::default(),
            Some(Arg::Str(name)) => name
                .parse::<Easing>()
                .map_err(|e| invalid(command, e.to_string()))?,
            Some(other) => return Err(invalid(command, format!("easing must be a name, got {}", other))),
        };

        self.context
            .start_fade(rest, None, end, duration.round() as u64, easing);
        Ok(())
    }

    pub(super) fn handle_system_command(
        &self,
        command: &Command,
        rest: &str,
    ) -> Result<(), RouteError> {
        match rest {
            "/ping" => {
                info!("🏓 pong");
                Ok(())
            },
            "/status" => {
                let status = self.status();
                info!(
                    "📊 {} driver(s), {} active fade(s), engine {}",
                    status.drivers.len(),
                    status.active_fades,
                    if status.engine_running { "running" } else { "stopped" }
                );
                for d in &status.drivers {
                    info!(
                        "  /{} {} ({}) {} reconnects={} last_error={}",
                        d.prefix,
                        d.name,
                        d.kind,
                        if d.connected { "🟢 connected" } else { "🔴 offline" },
                        d.reconnect_count,
                        d.last_error.as_deref().unwrap_or("-")
                    );
                }
                Ok(())
            },
            "/reconnect" => {
                for driver in self.router.drivers() {
                    if driver.is_connected() {
                        continue;
                    }
                    info!("🔄 Reconnecting driver '{}'", driver.name());
                    tokio::spawn(async move {
                        if let Err(e) = driver.connect().await {
                            warn!("Driver '{}' reconnect failed: {}", driver.name(), e);
                        }
                    });
                }
                Ok(())
            },
            _ => Err(invalid(command, "unknown system command")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fade::{FadeEngine, ManualClock};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn hub() -> Hub {
        let clock = Arc::new(ManualClock::new());
        Hub::with_engine(Arc::new(FadeEngine::with_clock(
            clock,
            Duration::from_millis(10),
        )))
    }

    #[test]
    fn test_fade_command_starts_fade_from_current_value() {
        let hub = hub();
        hub.engine().set_current_value("/lights/mix/3/fader", 0.2);

        hub.dispatch(&Command::new(
            "/fade/lights/mix/3/fader",
            vec![json!(0.8), json!(3000), json!("scurve")],
        ))
        .unwrap();

        let fade = hub.engine().active_fade("/lights/mix/3/fader").unwrap();
        assert_eq!(fade.start_value, 0.2);
        assert_eq!(fade.end_value, 0.8);
        assert_eq!(fade.duration, Duration::from_millis(3000));
        assert_eq!(fade.easing, Easing::SCurve);
    }

    #[test]
    fn test_fade_command_tagged_target_keeps_precision() {
        let hub = hub();
        hub.engine().set_current_value("/video/layer/1/opacity", 0.0);

        hub.dispatch(&Command::new(
            "/fade/video/layer/1/opacity",
            vec![json!({"type": "f", "value": 0.3}), json!({"type": "i", "value": 250})],
        ))
        .unwrap();

        let fade = hub.engine().active_fade("/video/layer/1/opacity").unwrap();
        assert_eq!(fade.end_value, 0.3);
        assert_eq!(fade.duration, Duration::from_millis(250));
    }

    #[test]
    fn test_fade_command_cold_start_snaps() {
        let hub = hub();
        hub.dispatch(&Command::new("/fade/obs/volume", vec![json!(1), json!(500)]))
            .unwrap();
        assert_eq!(hub.engine().active_count(), 0);
        assert_eq!(hub.engine().get_current_value("/obs/volume"), Some(1.0));
    }

    #[test]
    fn test_fade_command_validation() {
        let hub = hub();
        let bad = [
            Command::new("/fade", vec![json!(1), json!(100)]),
            Command::new("/fade/a", vec![]),
            Command::new("/fade/a", vec![json!("loud"), json!(100)]),
            Command::new("/fade/a", vec![json!(1), json!(-5)]),
            Command::new("/fade/a", vec![json!(1), json!(100), json!("wobble")]),
            Command::new("/fade/a", vec![json!(1), json!(100), json!(2)]),
            Command::new("/fade/cancel", vec![]),
        ];
        for command in &bad {
            assert!(
                matches!(hub.dispatch(command), Err(RouteError::InvalidArguments { .. })),
                "{} should be rejected",
                command
            );
        }
    }

    #[test]
    fn test_cancel_commands() {
        let hub = hub();
        for key in ["/a", "/b", "/c"] {
            hub.engine().set_current_value(key, 0.0);
            hub.dispatch(&Command::new(
                format!("/fade{}", key),
                vec![json!(1.0), json!(1000)],
            ))
            .unwrap();
        }
        assert_eq!(hub.engine().active_count(), 3);

        hub.dispatch(&Command::new("/fade/cancel/a", vec![json!("snap")]))
            .unwrap();
        assert_eq!(hub.engine().get_current_value("/a"), Some(1.0));

        hub.dispatch(&Command::new("/fade/cancel/b", vec![])).unwrap();
        assert_eq!(hub.engine().get_current_value("/b"), Some(0.0));

        hub.dispatch(&Command::new("/fade/cancelall", vec![])).unwrap();
        assert_eq!(hub.engine().active_count(), 0);
    }

    #[tokio::test]
    async fn test_system_commands() {
        let hub = hub();
        assert!(hub.dispatch(&Command::new("/system/ping", vec![])).is_ok());
        assert!(hub.dispatch(&Command::new("/system/status", vec![])).is_ok());
        assert!(hub.dispatch(&Command::new("/system/reconnect", vec![])).is_ok());
        assert!(hub.dispatch(&Command::new("/system/explode", vec![])).is_err());
    }

    #[test]
    fn test_truthy_snap_argument() {
        assert!(is_truthy(&Arg::Int(1)));
        assert!(is_truthy(&Arg::Str("TRUE".into())));
        assert!(!is_truthy(&Arg::Int(0)));
        assert!(!is_truthy(&Arg::Str("no".into())));
    }
}

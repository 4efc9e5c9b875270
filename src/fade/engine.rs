//! Fade engine - timed interpolation scheduler
//!
//! Owns the active-fade table and the current-value table. Every tick writes
//! interpolated values into the table and then emits `value` signals; fades
//! that reached their end are removed in a second pass that emits
//! `fade_complete`, so a listener always sees the terminal value first.
//!
//! ## Locking
//! All table mutations happen under one `parking_lot::Mutex`. Signals are
//! emitted after the table lock is released, so listeners may call back into
//! the engine. Computing and emitting one batch of events is serialized by a
//! reentrant emission lock: a batch computed later is never emitted before
//! an earlier one, whichever thread produced it.

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::easing::Easing;
use crate::signal::Signal;

/// Default tick cadence (100 Hz)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Payload of the `value` signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FadeValue {
    pub key: String,
    pub value: f64,
}

/// One in-flight fade
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFade {
    pub key: String,
    pub start_value: f64,
    pub end_value: f64,
    pub started_at: Instant,
    pub duration: Duration,
    pub easing: Easing,
}

impl ActiveFade {
    /// Normalized progress in `[0, 1]` at `now`
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Interpolated value at `now`
    pub fn value_at(&self, now: Instant) -> f64 {
        let eased = self.easing.apply(self.progress(now));
        self.start_value + (self.end_value - self.start_value) * eased
    }
}

/// How a `start_fade` request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeStart {
    /// No prior value (or zero duration): the target was written directly
    Snapped,
    /// A new ActiveFade now exists for the key
    Started,
}

/// Ordered output of a table operation, emitted once the lock is released
#[derive(Debug, Clone, PartialEq)]
enum FadeEvent {
    Value(FadeValue),
    Complete(String),
}

#[derive(Default)]
struct FadeTable {
    /// BTreeMap keeps per-tick emission order deterministic
    active: BTreeMap<String, ActiveFade>,
    values: HashMap<String, f64>,
}

impl FadeTable {
    fn snap(&mut self, key: &str, value: f64, events: &mut Vec<FadeEvent>) {
        self.active.remove(key);
        self.values.insert(key.to_string(), value);
        events.push(FadeEvent::Value(FadeValue {
            key: key.to_string(),
            value,
        }));
        events.push(FadeEvent::Complete(key.to_string()));
    }

    fn advance(&mut self, now: Instant) -> Vec<FadeEvent> {
        let mut events = Vec::with_capacity(self.active.len());
        let mut finished = Vec::new();

        for (key, fade) in &self.active {
            let progress = fade.progress(now);
            // Land exactly on the target rather than start + delta·1.0
            let value = if progress >= 1.0 {
                fade.end_value
            } else {
                fade.value_at(now)
            };
            self.values.insert(key.clone(), value);
            events.push(FadeEvent::Value(FadeValue {
                key: key.clone(),
                value,
            }));
            if progress >= 1.0 {
                finished.push(key.clone());
            }
        }

        for key in finished {
            self.active.remove(&key);
            events.push(FadeEvent::Complete(key));
        }

        events
    }
}

/// Timed interpolation scheduler
pub struct FadeEngine {
    table: Mutex<FadeTable>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    value_signal: Signal<FadeValue>,
    complete_signal: Signal<String>,
    timer: Mutex<Option<JoinHandle<()>>>,
    wake: Arc<Notify>,
    /// Held from computing a batch of events until it has been emitted
    emission: ReentrantMutex<()>,
}

impl FadeEngine {
    /// Create an engine on the system clock with the default cadence
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_TICK_INTERVAL)
    }

    /// Create an engine with an explicit clock and tick cadence
    pub fn with_clock(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        Self {
            table: Mutex::new(FadeTable::default()),
            clock,
            tick_interval,
            value_signal: Signal::new("value"),
            complete_signal: Signal::new("fade_complete"),
            timer: Mutex::new(None),
            wake: Arc::new(Notify::new()),
            emission: ReentrantMutex::new(()),
        }
    }

    /// `value(key, v)`: every tick for every in-flight key, and on snaps
    pub fn value_signal(&self) -> &Signal<FadeValue> {
        &self.value_signal
    }

    /// `fade_complete(key)`: once per fade, after its final value
    pub fn complete_signal(&self) -> &Signal<String> {
        &self.complete_signal
    }

    /// Tick cadence used by the timer task
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Start the interpolation timer. No-op when already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            trace!("Fade engine already running");
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.tick_interval;
        *timer = Some(tokio::spawn(run_timer(weak, period)));
        info!("Fade engine started ({}ms cadence)", period.as_millis());
    }

    /// Stop the timer and discard every active fade without completion signals
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            info!("Fade engine stopped");
        }
        let discarded = {
            let _emitting = self.emission.lock();
            let mut table = self.table.lock();
            let count = table.active.len();
            table.active.clear();
            count
        };
        if discarded > 0 {
            debug!("Discarded {} active fade(s) on stop", discarded);
        }
    }

    /// Whether the timer task is alive
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Begin a fade of `key` towards `end_value`
    ///
    /// The fade always starts from the table's current value for `key`;
    /// `start_hint` is only compared for diagnostics. A key without any
    /// known value is snapped to `end_value` (value + completion, no fade).
    /// An existing fade for the key is replaced.
    pub fn start_fade(
        &self,
        key: &str,
        start_hint: Option<f64>,
        end_value: f64,
        duration_ms: u64,
        easing: Easing,
    ) -> FadeStart {
        let _emitting = self.emission.lock();
        let now = self.clock.now();
        let mut events = Vec::new();

        let outcome = {
            let mut table = self.table.lock();
            match table.values.get(key).copied() {
                None => {
                    warn!(
                        key = key,
                        target = end_value,
                        "No known value for fade key, snapping to target"
                    );
                    table.snap(key, end_value, &mut events);
                    FadeStart::Snapped
                },
                Some(_) if duration_ms == 0 => {
                    debug!(key = key, target = end_value, "Zero-length fade, snapping");
                    table.snap(key, end_value, &mut events);
                    FadeStart::Snapped
                },
                Some(current) => {
                    if let Some(hint) = start_hint {
                        if (hint - current).abs() > f64::EPSILON {
                            trace!(
                                key = key,
                                hint = hint,
                                current = current,
                                "Ignoring start hint, fading from current value"
                            );
                        }
                    }
                    let replaced = table.active.insert(
                        key.to_string(),
                        ActiveFade {
                            key: key.to_string(),
                            start_value: current,
                            end_value,
                            started_at: now,
                            duration: Duration::from_millis(duration_ms),
                            easing,
                        },
                    );
                    debug!(
                        key = key,
                        from = current,
                        to = end_value,
                        duration_ms = duration_ms,
                        easing = %easing,
                        replaced = replaced.is_some(),
                        "Fade started"
                    );
                    FadeStart::Started
                },
            }
        };

        if outcome == FadeStart::Started {
            self.wake.notify_one();
        }
        self.emit(events);
        outcome
    }

    /// Remove the fade for `key`. With `snap_to_target` the table jumps to the
    /// fade's end value and one `value` signal fires; otherwise the last
    /// interpolated value stays. Returns whether a fade existed.
    pub fn cancel_fade(&self, key: &str, snap_to_target: bool) -> bool {
        let _emitting = self.emission.lock();
        let mut events = Vec::new();
        let removed = {
            let mut table = self.table.lock();
            let removed = table.active.remove(key);
            if let (Some(fade), true) = (&removed, snap_to_target) {
                table.values.insert(key.to_string(), fade.end_value);
                events.push(FadeEvent::Value(FadeValue {
                    key: key.to_string(),
                    value: fade.end_value,
                }));
            }
            removed.is_some()
        };

        if removed {
            debug!(key = key, snap = snap_to_target, "Fade cancelled");
        }
        self.emit(events);
        removed
    }

    /// Remove every active fade without emitting anything
    pub fn cancel_all(&self) -> usize {
        let _emitting = self.emission.lock();
        let mut table = self.table.lock();
        let count = table.active.len();
        table.active.clear();
        if count > 0 {
            debug!("Cancelled {} fade(s)", count);
        }
        count
    }

    /// Write a value reported by a device (or any other source of truth)
    pub fn set_current_value(&self, key: &str, value: f64) {
        self.table.lock().values.insert(key.to_string(), value);
        trace!(key = key, value = value, "Current value set");
    }

    /// Last known value for `key`
    pub fn get_current_value(&self, key: &str) -> Option<f64> {
        self.table.lock().values.get(key).copied()
    }

    /// Copy of the whole current-value table
    pub fn current_values(&self) -> BTreeMap<String, f64> {
        self.table
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Copy of the active fade for `key`
    pub fn active_fade(&self, key: &str) -> Option<ActiveFade> {
        self.table.lock().active.get(key).cloned()
    }

    /// Number of in-flight fades
    pub fn active_count(&self) -> usize {
        self.table.lock().active.len()
    }

    /// Advance every active fade to the clock's current instant
    pub fn tick(&self) {
        let _emitting = self.emission.lock();
        let now = self.clock.now();
        let events = self.table.lock().advance(now);
        self.emit(events);
    }

    fn emit(&self, events: Vec<FadeEvent>) {
        for event in events {
            match event {
                FadeEvent::Value(value) => {
                    trace!(key = %value.key, value = value.value, "fade value");
                    self.value_signal.emit(&value);
                },
                FadeEvent::Complete(key) => {
                    debug!(key = %key, "Fade complete");
                    self.complete_signal.emit(&key);
                },
            }
        }
    }
}

impl Default for FadeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FadeEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Timer loop: ticks at `period` while fades exist, parks otherwise
async fn run_timer(engine: Weak<FadeEngine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let wake = {
            let Some(engine) = engine.upgrade() else { break };
            if engine.active_count() > 0 {
                None
            } else {
                Some(Arc::clone(&engine.wake))
            }
        };

        if let Some(wake) = wake {
            wake.notified().await;
            interval.reset();
            continue;
        }

        interval.tick().await;
        match engine.upgrade() {
            Some(engine) => engine.tick(),
            None => break,
        }
    }
}

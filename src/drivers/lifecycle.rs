//! Shared driver lifecycle: connection state machine, outbound queue,
//! fade-tick dedup and reconnection
//!
//! Every transport variant runs through [`TransportDriver`]; a variant only
//! supplies how to open a link and how to encode a command.
//!
//! ## Ordering
//! Frames are pushed onto the link's writer channel while the state lock is
//! held, so per-driver submission order is the wire order. After a link comes
//! up the driver is in a `draining` phase: `connected` is emitted, then the
//! queue is flushed, and only then do new commands bypass the queue.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::args::{normalize_args, Arg};
use super::error::DriverError;
use super::link::{Link, LinkListener};
use super::{Driver, DriverEvents};
use crate::command::Command;
use crate::config::{DriverConfig, TransportKind};
use crate::hub::HubContext;

/// Wire-specific half of a driver
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Transport family this implementation serves
    const KIND: TransportKind;

    /// Build from a validated config
    fn from_config(config: &DriverConfig) -> Result<Self, DriverError>
    where
        Self: Sized;

    /// Open a link, spawning whatever I/O tasks it needs
    async fn open(
        &self,
        config: &DriverConfig,
        listener: Arc<dyn LinkListener>,
    ) -> Result<Link, DriverError>;

    /// Encode one command into a wire frame
    fn encode(&self, address: &str, args: &[Arg]) -> Result<Bytes, DriverError>;
}

/// Command waiting for a link
#[derive(Debug, Clone, PartialEq)]
struct QueuedCommand {
    address: String,
    args: Vec<Arg>,
}

#[derive(Default)]
struct CoreState {
    link: Option<Link>,
    /// Id of the current (or currently opening) link
    link_id: u64,
    /// Loss reported by a link before `install` ran
    early_loss: Option<String>,
    connected: bool,
    draining: bool,
    connecting: bool,
    shutdown: bool,
    /// Bumped by `disconnect()`; attempts from older sessions are discarded
    session: u64,
    queue: VecDeque<QueuedCommand>,
    /// Last fade value actually put on the wire, per key, at wire precision
    last_sent: HashMap<String, f32>,
    reconnect_pending: bool,
    reconnect_task: Option<JoinHandle<()>>,
}

struct DriverCore<T: Transport> {
    config: DriverConfig,
    transport: T,
    events: DriverEvents,
    context: RwLock<Option<Arc<dyn HubContext>>>,
    state: Mutex<CoreState>,
    next_link_id: AtomicU64,
}

/// Routes link callbacks to the core, tagged with the link they came from
struct CoreListener<T: Transport> {
    core: Weak<DriverCore<T>>,
    link_id: u64,
}

impl<T: Transport> LinkListener for CoreListener<T> {
    fn on_inbound(&self, command: Command) {
        if let Some(core) = self.core.upgrade() {
            core.handle_inbound(command);
        }
    }

    fn on_lost(&self, reason: String) {
        if let Some(core) = self.core.upgrade() {
            core.handle_link_lost(self.link_id, reason);
        }
    }
}

impl<T: Transport> DriverCore<T> {
    fn name(&self) -> &str {
        self.config.name()
    }

    /// Table key for device feedback: `/<prefix>/<address>`, whether or not
    /// the device put a leading slash on its address
    fn feedback_key(&self, address: &str) -> String {
        match address.trim_matches('/') {
            "" => format!("/{}", self.config.prefix()),
            path => format!("/{}/{}", self.config.prefix(), path),
        }
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.config.reconnect_delay_ms)
    }

    async fn connect(self: &Arc<Self>) -> Result<(), DriverError> {
        let session = {
            let mut st = self.state.lock();
            st.shutdown = false;
            if st.connected {
                debug!("Driver '{}' already connected, ignoring connect", self.name());
                return Ok(());
            }
            if st.connecting || st.reconnect_pending {
                debug!("Driver '{}' connect already in progress", self.name());
                return Ok(());
            }
            st.connecting = true;
            st.session
        };

        info!(
            "🔌 Connecting driver '{}' ({}) to {}",
            self.name(),
            T::KIND,
            self.config.target()
        );

        let result = self.open_link(session).await;
        self.state.lock().connecting = false;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Driver '{}' connect failed: {}", self.name(), e);
                self.events.error.emit(&e.to_string());
                self.schedule_reconnect();
                Err(e)
            },
        }
    }

    /// Open a link and install it. `Ok(false)` means the attempt belonged to
    /// a session that `disconnect()` has since ended.
    async fn open_link(self: &Arc<Self>, session: u64) -> Result<bool, DriverError> {
        let link_id = {
            let mut st = self.state.lock();
            st.link_id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
            st.early_loss = None;
            st.link_id
        };

        let listener: Arc<dyn LinkListener> = Arc::new(CoreListener {
            core: Arc::downgrade(self),
            link_id,
        });
        let link = self.transport.open(&self.config, listener).await?;
        self.install(session, link_id, link)
    }

    fn install(&self, session: u64, link_id: u64, link: Link) -> Result<bool, DriverError> {
        {
            let mut st = self.state.lock();
            if st.shutdown || st.session != session || st.link_id != link_id {
                debug!("Driver '{}' discarding link from a stale attempt", self.name());
                return Ok(false);
            }
            if let Some(reason) = st.early_loss.take() {
                return Err(DriverError::LinkLost(reason));
            }
            st.link = Some(link);
            st.connected = true;
            st.draining = true;
            st.reconnect_pending = false;
            // Detach; when called from the reconnect task this is its own handle
            st.reconnect_task = None;
        }

        info!("✅ Driver '{}' connected to {}", self.name(), self.config.target());
        self.events.connected.emit(&());
        self.drain_queue(link_id);
        Ok(true)
    }

    /// Replay queued commands in order, then leave the draining phase
    fn drain_queue(&self, link_id: u64) {
        let mut st = self.state.lock();
        if !st.connected || st.link_id != link_id {
            return;
        }

        let pending = st.queue.len();
        let mut sent = 0usize;
        while let Some(cmd) = st.queue.pop_front() {
            match self.transmit(st.link.as_ref(), &cmd) {
                Ok(()) => sent += 1,
                Err(DriverError::LinkClosed) => {
                    // Link died mid-drain; keep the rest for the next link
                    st.queue.push_front(cmd);
                    break;
                },
                Err(e) => warn!(
                    "Driver '{}' dropping queued {}: {}",
                    self.name(),
                    cmd.address,
                    e
                ),
            }
        }
        st.draining = false;

        if pending > 0 {
            info!(
                "📤 Driver '{}' replayed {}/{} queued command(s)",
                self.name(),
                sent,
                pending
            );
        }
    }

    fn transmit(&self, link: Option<&Link>, cmd: &QueuedCommand) -> Result<(), DriverError> {
        let link = link.ok_or(DriverError::LinkClosed)?;
        let frame = self.transport.encode(&cmd.address, &cmd.args)?;
        link.send(frame)
    }

    fn handle_osc(&self, address: &str, args: &[Value]) {
        let args = match normalize_args(args) {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    "Driver '{}' dropping {}: bad argument ({})",
                    self.name(),
                    address,
                    e
                );
                return;
            },
        };
        let cmd = QueuedCommand {
            address: address.to_string(),
            args,
        };

        let mut st = self.state.lock();
        if st.connected && !st.draining {
            match self.transmit(st.link.as_ref(), &cmd) {
                Ok(()) => trace!("Driver '{}' TX {}", self.name(), cmd.address),
                Err(DriverError::LinkClosed) => {
                    debug!("Driver '{}' link closing, queueing {}", self.name(), cmd.address);
                    st.queue.push_back(cmd);
                },
                Err(e) => warn!("Driver '{}' dropping {}: {}", self.name(), cmd.address, e),
            }
        } else {
            st.queue.push_back(cmd);
            debug!(
                "Driver '{}' offline, queued {} ({} pending)",
                self.name(),
                address,
                st.queue.len()
            );
        }
    }

    fn handle_fade_tick(&self, key: &str, value: f64) {
        let mut st = self.state.lock();
        if !st.connected || st.draining {
            trace!("Driver '{}' offline, dropping fade tick {}", self.name(), key);
            return;
        }
        let wire = value as f32;
        if st.last_sent.get(key) == Some(&wire) {
            return;
        }

        let result = self
            .transport
            .encode(key, &[Arg::Float(wire)])
            .and_then(|frame| match st.link.as_ref() {
                Some(link) => link.send(frame),
                None => Err(DriverError::LinkClosed),
            });
        match result {
            Ok(()) => {
                st.last_sent.insert(key.to_string(), wire);
            },
            Err(e) => trace!("Driver '{}' fade tick {} not sent: {}", self.name(), key, e),
        }
    }

    fn handle_inbound(&self, command: Command) {
        trace!("Driver '{}' RX {}", self.name(), command);

        // Feedback: a single numeric argument is the device's current value
        if let [arg] = command.args.as_slice() {
            let value = super::args::numeric_value(arg);
            let context = self.context.read().clone();
            if let (Some(value), Some(ctx)) = (value, context) {
                ctx.set_current_value(&self.feedback_key(&command.address), value);
            }
        }

        self.events.message.emit(&command);
    }

    fn handle_link_lost(self: &Arc<Self>, link_id: u64, reason: String) {
        let (link, shutdown) = {
            let mut st = self.state.lock();
            if st.link_id != link_id {
                return;
            }
            if st.link.is_none() {
                if st.connecting || st.reconnect_pending {
                    st.early_loss = Some(reason);
                }
                return;
            }
            st.connected = false;
            st.draining = false;
            st.last_sent.clear();
            (st.link.take(), st.shutdown)
        };
        drop(link);

        warn!("🔌 Driver '{}' lost link: {}", self.name(), reason);
        self.events.error.emit(&reason);
        self.events.disconnected.emit(&());

        if !shutdown {
            self.schedule_reconnect();
        }
    }

    /// Retry after a fixed delay until connected or `disconnect()`
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut st = self.state.lock();
        if st.shutdown || st.reconnect_pending || st.connected {
            return;
        }
        st.reconnect_pending = true;

        let session = st.session;
        let delay = self.reconnect_delay();
        debug!(
            "⏳ Driver '{}' reconnecting every {}ms",
            self.name(),
            delay.as_millis()
        );
        st.reconnect_task = Some(tokio::spawn(run_reconnect(
            Arc::downgrade(self),
            session,
            delay,
        )));
    }

    fn disconnect(&self) {
        let (link, task, was_connected) = {
            let mut st = self.state.lock();
            st.shutdown = true;
            st.session += 1;
            st.reconnect_pending = false;
            st.connecting = false;
            st.draining = false;
            st.last_sent.clear();
            let was_connected = std::mem::replace(&mut st.connected, false);
            (st.link.take(), st.reconnect_task.take(), was_connected)
        };

        if let Some(task) = task {
            task.abort();
        }
        drop(link);

        if was_connected {
            info!("🛑 Driver '{}' disconnected", self.name());
            self.events.disconnected.emit(&());
        } else {
            debug!("Driver '{}' disconnect (was not connected)", self.name());
        }
    }
}

async fn run_reconnect<T: Transport>(core: Weak<DriverCore<T>>, session: u64, delay: Duration) {
    let mut attempt: u64 = 0;
    loop {
        tokio::time::sleep(delay).await;

        let Some(core) = core.upgrade() else { return };
        {
            let st = core.state.lock();
            if st.shutdown || st.session != session || st.connected {
                return;
            }
        }

        attempt += 1;
        debug!("Driver '{}' reconnect attempt #{}", core.name(), attempt);
        match core.open_link(session).await {
            Ok(true) => {
                info!(
                    "✅ Driver '{}' reconnected after {} attempt(s)",
                    core.name(),
                    attempt
                );
                return;
            },
            Ok(false) => return,
            Err(e) => {
                debug!("Driver '{}' reconnect #{} failed: {}", core.name(), attempt, e);
                core.events.error.emit(&e.to_string());
            },
        }
    }
}

/// A driver built from a transport variant
pub struct TransportDriver<T: Transport> {
    core: Arc<DriverCore<T>>,
}

impl<T: Transport> TransportDriver<T> {
    /// Validate the config and build the transport; fails fast on bad config
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;
        let transport = T::from_config(&config)?;
        Self::with_transport(config, transport)
    }

    /// Build around an existing transport value
    pub fn with_transport(config: DriverConfig, transport: T) -> Result<Self, DriverError> {
        config.validate()?;
        if config.kind != T::KIND {
            return Err(DriverError::invalid(
                config.name(),
                format!("config type '{}' used for a '{}' driver", config.kind, T::KIND),
            ));
        }

        Ok(Self {
            core: Arc::new(DriverCore {
                config,
                transport,
                events: DriverEvents::new(),
                context: RwLock::new(None),
                state: Mutex::new(CoreState::default()),
                next_link_id: AtomicU64::new(1),
            }),
        })
    }

    /// The transport value
    pub fn transport(&self) -> &T {
        &self.core.transport
    }
}

#[async_trait]
impl<T: Transport> Driver for TransportDriver<T> {
    fn name(&self) -> &str {
        self.core.config.name()
    }

    fn prefix(&self) -> &str {
        self.core.config.prefix()
    }

    fn config(&self) -> &DriverConfig {
        &self.core.config
    }

    fn events(&self) -> &DriverEvents {
        &self.core.events
    }

    async fn connect(&self) -> Result<(), DriverError> {
        self.core.connect().await
    }

    async fn disconnect(&self) {
        self.core.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.core.state.lock().connected
    }

    fn handle_osc(&self, address: &str, args: &[Value]) {
        self.core.handle_osc(address, args);
    }

    fn handle_fade_tick(&self, key: &str, value: f64) {
        self.core.handle_fade_tick(key, value);
    }

    fn queued_len(&self) -> usize {
        self.core.state.lock().queue.len()
    }

    fn attach_context(&self, context: Arc<dyn HubContext>) {
        *self.core.context.write() = Some(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fade::FadeEngine;
    use crate::hub::EngineContext;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// In-memory transport: frames land in receivers the test drains
    #[derive(Default)]
    struct MockWire {
        opens: AtomicUsize,
        fail_opens: AtomicUsize,
        receivers: Mutex<Vec<mpsc::UnboundedReceiver<Bytes>>>,
        listener: Mutex<Option<Arc<dyn LinkListener>>>,
    }

    impl MockWire {
        fn frames(&self) -> Vec<String> {
            let mut out = Vec::new();
            for rx in self.receivers.lock().iter_mut() {
                while let Ok(frame) = rx.try_recv() {
                    out.push(String::from_utf8_lossy(&frame).into_owned());
                }
            }
            out
        }

        fn listener(&self) -> Arc<dyn LinkListener> {
            self.listener.lock().clone().expect("no link opened")
        }
    }

    struct MockTransport {
        wire: Arc<MockWire>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        const KIND: TransportKind = TransportKind::OscUdp;

        fn from_config(_config: &DriverConfig) -> Result<Self, DriverError> {
            Ok(Self {
                wire: Arc::new(MockWire::default()),
            })
        }

        async fn open(
            &self,
            config: &DriverConfig,
            listener: Arc<dyn LinkListener>,
        ) -> Result<Link, DriverError> {
            self.wire.opens.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .wire
                .fail_opens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(DriverError::Connect {
                    target: config.target(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }

            let (tx, rx) = mpsc::unbounded_channel();
            self.wire.receivers.lock().push(rx);
            *self.wire.listener.lock() = Some(listener);
            Ok(Link::new(tx, Vec::new()))
        }

        fn encode(&self, address: &str, args: &[Arg]) -> Result<Bytes, DriverError> {
            let mut line = address.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(&arg.to_string());
            }
            Ok(Bytes::from(line))
        }
    }

    fn make_driver(delay_ms: u64) -> (Arc<TransportDriver<MockTransport>>, Arc<MockWire>) {
        let wire = Arc::new(MockWire::default());
        let config = DriverConfig {
            reconnect_delay_ms: delay_ms,
            ..DriverConfig::new(TransportKind::OscUdp, "lights", "127.0.0.1", 9)
        };
        let driver = TransportDriver::with_transport(
            config,
            MockTransport {
                wire: Arc::clone(&wire),
            },
        )
        .unwrap();
        (Arc::new(driver), wire)
    }

    fn count_signal(signal: &crate::signal::Signal<()>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        signal.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_queue_replayed_in_order_exactly_once() {
        let (driver, wire) = make_driver(10);
        let connected = count_signal(&driver.events().connected);

        driver.handle_osc("/go", &[json!(1)]);
        driver.handle_osc("/level", &[json!(0.5)]);
        driver.handle_osc("/label", &[json!("intro")]);
        assert_eq!(driver.queued_len(), 3);
        assert!(!driver.is_connected());

        driver.connect().await.unwrap();
        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(driver.queued_len(), 0);
        assert_eq!(
            wire.frames(),
            vec!["/go 1", "/level 0.5", "/label \"intro\""]
        );

        // An unrelated reconnect cycle must not replay anything again
        wire.listener().on_lost("reset by peer".into());
        assert!(!driver.is_connected());
        wait_until(|| driver.is_connected()).await;
        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert!(wire.frames().is_empty());
    }

    #[tokio::test]
    async fn test_command_sent_from_connected_listener_follows_queue() {
        let (driver, wire) = make_driver(10);
        let d = Arc::clone(&driver);
        driver.events().connected.subscribe(move |_| {
            d.handle_osc("/late", &[]);
        });

        driver.handle_osc("/early", &[]);
        driver.connect().await.unwrap();

        assert_eq!(wire.frames(), vec!["/early", "/late"]);
    }

    #[tokio::test]
    async fn test_fade_ticks_deduplicated_on_wire() {
        let (driver, wire) = make_driver(10);
        driver.connect().await.unwrap();

        driver.handle_fade_tick("/mix/1", 0.5);
        driver.handle_fade_tick("/mix/1", 0.5);
        driver.handle_fade_tick("/mix/1", 0.5);
        driver.handle_fade_tick("/mix/2", 0.5);
        driver.handle_fade_tick("/mix/1", 0.75);

        assert_eq!(
            wire.frames(),
            vec!["/mix/1 0.5", "/mix/2 0.5", "/mix/1 0.75"]
        );
    }

    #[tokio::test]
    async fn test_fade_ticks_equal_at_wire_precision_sent_once() {
        let (driver, wire) = make_driver(10);
        driver.connect().await.unwrap();

        // Distinct f64 values that encode to the same f32
        driver.handle_fade_tick("/mix/1", 0.5);
        driver.handle_fade_tick("/mix/1", 0.5 + 1e-12);
        driver.handle_fade_tick("/mix/1", 0.5 - 1e-10);
        driver.handle_fade_tick("/mix/1", 0.625);

        assert_eq!(wire.frames(), vec!["/mix/1 0.5", "/mix/1 0.625"]);
    }

    #[tokio::test]
    async fn test_fade_ticks_dropped_while_disconnected() {
        let (driver, wire) = make_driver(10);

        driver.handle_fade_tick("/mix/1", 0.3);
        assert_eq!(driver.queued_len(), 0);

        driver.connect().await.unwrap();
        assert!(wire.frames().is_empty());

        // Same value after reconnect is sent again: dedup is per link
        driver.handle_fade_tick("/mix/1", 0.3);
        assert_eq!(wire.frames(), vec!["/mix/1 0.3"]);
    }

    #[tokio::test]
    async fn test_redundant_connect_is_noop() {
        let (driver, wire) = make_driver(10);
        let connected = count_signal(&driver.events().connected);

        driver.connect().await.unwrap();
        driver.connect().await.unwrap();

        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(wire.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_retries_until_success() {
        let (driver, wire) = make_driver(10);
        wire.fail_opens.store(3, Ordering::SeqCst);

        let errors = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&errors);
        driver.events().error.subscribe(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        assert!(driver.connect().await.is_err());
        wait_until(|| driver.is_connected()).await;

        assert_eq!(wire.opens.load(Ordering::SeqCst), 4);
        assert_eq!(errors.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_suppresses_reconnect_and_keeps_queue() {
        let (driver, wire) = make_driver(10);
        wire.fail_opens.store(usize::MAX, Ordering::SeqCst);

        driver.handle_osc("/held", &[json!(2)]);
        let _ = driver.connect().await;
        driver.disconnect().await;
        driver.disconnect().await;

        let opens = wire.opens.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(wire.opens.load(Ordering::SeqCst), opens);
        assert_eq!(driver.queued_len(), 1);

        wire.fail_opens.store(0, Ordering::SeqCst);
        driver.connect().await.unwrap();
        assert_eq!(wire.frames(), vec!["/held 2"]);
    }

    #[tokio::test]
    async fn test_disconnect_emits_once() {
        let (driver, _wire) = make_driver(10);
        let disconnected = count_signal(&driver.events().disconnected);

        driver.disconnect().await;
        assert_eq!(disconnected.load(Ordering::SeqCst), 0);

        driver.connect().await.unwrap();
        driver.disconnect().await;
        driver.disconnect().await;
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_arguments_drop_command() {
        let (driver, _wire) = make_driver(10);
        driver.handle_osc("/bad", &[json!(null)]);
        assert_eq!(driver.queued_len(), 0);
    }

    #[tokio::test]
    async fn test_inbound_feedback_updates_current_value() {
        let (driver, wire) = make_driver(10);
        let engine = Arc::new(FadeEngine::new());
        driver.attach_context(Arc::new(EngineContext::new(Arc::clone(&engine))));

        let messages = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&messages);
        driver
            .events()
            .message
            .subscribe(move |cmd: &Command| m.lock().push(cmd.address.clone()));

        driver.connect().await.unwrap();
        wire.listener().on_inbound(Command::new(
            "/mix/4/fader",
            vec![json!({"type": "f", "value": 0.25})],
        ));
        wire.listener()
            .on_inbound(Command::new("/scene", vec![json!("Wide")]));

        assert_eq!(engine.get_current_value("/lights/mix/4/fader"), Some(0.25));
        assert_eq!(engine.get_current_value("/lights/scene"), None);
        assert_eq!(*messages.lock(), vec!["/mix/4/fader", "/scene"]);
    }

    #[tokio::test]
    async fn test_feedback_key_joins_prefix_and_address() {
        let (driver, wire) = make_driver(10);
        let engine = Arc::new(FadeEngine::new());
        driver.attach_context(Arc::new(EngineContext::new(Arc::clone(&engine))));
        driver.connect().await.unwrap();

        wire.listener().on_inbound(Command::new("tally", vec![json!(1)]));
        wire.listener().on_inbound(Command::new("/", vec![json!(0.5)]));

        assert_eq!(engine.get_current_value("/lights/tally"), Some(1.0));
        assert_eq!(engine.get_current_value("/lightstally"), None);
        assert_eq!(engine.get_current_value("/lights"), Some(0.5));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = DriverConfig {
            host: None,
            ..DriverConfig::new(TransportKind::OscUdp, "lights", "", 0)
        };
        assert!(matches!(
            TransportDriver::<MockTransport>::new(config),
            Err(DriverError::InvalidConfig { .. })
        ));

        let wrong_kind = DriverConfig::new(TransportKind::TcpText, "cam", "h", 1);
        assert!(TransportDriver::<MockTransport>::new(wrong_kind).is_err());
    }
}

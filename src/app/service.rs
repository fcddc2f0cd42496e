//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the configuration store and every state machine.
//! It exposes a clean, hardware-agnostic API.  All I/O flows through
//! port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!    InputPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//! DatagramPort ◀─▶ │          AppService          │
//!  ConsolePort ◀─▶ │ Debounce · Power · Dispatch  │ ──▶ IndicatorPort
//!   WebRequest ──▶ │                              │ ──▶ WebReply
//!     HttpPort ◀── │ Protocol · Sync · Scheduler  │
//!                  └──────────────────────────────┘
//! ```
//!
//! ## Tick order
//!
//! 1. Inbound datagrams and console lines (at most
//!    [`MAX_INBOUND_PER_TICK`] of each).
//! 2. Debounce sampling of all channels.
//! 3. Power check and status indicator.
//! 4. Heartbeat, discovery and sync timers.
//! 5. Dispatch of this tick's activations: sampled presses in channel
//!    order, then queued remote tests in arrival order.

use log::{info, warn};
use serde_json::json;

use crate::config::{CHANNEL_COUNT, Config, ConfigPatch, Tuning};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::drivers::button::{ButtonMatrix, DebounceTiming};
use crate::drivers::channel_leds::ChannelLeds;
use crate::drivers::led_patterns::StatusIndicator;
use crate::power::{PowerManager, PowerMode, SupplyLevel};
use crate::protocol::engine::{ProtocolEngine, Rejected, apply_patch};
use crate::protocol::messages::{ConfigView, DISCOVERY_PORT, DeviceStatus};
use crate::protocol::sync::{SyncAgent, SyncOutcome};
use crate::protocol::web::{IndexInfo, MAX_BODY, WebReply, WebRequest, WebRoute, index_page};
use crate::scheduler::{Scheduler, Task};
use crate::store::{Applied, ApplyError, ConfigStore};

use super::commands::{ConsoleCommand, ConsoleResponse, HELP};
use super::events::{AppEvent, HeartbeatData};
use super::ports::{
    ConsolePort, Datagram, DatagramPort, DevicePorts, EventSink, LinkPort, StoragePort,
};

/// Remote tests waiting for the next dispatch phase.
const MAX_PENDING_TESTS: usize = 2 * CHANNEL_COUNT;
/// Datagrams, and separately console lines, handled per tick.  The rest
/// wait in their queues for later ticks.
pub const MAX_INBOUND_PER_TICK: usize = 8;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<S: StoragePort> {
    store: ConfigStore<S>,
    tuning: Tuning,
    buttons: ButtonMatrix,
    power: PowerManager,
    indicator: StatusIndicator,
    leds: ChannelLeds,
    dispatcher: Dispatcher,
    protocol: ProtocolEngine,
    sync: SyncAgent,
    scheduler: Scheduler,
    pending_tests: heapless::Vec<u8, MAX_PENDING_TESTS>,
    status_led: Option<bool>,
    started_at_ms: u64,
    tick_count: u64,
    restart_requested: bool,
    sleep_requested: bool,
}

impl<S: StoragePort> AppService<S> {
    /// Construct the service around a loaded store.
    pub fn new(store: ConfigStore<S>, tuning: Tuning, now_ms: u64) -> Self {
        let heartbeat_ms = u64::from(store.config().device.heartbeat_interval_ms);
        Self {
            buttons: ButtonMatrix::new(DebounceTiming::from(&tuning)),
            power: PowerManager::new(&tuning, now_ms),
            indicator: StatusIndicator::new(),
            leds: ChannelLeds::new(),
            dispatcher: Dispatcher::new(tuning.http_timeout_ms),
            protocol: ProtocolEngine::new(),
            sync: SyncAgent::new(tuning.http_timeout_ms),
            scheduler: Scheduler::new(&tuning, heartbeat_ms, now_ms),
            pending_tests: heapless::Vec::new(),
            status_led: None,
            started_at_ms: now_ms,
            tick_count: 0,
            restart_requested: false,
            sleep_requested: false,
            store,
            tuning,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        let config = self.store.config();
        let event = AppEvent::Started {
            device_id: config.device.device_id.clone(),
            config_hash: config.config_hash(),
        };
        info!(
            "AppService started: {} ({}) v{}",
            config.device.device_name,
            config.device.device_id,
            config.device.firmware_version()
        );
        sink.emit(&event);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// The `io` parameter satisfies every device port at once; this
    /// avoids multiple mutable borrows while keeping the port boundary
    /// explicit.
    pub fn tick(&mut self, now_ms: u64, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        self.tick_count += 1;

        // 1. Inbound requests, bounded so a flood cannot starve sampling
        for _ in 0..MAX_INBOUND_PER_TICK {
            let Some(datagram) = io.recv() else { break };
            self.handle_datagram(&datagram, now_ms, io, sink);
        }
        for _ in 0..MAX_INBOUND_PER_TICK {
            let Some(line) = io.read_line() else { break };
            if !line.trim().is_empty() {
                self.handle_console_line(&line, now_ms, io, sink);
            }
        }

        // 2. Debounce sampling
        let levels = io.read_levels();
        let sample = self.buttons.sample(&levels, now_ms);
        for fault in &sample.faults {
            warn!("AppService: {}", fault);
            sink.emit(&AppEvent::Fault(*fault));
        }

        // 3. Power check + indicator
        let due = self.scheduler.due(now_ms);
        if due.contains(&Task::PowerCheck) {
            self.read_supply(now_ms, io, sink);
        }
        let power = self.power.tick(now_ms);
        if let Some(change) = power.change {
            sink.emit(&AppEvent::PowerModeChanged(change));
        }
        if power.sleep_requested {
            self.sleep_requested = true;
            sink.emit(&AppEvent::SleepRequested);
        }
        let level = self.indicator.tick(self.power.mode(), io.is_connected(), now_ms);
        if self.status_led != Some(level) {
            io.set_status(level);
            self.status_led = Some(level);
        }

        // 4. Periodic tasks
        for task in &due {
            match task {
                Task::PowerCheck => {}
                Task::Heartbeat => self.heartbeat(now_ms, io, sink),
                Task::Discovery => self.broadcast_discovery(now_ms, io),
                Task::Sync => self.run_sync(now_ms, io, sink),
            }
        }

        // 5. Dispatch
        let mut activations: heapless::Vec<u8, { CHANNEL_COUNT + MAX_PENDING_TESTS }> =
            sample.activations.iter().map(|a| a.channel).collect();
        activations.extend(self.pending_tests.iter().copied());
        self.pending_tests.clear();
        for channel in activations {
            self.activate(channel, now_ms, io, sink);
        }

        let brightness = self.store.config().device.brightness;
        self.leds.render(now_ms, brightness, io);
    }

    // ── Inbound handling ──────────────────────────────────────

    fn handle_datagram(
        &mut self,
        datagram: &Datagram,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) {
        let status = self.device_status(io, now_ms);
        match self.protocol.handle(datagram, &mut self.store, &status) {
            Ok(handled) => {
                if let Err(e) = io.reply(&handled.reply.to_bytes(), datagram) {
                    warn!("AppService: reply to {} failed: {}", datagram.source, e);
                }
                if let Some(channel) = handled.test_channel {
                    self.queue_test(channel);
                }
                if let Some(result) = handled.applied {
                    self.after_apply(result, now_ms, sink);
                }
            }
            Err(Rejected::Announcement) => {}
            Err(Rejected::RateLimited) => {
                warn!("AppService: rate limited {}", datagram.source);
                sink.emit(&AppEvent::RateLimited {
                    source: datagram.source,
                });
            }
            Err(Rejected::Parse(reason)) => {
                warn!("AppService: dropped datagram from {}: {}", datagram.source, reason);
                sink.emit(&AppEvent::DatagramDropped {
                    source: datagram.source,
                    reason,
                });
            }
        }
    }

    /// Interpret one console line and write exactly one reply.
    pub fn handle_console_line(
        &mut self,
        line: &str,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) -> ConsoleResponse {
        let response = match ConsoleCommand::parse(line) {
            Ok(cmd) => self.handle_command(cmd, now_ms, io, sink),
            Err(e) => {
                warn!("Console: {:?}: {}", line.trim(), e);
                ConsoleResponse::parse_error(e, now_ms)
            }
        };
        io.write_line(&response.to_line());
        response
    }

    /// Answer one request from the local web interface.
    pub fn handle_web(
        &mut self,
        request: &WebRequest,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) -> WebReply {
        if request.body.len() > MAX_BODY {
            return WebReply::too_large();
        }
        match request.route() {
            WebRoute::Index => {
                let status = self.device_status(io, now_ms);
                let device = &self.store.config().device;
                let wifi = match status.ip {
                    Some(ip) => format!("Connected ({ip})"),
                    None => "Disconnected".to_string(),
                };
                WebReply::html(index_page(&IndexInfo {
                    device_name: &device.device_name,
                    device_id: &device.device_id,
                    version: device.firmware_version(),
                    wifi: &wifi,
                    battery_volts: status.battery_volts,
                    power_mode: self.power.mode().as_str(),
                }))
            }
            WebRoute::GetConfig => WebReply::json(200, &ConfigView::new(self.store.config())),
            WebRoute::PostConfig => {
                let patch = core::str::from_utf8(&request.body)
                    .ok()
                    .and_then(|text| ConfigPatch::from_json(text).ok());
                let Some(patch) = patch else {
                    warn!("Web: config upload is not valid JSON");
                    return WebReply::message(400, "Invalid JSON");
                };
                let (result, applied) = apply_patch(&mut self.store, &patch);
                self.after_apply(applied, now_ms, sink);
                WebReply::json(if result.success { 200 } else { 400 }, &result)
            }
            WebRoute::Test => {
                let Some(button) = request.param("button") else {
                    return WebReply::message(400, "Missing button parameter");
                };
                match button.trim().parse::<u8>() {
                    Ok(ch) if usize::from(ch) < CHANNEL_COUNT => {
                        if self.queue_test(ch) {
                            WebReply::message(200, &format!("Button {ch} triggered"))
                        } else {
                            WebReply::message(503, "Test queue full")
                        }
                    }
                    _ => WebReply::message(400, "Invalid button index"),
                }
            }
            WebRoute::NotFound => WebReply::not_found(),
        }
    }

    fn handle_command(
        &mut self,
        cmd: ConsoleCommand,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) -> ConsoleResponse {
        match cmd {
            ConsoleCommand::Status => {
                let status = self.device_status(io, now_ms);
                let config = self.store.config();
                let info = json!({
                    "device": config.device.device_name,
                    "device_id": config.device.device_id,
                    "version": config.device.firmware_version(),
                    "uptime": status.uptime_ms,
                    "battery": status.battery_volts,
                    "power_mode": self.power.mode().as_str(),
                    "wifi": {
                        "connected": io.is_connected(),
                        "ssid": config.network.ssid,
                        "ip": status.ip.map(|ip| ip.to_string()),
                        "rssi": status.rssi,
                    },
                });
                ConsoleResponse::ok("device_info", info.to_string(), now_ms)
            }
            ConsoleCommand::Config => {
                let view = ConfigView::new(self.store.config());
                let text = serde_json::to_string(&view).unwrap_or_default();
                ConsoleResponse::ok("config", text, now_ms)
            }
            ConsoleCommand::SetConfig(json) => match ConfigPatch::from_json(&json) {
                Ok(patch) => {
                    let (result, applied) = apply_patch(&mut self.store, &patch);
                    self.after_apply(applied, now_ms, sink);
                    let message = if result.errors.is_empty() {
                        result.message
                    } else {
                        format!("{}: {}", result.message, result.errors.join("; "))
                    };
                    ConsoleResponse {
                        kind: "config",
                        success: result.success,
                        message,
                        timestamp: now_ms,
                    }
                }
                Err(_) => ConsoleResponse::fail("config", "Invalid JSON", now_ms),
            },
            ConsoleCommand::Test(channel) => {
                if self.queue_test(channel) {
                    ConsoleResponse::ok("test", format!("Button {channel} triggered"), now_ms)
                } else {
                    ConsoleResponse::fail("test", "Test queue full", now_ms)
                }
            }
            ConsoleCommand::Wifi => match (io.is_connected(), io.local_ip()) {
                (true, Some(ip)) => ConsoleResponse::ok("wifi", format!("Connected ({ip})"), now_ms),
                (true, None) => ConsoleResponse::ok("wifi", "Connected", now_ms),
                (false, _) => ConsoleResponse::ok("wifi", "Disconnected", now_ms),
            },
            ConsoleCommand::Power => {
                self.read_supply(now_ms, io, sink);
                let message = match self.power.volts() {
                    Some(v) => format!("{v:.2}V ({})", self.power.mode()),
                    None => format!("unknown ({})", self.power.mode()),
                };
                ConsoleResponse::ok("power", message, now_ms)
            }
            ConsoleCommand::Help => {
                let text = HELP
                    .iter()
                    .map(|(usage, what)| format!("{usage} - {what}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                ConsoleResponse::ok("help", text, now_ms)
            }
            ConsoleCommand::ResetWifi => {
                let applied = self.store.apply(&ConfigPatch::clear_wifi());
                let ok = applied.is_ok();
                self.after_apply(applied, now_ms, sink);
                if ok {
                    if !self.restart_requested {
                        self.restart_requested = true;
                        sink.emit(&AppEvent::RestartRequested);
                    }
                    ConsoleResponse::ok("wifi", "WiFi credentials cleared, restarting", now_ms)
                } else {
                    ConsoleResponse::fail("wifi", "Could not clear WiFi credentials", now_ms)
                }
            }
            ConsoleCommand::Identify => {
                self.leds.identify(now_ms, self.tuning.identify_ms);
                ConsoleResponse::ok("identify", "Identifying", now_ms)
            }
        }
    }

    fn after_apply(
        &mut self,
        result: Result<Applied, ApplyError>,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) {
        match result {
            Ok(applied) => {
                let heartbeat_ms = u64::from(self.store.config().device.heartbeat_interval_ms);
                self.scheduler.set_heartbeat_interval(heartbeat_ms, now_ms);
                sink.emit(&AppEvent::ConfigApplied {
                    config_hash: applied.config_hash,
                    restart_required: applied.restart_required,
                });
                if applied.restart_required && !self.restart_requested {
                    info!("AppService: network settings changed, restart requested");
                    self.restart_requested = true;
                    sink.emit(&AppEvent::RestartRequested);
                }
            }
            Err(err) => sink.emit(&AppEvent::ConfigRejected {
                errors: err.errors().to_vec(),
            }),
        }
    }

    fn queue_test(&mut self, channel: u8) -> bool {
        if self.pending_tests.push(channel).is_err() {
            warn!("AppService: test queue full, dropping button {}", channel);
            return false;
        }
        true
    }

    // ── Periodic tasks ────────────────────────────────────────

    /// Take a supply reading.  Entering the low or critical band is
    /// announced once on the console as `BATTERY:<LEVEL>:<volts>`.
    fn read_supply(&mut self, now_ms: u64, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        let volts = io.read_voltage();
        let before = self.power.supply_level();
        if let Some(change) = self.power.record_reading(volts, now_ms) {
            sink.emit(&AppEvent::PowerModeChanged(change));
        }
        let level = self.power.supply_level();
        if level != before && level != SupplyLevel::Normal {
            io.write_line(&format!("BATTERY:{level}:{volts:.2}"));
            sink.emit(&AppEvent::SupplyAlert { level, volts });
        }
    }

    fn heartbeat(&self, now_ms: u64, io: &impl LinkPort, sink: &mut impl EventSink) {
        let device = &self.store.config().device;
        sink.emit(&AppEvent::Heartbeat(HeartbeatData {
            device_name: device.device_name.clone(),
            version: device.firmware_version(),
            uptime_ms: self.uptime_ms(now_ms),
            battery_volts: self.power.volts(),
            mode: self.power.mode(),
            link_up: io.is_connected(),
            ip: io.local_ip(),
        }));
    }

    fn broadcast_discovery(&self, now_ms: u64, io: &mut (impl LinkPort + DatagramPort)) {
        let discoverable = self.store.config().device.discoverable;
        if !discoverable || !io.is_connected() || self.power.mode() == PowerMode::Critical {
            return;
        }
        let status = self.device_status(io, now_ms);
        let payload = ProtocolEngine::announcement(&self.store, &status).to_bytes();
        match io.broadcast(&payload, DISCOVERY_PORT) {
            Ok(()) => info!("AppService: discovery broadcast sent"),
            Err(e) => warn!("AppService: discovery broadcast failed: {}", e),
        }
    }

    fn run_sync(&mut self, now_ms: u64, io: &mut impl DevicePorts, sink: &mut impl EventSink) {
        let allowed = io.is_connected() && self.power.mode() != PowerMode::Critical;
        let (config_hash, outcome) = self.sync.run(self.store.config(), allowed, now_ms, io);
        if !matches!(outcome, SyncOutcome::NotAttempted | SyncOutcome::Unchanged) {
            sink.emit(&AppEvent::Sync {
                config_hash,
                outcome,
            });
        }
    }

    // ── Dispatch ──────────────────────────────────────────────

    fn activate(
        &mut self,
        channel: u8,
        now_ms: u64,
        io: &mut impl DevicePorts,
        sink: &mut impl EventSink,
    ) {
        if let Some(change) = self.power.note_activity(now_ms) {
            sink.emit(&AppEvent::PowerModeChanged(change));
        }
        let name = self
            .store
            .config()
            .channels
            .get(usize::from(channel))
            .map(|c| c.name.clone())
            .unwrap_or_default();
        info!("Button {} ({}) pressed", channel, name);
        io.write_line(&format!(
            "EVENT:{}",
            json!({ "type": "button_press", "button": channel, "name": name, "timestamp": now_ms })
        ));
        sink.emit(&AppEvent::ButtonPressed { channel, name });

        let ctx = DispatchContext {
            config: self.store.config(),
            battery_volts: self.power.volts(),
            now_ms,
        };
        let outcome = self.dispatcher.dispatch(channel, &ctx, &mut self.leds, io);
        sink.emit(&AppEvent::Dispatched { channel, outcome });
    }

    // ── Queries ───────────────────────────────────────────────

    fn device_status(&self, io: &impl LinkPort, now_ms: u64) -> DeviceStatus {
        let linked = io.is_connected();
        DeviceStatus {
            ip: io.local_ip().filter(|_| linked),
            mac: io.mac(),
            battery_volts: self.power.volts(),
            uptime_ms: self.uptime_ms(now_ms),
            rssi: io.rssi().filter(|_| linked),
        }
    }

    pub fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }

    /// The live configuration record.
    pub fn config(&self) -> &Config {
        self.store.config()
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    pub fn power_mode(&self) -> PowerMode {
        self.power.mode()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Hash the sync server last acknowledged.
    pub fn last_synced_hash(&self) -> Option<&str> {
        self.sync.last_synced()
    }

    /// Returns `true` once per restart request.  The caller performs it.
    pub fn take_restart_request(&mut self) -> bool {
        core::mem::take(&mut self.restart_requested)
    }

    /// Returns `true` once per sleep request.  The caller decides.
    pub fn take_sleep_request(&mut self) -> bool {
        core::mem::take(&mut self.sleep_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    #[test]
    fn new_service_reports_defaults() {
        let store = ConfigStore::load(NvsAdapter::new().unwrap(), "PATCOM-EFCAFE");
        let mut app = AppService::new(store, Tuning::default(), 1_000);
        assert_eq!(app.power_mode(), PowerMode::Active);
        assert_eq!(app.tick_count(), 0);
        assert_eq!(app.uptime_ms(4_000), 3_000);
        assert_eq!(app.config().device.device_id, "PATCOM-EFCAFE");
        assert!(!app.take_restart_request());
        assert!(!app.take_sleep_request());
    }
}

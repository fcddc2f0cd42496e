//! PATCOM Firmware: Main Entry Point
//!
//! Hexagonal architecture driven by a single cooperative control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   WifiAdapter   UdpAdapter   HttpAdapter      │
//! │  (Input+LEDs+ADC)  (LinkPort)    (Datagram)   (HttpPort)       │
//! │  ConsoleAdapter    NvsAdapter    LogEventSink MdnsAdapter      │
//! │  WebServer (httpd, bridged into the loop)                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Debounce · Power · Dispatch · Protocol · Sync         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::gpio::{IOPin, PinDriver, Pull};
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use log::{info, warn};

use patcom::adapters::board::Board;
use patcom::adapters::console::ConsoleAdapter;
use patcom::adapters::device_id;
use patcom::adapters::hardware::HardwareAdapter;
use patcom::adapters::http::HttpAdapter;
use patcom::adapters::log_sink::LogEventSink;
use patcom::adapters::mdns::MdnsAdapter;
use patcom::adapters::nvs::NvsAdapter;
use patcom::adapters::time::MonotonicClock;
use patcom::adapters::udp::UdpAdapter;
use patcom::adapters::web::{WEB_BRIDGE, WebServer};
use patcom::adapters::wifi::WifiAdapter;
use patcom::app::ports::LinkPort;
use patcom::app::service::{AppService, MAX_INBOUND_PER_TICK};
use patcom::config::{CHANNEL_COUNT, Tuning};
use patcom::drivers::{hw_init, watchdog::Watchdog};
use patcom::power::PowerMode;
use patcom::protocol::messages::{CONFIG_PORT, DISCOVERY_PORT};
use patcom::store::ConfigStore;

/// Longest tick is one bounded outbound call plus slack.
const WATCHDOG_TIMEOUT_MS: u32 = 10_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PATCOM v{}                          ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    hw_init::init_peripherals()?;

    // ── 2. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    let dev_hostname = device_id::hostname(&mac);
    info!("Device ID: {} (hostname: {})", dev_id, dev_hostname);

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let store = ConfigStore::load(nvs, &dev_id);

    // ── 4. Construct adapters ─────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // Same order as pins::BUTTON_GPIOS.
    let button_pins = [
        peripherals.pins.gpio2.downgrade(),
        peripherals.pins.gpio3.downgrade(),
        peripherals.pins.gpio4.downgrade(),
        peripherals.pins.gpio5.downgrade(),
        peripherals.pins.gpio6.downgrade(),
        peripherals.pins.gpio7.downgrade(),
        peripherals.pins.gpio8.downgrade(),
        peripherals.pins.gpio9.downgrade(),
    ];
    let mut buttons = Vec::with_capacity(CHANNEL_COUNT);
    for pin in button_pins {
        let mut driver = PinDriver::input(pin)?;
        driver.set_pull(Pull::Up)?;
        buttons.push(driver);
    }
    let buttons: [_; CHANNEL_COUNT] = buttons
        .try_into()
        .map_err(|_| anyhow!("expected {CHANNEL_COUNT} button inputs"))?;

    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop, mac)?;
    if let Err(e) = wifi.configure(&store.config().network) {
        warn!("WiFi: {}", e);
    }
    wifi.connect();

    let mut mdns = MdnsAdapter::new(dev_hostname, dev_id, store.config().device.device_type);
    mdns.sync_with_link(wifi.is_connected());

    let mut board = Board {
        hardware: HardwareAdapter::new(buttons),
        wifi,
        udp: UdpAdapter::bind(DISCOVERY_PORT, CONFIG_PORT)?,
        http: HttpAdapter::new(),
        console: ConsoleAdapter::spawn()?,
    };
    let mut log_sink = LogEventSink::new();
    let clock = MonotonicClock::new();

    // ── 5. Construct app service ──────────────────────────────
    let mut app = AppService::new(store, Tuning::default(), clock.uptime_ms());
    app.start(&mut log_sink);

    let _web = WebServer::start(&WEB_BRIDGE)?;

    let watchdog = Watchdog::subscribe(WATCHDOG_TIMEOUT_MS);
    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    let mut profile_mode = None;
    loop {
        let now_ms = clock.uptime_ms();

        board.wifi.poll(now_ms);
        mdns.sync_with_link(board.wifi.is_connected());

        app.tick(now_ms, &mut board, &mut log_sink);
        for _ in 0..MAX_INBOUND_PER_TICK {
            let Some(pending) = WEB_BRIDGE.next_request() else {
                break;
            };
            let reply = app.handle_web(&pending.request, now_ms, &mut board, &mut log_sink);
            WEB_BRIDGE.respond(pending.id, reply);
        }
        watchdog.feed();

        let mode = app.power_mode();
        if profile_mode != Some(mode) {
            apply_power_profile(mode, &mut board.wifi);
            profile_mode = Some(mode);
        }

        if app.take_restart_request() {
            info!("Restarting to apply network settings");
            mdns.stop();
            std::thread::sleep(Duration::from_millis(500));
            // SAFETY: esp_restart never returns; nothing is held across it.
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        if app.take_sleep_request() {
            mdns.stop();
            hw_init::enter_deep_sleep();
        }

        let period = mode.profile().loop_period_ms;
        let elapsed = clock.uptime_ms().saturating_sub(now_ms);
        std::thread::sleep(Duration::from_millis(period.saturating_sub(elapsed)));
    }
}

/// Apply the CPU clock and WiFi power-save settings for `mode`.
fn apply_power_profile(mode: PowerMode, wifi: &mut WifiAdapter) {
    let profile = mode.profile();
    if let Err(e) = hw_init::set_cpu_frequency(profile.cpu_mhz) {
        warn!("Power: {} (CPU clock unchanged)", e);
    }
    wifi.set_modem_sleep(profile.modem_sleep);
    info!(
        "Power: {} profile ({} MHz, modem sleep {}, loop {} ms)",
        mode,
        profile.cpu_mhz,
        if profile.modem_sleep { "on" } else { "off" },
        profile.loop_period_ms
    );
}

//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Heartbeat(h) => {
                info!(
                    "HEART | {} v{} | up={}s | batt={} | mode={} | link={} ip={}",
                    h.device_name,
                    h.version,
                    h.uptime_ms / 1000,
                    h.battery_volts.map_or_else(|| "n/a".into(), |v| format!("{v:.2}V")),
                    h.mode,
                    if h.link_up { "UP" } else { "DOWN" },
                    h.ip.map_or_else(|| "-".into(), |ip| ip.to_string()),
                );
            }
            AppEvent::Started { device_id, config_hash } => {
                info!("START | id={} config={}", device_id, config_hash);
            }
            AppEvent::ButtonPressed { channel, name } => {
                info!("PRESS | button={} name={:?}", channel, name);
            }
            AppEvent::Dispatched { channel, outcome } => {
                info!("ACTION | button={} {}", channel, outcome);
            }
            AppEvent::PowerModeChanged(change) => {
                info!("POWER | {} -> {}", change.from, change.to);
            }
            AppEvent::SupplyAlert { level, volts } => {
                warn!("POWER | battery {} ({:.2}V)", level, volts);
            }
            AppEvent::SleepRequested => info!("POWER | sleep requested"),
            AppEvent::Fault(fault) => warn!("FAULT | {}", fault),
            AppEvent::ConfigApplied {
                config_hash,
                restart_required,
            } => {
                info!("CONFIG | applied hash={} restart={}", config_hash, restart_required);
            }
            AppEvent::ConfigRejected { errors } => {
                warn!("CONFIG | rejected ({} errors)", errors.len());
                for e in errors {
                    warn!("CONFIG |   {}", e);
                }
            }
            AppEvent::RestartRequested => info!("SYSTEM | restart requested"),
            AppEvent::Sync { config_hash, outcome } => {
                info!("SYNC | hash={} {}", config_hash, outcome);
            }
            AppEvent::DatagramDropped { source, reason } => {
                warn!("NET | dropped datagram from {}: {}", source, reason);
            }
            AppEvent::RateLimited { source } => warn!("NET | rate limited {}", source),
        }
    }
}

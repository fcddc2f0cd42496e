//! Power mode supervisor.
//!
//! Tracks user activity and supply voltage and derives the device power
//! mode from them.  Runs once per control tick after input sampling.
//!
//! ```text
//!            inactivity ≥ window
//!   Active ─────────────────────────▶ LowPower
//!     ▲  ◀───────────────────────────   │
//!     │        any activation           │
//!     │                                 │
//!     │   volts ≥ critical + margin     │ volts < critical
//!     └──────────── Critical ◀──────────┘ (from either mode)
//! ```
//!
//! Critical is latched with hysteresis so a supply hovering at the
//! threshold does not flap.  While Critical, activity is still recorded
//! but the mode only leaves Critical on a recovered reading.
//!
//! A second, higher threshold marks the supply [`SupplyLevel::Low`].  It
//! is a warning only and uses the same hysteresis margin.

use core::fmt;

use log::{info, warn};

use crate::config::Tuning;

/// ADC full-scale count (12-bit).
const ADC_FULL_SCALE: f32 = 4095.0;
/// ADC reference voltage.
const ADC_REF_VOLTS: f32 = 3.3;
/// Battery divider ratio (133k / 33k).
const DIVIDER_RATIO: f32 = 4.03;

/// Convert a raw 12-bit ADC count on the battery divider to volts.
pub fn adc_to_volts(raw: u16) -> f32 {
    f32::from(raw) / ADC_FULL_SCALE * ADC_REF_VOLTS * DIVIDER_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Active,
    LowPower,
    Critical,
}

impl PowerMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::LowPower => "low_power",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime settings the firmware applies for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerProfile {
    /// Control loop period.  Never above 50 ms so the indicator keeps time.
    pub loop_period_ms: u64,
    pub cpu_mhz: u32,
    /// WiFi modem sleep between beacons.
    pub modem_sleep: bool,
}

impl PowerMode {
    pub const fn profile(self) -> PowerProfile {
        match self {
            Self::Active => PowerProfile {
                loop_period_ms: 10,
                cpu_mhz: 240,
                modem_sleep: false,
            },
            Self::LowPower | Self::Critical => PowerProfile {
                loop_period_ms: 50,
                cpu_mhz: 80,
                modem_sleep: true,
            },
        }
    }
}

/// Supply classification, independent of the activity-driven mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyLevel {
    Normal,
    /// Below the warning threshold; the device keeps running normally.
    Low,
    Critical,
}

impl SupplyLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for SupplyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub from: PowerMode,
    pub to: PowerMode,
}

/// Output of [`PowerManager::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerTick {
    pub change: Option<ModeChange>,
    /// Inactivity passed the sleep timeout.  Reported once per idle period.
    pub sleep_requested: bool,
}

pub struct PowerManager {
    mode: PowerMode,
    inactivity_ms: u64,
    sleep_timeout_ms: u64,
    critical_volts: f32,
    exit_volts: f32,
    low_volts: f32,
    low_exit_volts: f32,
    last_activity_ms: u64,
    last_volts: Option<f32>,
    critical: bool,
    low: bool,
    sleep_reported: bool,
}

impl PowerManager {
    pub fn new(tuning: &Tuning, now_ms: u64) -> Self {
        Self {
            mode: PowerMode::Active,
            inactivity_ms: tuning.inactivity_ms,
            sleep_timeout_ms: tuning.sleep_timeout_ms,
            critical_volts: tuning.critical_volts,
            exit_volts: tuning.critical_volts + tuning.critical_exit_margin_volts,
            low_volts: tuning.low_battery_volts,
            low_exit_volts: tuning.low_battery_volts + tuning.critical_exit_margin_volts,
            last_activity_ms: now_ms,
            last_volts: None,
            critical: false,
            low: false,
            sleep_reported: false,
        }
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    /// Most recent supply reading, if one has been taken.
    pub fn volts(&self) -> Option<f32> {
        self.last_volts
    }

    pub fn supply_level(&self) -> SupplyLevel {
        if self.critical {
            SupplyLevel::Critical
        } else if self.low {
            SupplyLevel::Low
        } else {
            SupplyLevel::Normal
        }
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// Record user activity (an activation or an explicit request).
    pub fn note_activity(&mut self, now_ms: u64) -> Option<ModeChange> {
        self.last_activity_ms = now_ms;
        self.sleep_reported = false;
        self.update(now_ms)
    }

    /// Record a supply voltage reading.  Non-finite readings are ignored.
    pub fn record_reading(&mut self, volts: f32, now_ms: u64) -> Option<ModeChange> {
        if !volts.is_finite() {
            warn!("PowerManager: ignoring non-finite reading");
            return None;
        }
        self.last_volts = Some(volts);
        if volts < self.critical_volts {
            if !self.critical {
                warn!("PowerManager: supply critical ({:.2} V)", volts);
            }
            self.critical = true;
        } else if self.critical && volts >= self.exit_volts {
            info!("PowerManager: supply recovered ({:.2} V)", volts);
            self.critical = false;
        }
        if volts < self.low_volts {
            self.low = true;
        } else if volts >= self.low_exit_volts {
            self.low = false;
        }
        self.update(now_ms)
    }

    /// Re-evaluate inactivity timers.
    pub fn tick(&mut self, now_ms: u64) -> PowerTick {
        let change = self.update(now_ms);
        let idle = now_ms.saturating_sub(self.last_activity_ms);
        let sleep_requested = !self.sleep_reported && idle >= self.sleep_timeout_ms;
        if sleep_requested {
            self.sleep_reported = true;
            info!("PowerManager: idle {} ms, sleep requested", idle);
        }
        PowerTick {
            change,
            sleep_requested,
        }
    }

    fn update(&mut self, now_ms: u64) -> Option<ModeChange> {
        let target = if self.critical {
            PowerMode::Critical
        } else if now_ms.saturating_sub(self.last_activity_ms) >= self.inactivity_ms {
            PowerMode::LowPower
        } else {
            PowerMode::Active
        };
        if target == self.mode {
            return None;
        }
        let change = ModeChange {
            from: self.mode,
            to: target,
        };
        info!("PowerManager: {} -> {}", change.from, change.to);
        self.mode = target;
        Some(change)
    }
}

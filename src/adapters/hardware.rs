//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the eight button inputs, the channel and status LEDs and the
//! battery sense divider, exposing them through [`InputPort`],
//! [`IndicatorPort`] and [`PowerSensePort`].  Buttons are any
//! `embedded_hal` [`InputPin`]; LEDs and the ADC go through `hw_init`,
//! which compiles to simulation stubs off-target.

use embedded_hal::digital::InputPin;

use crate::app::ports::{IndicatorPort, InputPort, PowerSensePort};
use crate::config::CHANNEL_COUNT;
use crate::drivers::hw_init;
use crate::pins;
use crate::power::adc_to_volts;

/// Concrete adapter that combines all panel hardware behind port traits.
pub struct HardwareAdapter<P: InputPin> {
    buttons: [P; CHANNEL_COUNT],
    status: bool,
    channel_levels: [u8; CHANNEL_COUNT],
}

impl<P: InputPin> HardwareAdapter<P> {
    /// `buttons` are wired active-low with pull-ups, channel 0 first.
    pub fn new(buttons: [P; CHANNEL_COUNT]) -> Self {
        Self {
            buttons,
            status: false,
            channel_levels: [0; CHANNEL_COUNT],
        }
    }

    pub fn status_led(&self) -> bool {
        self.status
    }

    pub fn channel_level(&self, index: usize) -> Option<u8> {
        self.channel_levels.get(index).copied()
    }
}

// ── InputPort implementation ──────────────────────────────────

impl<P: InputPin> InputPort for HardwareAdapter<P> {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT] {
        // A pin that cannot be read counts as released.
        core::array::from_fn(|i| self.buttons[i].is_low().unwrap_or(false))
    }
}

// ── IndicatorPort implementation ──────────────────────────────

impl<P: InputPin> IndicatorPort for HardwareAdapter<P> {
    fn set_status(&mut self, on: bool) {
        hw_init::gpio_write(pins::STATUS_LED_GPIO, on);
        self.status = on;
    }

    fn set_channel(&mut self, index: u8, level: u8) {
        let Some(slot) = self.channel_levels.get_mut(usize::from(index)) else {
            return;
        };
        hw_init::ledc_set(u32::from(index), level);
        *slot = level;
    }
}

// ── PowerSensePort implementation ─────────────────────────────

impl<P: InputPin> PowerSensePort for HardwareAdapter<P> {
    fn read_voltage(&mut self) -> f32 {
        adc_to_volts(hw_init::adc1_read(pins::BATTERY_ADC_CHANNEL))
    }
}

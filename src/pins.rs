//! GPIO / peripheral pin assignments for the PATCOM main board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

use crate::config::CHANNEL_COUNT;

// ---------------------------------------------------------------------------
// Buttons (active-low, internal pull-up)
// ---------------------------------------------------------------------------

/// Momentary push-buttons, channel 0 first.
pub const BUTTON_GPIOS: [i32; CHANNEL_COUNT] = [2, 3, 4, 5, 6, 7, 8, 9];

/// Button used to wake from deep sleep (channel 0).
pub const WAKE_GPIO: i32 = BUTTON_GPIOS[0];

// ---------------------------------------------------------------------------
// Channel LEDs (LEDC PWM, one channel each)
// ---------------------------------------------------------------------------

pub const CHANNEL_LED_GPIOS: [i32; CHANNEL_COUNT] = [10, 11, 12, 14, 15, 16, 17, 18];

// ---------------------------------------------------------------------------
// Status LED (discrete, active HIGH)
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Battery sense: 4.03:1 resistive divider into ADC1
// ---------------------------------------------------------------------------

/// ADC1 channel 0 (GPIO 1 on ESP32-S3).
pub const BATTERY_ADC_GPIO: i32 = 1;
pub const BATTERY_ADC_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC frequency for the channel LEDs (1 kHz, flicker-free).
pub const LED_PWM_FREQ_HZ: u32 = 1_000;

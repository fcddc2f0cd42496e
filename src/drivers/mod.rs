//! Panel drivers: input debouncing, LED state, peripheral init and watchdog.

pub mod button;
pub mod channel_leds;
pub mod hw_init;
pub mod led_patterns;
pub mod watchdog;

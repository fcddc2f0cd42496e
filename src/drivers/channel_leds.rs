//! Per-channel feedback LEDs.
//!
//! Each channel LED is either steady (on/off, flipped by every
//! activation) or running the failure flash.  Identify overrides all
//! channels with a common blink for a fixed window.  Levels are derived
//! from elapsed time on every [`ChannelLeds::render`]; output is scaled by
//! the configured brightness and only written when it changes.

use crate::app::ports::IndicatorPort;
use crate::config::CHANNEL_COUNT;

/// Failure flash: three on/off pulses of this length, then off.
const ERROR_FLASH_STEP_MS: u64 = 100;
const ERROR_FLASH_PULSES: u64 = 3;
const IDENTIFY_STEP_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedState {
    Steady(bool),
    ErrorFlash { since_ms: u64 },
}

pub struct ChannelLeds {
    states: [LedState; CHANNEL_COUNT],
    identify: Option<(u64, u64)>,
    written: [Option<u8>; CHANNEL_COUNT],
}

impl Default for ChannelLeds {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelLeds {
    pub fn new() -> Self {
        Self {
            states: [LedState::Steady(false); CHANNEL_COUNT],
            identify: None,
            written: [None; CHANNEL_COUNT],
        }
    }

    /// Flip a channel's steady level.  A running error flash counts as off.
    pub fn toggle(&mut self, index: u8) {
        if let Some(state) = self.states.get_mut(usize::from(index)) {
            let on = matches!(state, LedState::Steady(true));
            *state = LedState::Steady(!on);
        }
    }

    pub fn set(&mut self, index: u8, on: bool) {
        if let Some(state) = self.states.get_mut(usize::from(index)) {
            *state = LedState::Steady(on);
        }
    }

    pub fn start_error_flash(&mut self, index: u8, now_ms: u64) {
        if let Some(state) = self.states.get_mut(usize::from(index)) {
            *state = LedState::ErrorFlash { since_ms: now_ms };
        }
    }

    /// Blink every channel together for `duration_ms`.
    pub fn identify(&mut self, now_ms: u64, duration_ms: u64) {
        self.identify = Some((now_ms, now_ms.saturating_add(duration_ms)));
    }

    pub fn is_identifying(&self, now_ms: u64) -> bool {
        self.identify.is_some_and(|(_, until)| now_ms < until)
    }

    /// Logical level of one channel at `now_ms`.
    pub fn level(&self, index: u8, now_ms: u64) -> bool {
        if let Some((start, until)) = self.identify {
            if now_ms < until {
                return (now_ms.saturating_sub(start) / IDENTIFY_STEP_MS) % 2 == 0;
            }
        }
        match self.states.get(usize::from(index)) {
            Some(LedState::Steady(on)) => *on,
            Some(LedState::ErrorFlash { since_ms }) => {
                let step = now_ms.saturating_sub(*since_ms) / ERROR_FLASH_STEP_MS;
                step < ERROR_FLASH_PULSES * 2 && step % 2 == 0
            }
            None => false,
        }
    }

    /// Push current levels to the hardware, scaled by `brightness`.
    pub fn render(&mut self, now_ms: u64, brightness: u8, out: &mut impl IndicatorPort) {
        if self.identify.is_some_and(|(_, until)| now_ms >= until) {
            self.identify = None;
        }
        for index in 0..CHANNEL_COUNT as u8 {
            let value = if self.level(index, now_ms) { brightness } else { 0 };
            let slot = &mut self.written[usize::from(index)];
            if *slot != Some(value) {
                out.set_channel(index, value);
                *slot = Some(value);
            }
        }
        // Finished flashes settle to steady off.
        for state in &mut self.states {
            if let LedState::ErrorFlash { since_ms } = *state {
                if now_ms.saturating_sub(since_ms) >= ERROR_FLASH_STEP_MS * ERROR_FLASH_PULSES * 2 {
                    *state = LedState::Steady(false);
                }
            }
        }
    }
}

//! Per-channel button debouncer.
//!
//! ## Hardware
//!
//! Active-low momentary switches with pull-ups, one per channel.  The
//! control loop samples every channel once per tick (≤ 10 ms) and feeds
//! the levels into [`ButtonMatrix::sample`].
//!
//! ## State machine (per channel)
//!
//! | From      | Condition                                              | To        | Output       |
//! |-----------|--------------------------------------------------------|-----------|--------------|
//! | Released  | level active                                           | Pressing  | none         |
//! | Pressing  | idle before hold time                                  | Released  | none (noise) |
//! | Pressing  | active ≥ hold AND ≥ debounce since last activation     | Activated | `Activation` |
//! | Activated | idle continuously ≥ debounce                           | Released  | none         |
//! | any press | active ≥ stuck timeout                                 | Released  | `StuckInput` |
//!
//! After a stuck reset the channel ignores the active level until it has
//! been observed idle, so a pinned input cannot re-fire.

use crate::config::{CHANNEL_COUNT, Tuning};
use crate::error::HardwareFault;

/// A debounced press on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub channel: u8,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTiming {
    pub hold_ms: u64,
    pub debounce_ms: u64,
    pub stuck_timeout_ms: u64,
}

impl From<&Tuning> for DebounceTiming {
    fn from(t: &Tuning) -> Self {
        Self {
            hold_ms: t.hold_ms,
            debounce_ms: t.debounce_ms,
            stuck_timeout_ms: t.stuck_timeout_ms,
        }
    }
}

impl Default for DebounceTiming {
    fn default() -> Self {
        Self::from(&Tuning::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressState {
    Released,
    Pressing,
    Activated { idle_since_ms: Option<u64> },
}

/// What one sample produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutput {
    Nothing,
    Activated(Activation),
    Fault(HardwareFault),
}

#[derive(Debug, Clone)]
pub struct ChannelDebouncer {
    channel: u8,
    state: PressState,
    raw_level: bool,
    press_started_at: Option<u64>,
    last_activation_at: Option<u64>,
    /// Set by a stuck reset; cleared once the input reads idle.
    latched: bool,
}

impl ChannelDebouncer {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            state: PressState::Released,
            raw_level: false,
            press_started_at: None,
            last_activation_at: None,
            latched: false,
        }
    }

    pub fn state(&self) -> PressState {
        self.state
    }

    pub fn raw_level(&self) -> bool {
        self.raw_level
    }

    /// `true` while the channel is in a confirmed press.
    pub fn debounced_level(&self) -> bool {
        matches!(self.state, PressState::Activated { .. })
    }

    pub fn last_activation_at(&self) -> Option<u64> {
        self.last_activation_at
    }

    /// Feed one raw sample.  `now_ms` must be monotonic.
    pub fn sample(&mut self, active: bool, now_ms: u64, timing: &DebounceTiming) -> SampleOutput {
        self.raw_level = active;

        if !active {
            self.latched = false;
        } else if let Some(start) = self.press_started_at {
            if now_ms.saturating_sub(start) >= timing.stuck_timeout_ms {
                self.reset();
                self.latched = true;
                return SampleOutput::Fault(HardwareFault::StuckInput { channel: self.channel });
            }
        }

        match self.state {
            PressState::Released => {
                if active && !self.latched {
                    self.state = PressState::Pressing;
                    self.press_started_at = Some(now_ms);
                }
                SampleOutput::Nothing
            }

            PressState::Pressing => {
                let Some(start) = self.press_started_at.filter(|_| active) else {
                    self.reset();
                    return SampleOutput::Nothing;
                };
                let held = now_ms.saturating_sub(start);
                let spaced = self
                    .last_activation_at
                    .is_none_or(|last| now_ms.saturating_sub(last) >= timing.debounce_ms);
                if held >= timing.hold_ms && spaced {
                    self.state = PressState::Activated { idle_since_ms: None };
                    self.last_activation_at = Some(now_ms);
                    return SampleOutput::Activated(Activation {
                        channel: self.channel,
                        at_ms: now_ms,
                    });
                }
                SampleOutput::Nothing
            }

            PressState::Activated { idle_since_ms } => {
                if active {
                    self.state = PressState::Activated { idle_since_ms: None };
                } else {
                    let since = idle_since_ms.unwrap_or(now_ms);
                    if now_ms.saturating_sub(since) >= timing.debounce_ms {
                        self.reset();
                    } else {
                        self.state = PressState::Activated {
                            idle_since_ms: Some(since),
                        };
                    }
                }
                SampleOutput::Nothing
            }
        }
    }

    fn reset(&mut self) {
        self.state = PressState::Released;
        self.press_started_at = None;
    }
}

/// Activations and faults from one sampling pass, in channel order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatrixSample {
    pub activations: heapless::Vec<Activation, CHANNEL_COUNT>,
    pub faults: heapless::Vec<HardwareFault, CHANNEL_COUNT>,
}

impl MatrixSample {
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty() && self.faults.is_empty()
    }
}

/// All eight debouncers.  Channels never influence each other.
pub struct ButtonMatrix {
    channels: [ChannelDebouncer; CHANNEL_COUNT],
    timing: DebounceTiming,
}

impl ButtonMatrix {
    pub fn new(timing: DebounceTiming) -> Self {
        Self {
            channels: core::array::from_fn(|i| ChannelDebouncer::new(i as u8)),
            timing,
        }
    }

    pub fn sample(&mut self, levels: &[bool; CHANNEL_COUNT], now_ms: u64) -> MatrixSample {
        let mut out = MatrixSample::default();
        for (ch, &level) in self.channels.iter_mut().zip(levels) {
            // Capacity equals channel count, so pushes cannot overflow.
            match ch.sample(level, now_ms, &self.timing) {
                SampleOutput::Nothing => {}
                SampleOutput::Activated(a) => {
                    let _ = out.activations.push(a);
                }
                SampleOutput::Fault(f) => {
                    let _ = out.faults.push(f);
                }
            }
        }
        out
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelDebouncer> {
        self.channels.get(index)
    }

    /// Any channel currently held.
    pub fn any_pressed(&self) -> bool {
        self.channels.iter().any(|c| c.state != PressState::Released)
    }
}

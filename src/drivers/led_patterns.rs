//! Status indicator pattern engine.
//!
//! The single status LED shows a pattern chosen purely from the power
//! mode and link state.  The LED level at any instant is derived from the
//! pattern's timing table and the time elapsed since the pattern was
//! entered; nothing accumulates between ticks, so a late or skipped tick
//! never drifts the blink phase.
//!
//! | Pattern          | Meaning          | Table (ms)                   |
//! |------------------|------------------|------------------------------|
//! | Off              | not started      | none                         |
//! | Connecting       | link down        | on 250, off 250              |
//! | Solid            | active           | on                           |
//! | SlowBlink        | low power        | on 2000, off 2000            |
//! | DoubleBlinkPause | critical supply  | on 200, off 200, on 200, off 1000 |

use crate::power::PowerMode;

/// Pattern identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPattern {
    Off,
    Connecting,
    Solid,
    SlowBlink,
    DoubleBlinkPause,
}

/// One step of a timing table: level and how long it lasts.
type Step = (bool, u64);

const CONNECTING: &[Step] = &[(true, 250), (false, 250)];
const SLOW_BLINK: &[Step] = &[(true, 2000), (false, 2000)];
const DOUBLE_BLINK_PAUSE: &[Step] = &[(true, 200), (false, 200), (true, 200), (false, 1000)];

impl IndicatorPattern {
    /// Pattern for the current device state.  Link loss wins over mode.
    pub const fn for_state(mode: PowerMode, link_up: bool) -> Self {
        if !link_up {
            return Self::Connecting;
        }
        match mode {
            PowerMode::Active => Self::Solid,
            PowerMode::LowPower => Self::SlowBlink,
            PowerMode::Critical => Self::DoubleBlinkPause,
        }
    }

    /// LED level `elapsed_ms` after the pattern was entered.
    pub fn level_at(self, elapsed_ms: u64) -> bool {
        match self {
            Self::Off => false,
            Self::Solid => true,
            Self::Connecting => Self::lookup(CONNECTING, elapsed_ms),
            Self::SlowBlink => Self::lookup(SLOW_BLINK, elapsed_ms),
            Self::DoubleBlinkPause => Self::lookup(DOUBLE_BLINK_PAUSE, elapsed_ms),
        }
    }

    fn lookup(table: &[Step], elapsed_ms: u64) -> bool {
        let period: u64 = table.iter().map(|(_, d)| d).sum();
        let mut pos = elapsed_ms % period;
        for &(level, duration) in table {
            if pos < duration {
                return level;
            }
            pos -= duration;
        }
        false
    }
}

/// Drives the status LED from [`IndicatorPattern`]s.
pub struct StatusIndicator {
    pattern: IndicatorPattern,
    since_ms: u64,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub const fn new() -> Self {
        Self {
            pattern: IndicatorPattern::Off,
            since_ms: 0,
        }
    }

    pub fn pattern(&self) -> IndicatorPattern {
        self.pattern
    }

    /// Select the pattern for the current state and return the LED level.
    /// A pattern change restarts the timing table.
    pub fn tick(&mut self, mode: PowerMode, link_up: bool, now_ms: u64) -> bool {
        let next = IndicatorPattern::for_state(mode, link_up);
        if next != self.pattern {
            self.pattern = next;
            self.since_ms = now_ms;
        }
        self.pattern.level_at(now_ms.saturating_sub(self.since_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_down_always_connecting() {
        for mode in [PowerMode::Active, PowerMode::LowPower, PowerMode::Critical] {
            assert_eq!(IndicatorPattern::for_state(mode, false), IndicatorPattern::Connecting);
        }
    }

    #[test]
    fn mode_selects_pattern_when_linked() {
        assert_eq!(IndicatorPattern::for_state(PowerMode::Active, true), IndicatorPattern::Solid);
        assert_eq!(
            IndicatorPattern::for_state(PowerMode::LowPower, true),
            IndicatorPattern::SlowBlink
        );
        assert_eq!(
            IndicatorPattern::for_state(PowerMode::Critical, true),
            IndicatorPattern::DoubleBlinkPause
        );
    }

    #[test]
    fn connecting_blinks_at_250ms() {
        let p = IndicatorPattern::Connecting;
        assert!(p.level_at(0));
        assert!(p.level_at(249));
        assert!(!p.level_at(250));
        assert!(p.level_at(500));
    }

    #[test]
    fn double_blink_table() {
        let p = IndicatorPattern::DoubleBlinkPause;
        let levels: Vec<bool> = [0, 199, 200, 399, 400, 599, 600, 1599, 1600]
            .iter()
            .map(|&t| p.level_at(t))
            .collect();
        assert_eq!(levels, vec![true, true, false, false, true, true, false, false, true]);
    }

    #[test]
    fn off_and_solid_are_constant() {
        assert!(!IndicatorPattern::Off.level_at(12_345));
        assert!(IndicatorPattern::Solid.level_at(12_345));
    }

    #[test]
    fn pattern_change_restarts_phase() {
        let mut ind = StatusIndicator::new();
        assert_eq!(ind.pattern(), IndicatorPattern::Off);
        ind.tick(PowerMode::Active, true, 0);
        // Enter SlowBlink late; it must start with the on phase.
        assert!(ind.tick(PowerMode::LowPower, true, 10_300));
        assert!(ind.tick(PowerMode::LowPower, true, 12_299));
        assert!(!ind.tick(PowerMode::LowPower, true, 12_300));
    }
}

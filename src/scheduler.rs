//! Periodic task scheduler.
//!
//! The control loop owns one [`Scheduler`] and asks it, once per tick,
//! which periodic tasks are due.  Tasks come back in a fixed order so a
//! tick always runs them the same way.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Periodic Tasks                           │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ PowerCheck│  │ Heartbeat │  │ Discovery │  │   Sync   │   │
//! │  │   1 s     │  │  config   │  │   30 s    │  │   60 s   │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        └──────────────┴──────┬───────┴──────────────┘        │
//! │                              ▼                               │
//! │                  Scheduler::due(now) (ordered)               │
//! │                              │                               │
//! │                              ▼                               │
//! │                       AppService.tick()                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A timer that is polled late fires once and re-arms from the poll
//! time; missed periods are never replayed.

use log::debug;

use crate::config::Tuning;

// ═══════════════════════════════════════════════════════════════
//  Timer
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTimer {
    interval_ms: u64,
    next_due_ms: u64,
}

impl PeriodicTimer {
    /// A timer first due at `first_due_ms`.
    pub const fn new(interval_ms: u64, first_due_ms: u64) -> Self {
        Self {
            interval_ms,
            next_due_ms: first_due_ms,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Change the period.  The pending deadline is pulled in if the new
    /// period is shorter.
    pub fn set_interval(&mut self, interval_ms: u64, now_ms: u64) {
        if interval_ms == self.interval_ms {
            return;
        }
        self.interval_ms = interval_ms;
        self.next_due_ms = self.next_due_ms.min(now_ms.saturating_add(interval_ms));
    }

    /// `true` (once) when the deadline has passed; re-arms from `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.next_due_ms = now_ms.saturating_add(self.interval_ms);
        true
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    PowerCheck,
    Heartbeat,
    Discovery,
    Sync,
}

const TASK_COUNT: usize = 4;

pub struct Scheduler {
    power_check: PeriodicTimer,
    heartbeat: PeriodicTimer,
    discovery: PeriodicTimer,
    sync: PeriodicTimer,
}

impl Scheduler {
    /// Power check and discovery run on the first tick; heartbeat and
    /// sync wait one full period.
    pub fn new(tuning: &Tuning, heartbeat_interval_ms: u64, now_ms: u64) -> Self {
        Self {
            power_check: PeriodicTimer::new(tuning.power_check_interval_ms, now_ms),
            heartbeat: PeriodicTimer::new(heartbeat_interval_ms, now_ms + heartbeat_interval_ms),
            discovery: PeriodicTimer::new(tuning.discovery_interval_ms, now_ms),
            sync: PeriodicTimer::new(tuning.sync_interval_ms, now_ms + tuning.sync_interval_ms),
        }
    }

    pub fn set_heartbeat_interval(&mut self, interval_ms: u64, now_ms: u64) {
        self.heartbeat.set_interval(interval_ms, now_ms);
    }

    /// Tasks due at `now_ms`, in execution order.
    pub fn due(&mut self, now_ms: u64) -> heapless::Vec<Task, TASK_COUNT> {
        let mut due = heapless::Vec::new();
        let timers = [
            (Task::PowerCheck, &mut self.power_check),
            (Task::Heartbeat, &mut self.heartbeat),
            (Task::Discovery, &mut self.discovery),
            (Task::Sync, &mut self.sync),
        ];
        for (task, timer) in timers {
            if timer.poll(now_ms) {
                debug!("Scheduler: {:?} due", task);
                // One slot per task.
                let _ = due.push(task);
            }
        }
        due
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

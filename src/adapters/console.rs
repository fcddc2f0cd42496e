//! Serial console adapter.
//!
//! Implements [`ConsolePort`] over the process's stdin/stdout, which
//! ESP-IDF routes to the UART / USB-CDC console.  A background reader
//! thread turns stdin into lines and hands them to the control loop
//! through a bounded `embassy-sync` channel, so `read_line` never blocks.
//!
//! ```text
//! ┌───────────────┐   Line   ┌──────────────┐
//! │ reader thread │────────▶│ Control Loop │
//! │ (stdin)       │ depth 4  │ (sync)       │
//! └───────────────┘          └──────────────┘
//! ```
//!
//! When the loop is busy (a slow HTTP action) and the channel fills,
//! further lines are dropped with a warning.

use std::io::{BufRead, Write};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::ports::ConsolePort;

/// Longest accepted command line; longer input is dropped.
pub const MAX_LINE: usize = 2048;

/// Lines buffered between the reader thread and the control loop.
const LINE_DEPTH: usize = 4;

pub type Line = heapless::String<MAX_LINE>;
pub type LineChannel = Channel<CriticalSectionRawMutex, Line, LINE_DEPTH>;

/// Reader thread → control loop.
static CONSOLE_LINES: LineChannel = Channel::new();

/// Queue one line for the control loop.  Returns `false` if it was dropped.
pub fn push_line(channel: &LineChannel, line: &str) -> bool {
    let Ok(line) = Line::try_from(line) else {
        warn!("Console: dropped {}-byte line", line.len());
        return false;
    };
    if channel.try_send(line).is_err() {
        warn!("Console: line queue full, dropping line");
        return false;
    }
    true
}

pub struct ConsoleAdapter {
    lines: &'static LineChannel,
}

impl ConsoleAdapter {
    /// Spawn the stdin reader thread.
    pub fn spawn() -> std::io::Result<Self> {
        std::thread::Builder::new()
            .name("console".into())
            .stack_size(8 * 1024)
            .spawn(|| {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => {
                            push_line(&CONSOLE_LINES, &line);
                        }
                        Err(e) => {
                            warn!("Console: read failed: {}", e);
                            break;
                        }
                    }
                }
                info!("Console: reader stopped");
            })?;
        Ok(Self::with_channel(&CONSOLE_LINES))
    }

    /// Console fed from an existing channel (tests, bridges).
    pub fn with_channel(lines: &'static LineChannel) -> Self {
        Self { lines }
    }
}

impl ConsolePort for ConsoleAdapter {
    fn read_line(&mut self) -> Option<String> {
        self.lines
            .try_receive()
            .ok()
            .map(|line| line.trim_end_matches('\r').to_string())
    }

    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

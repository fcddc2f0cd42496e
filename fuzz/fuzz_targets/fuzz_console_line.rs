//! Fuzz target: `ConsoleCommand::parse`
//!
//! Any UTF-8 line must parse or fail cleanly, and `TEST:n` must only
//! ever name an existing channel.
//!
//! cargo fuzz run fuzz_console_line

#![no_main]

use libfuzzer_sys::fuzz_target;
use patcom::app::commands::{ConsoleCommand, ConsoleResponse};
use patcom::config::CHANNEL_COUNT;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    match ConsoleCommand::parse(line) {
        Ok(ConsoleCommand::Test(n)) => assert!(usize::from(n) < CHANNEL_COUNT),
        Ok(_) => {}
        Err(e) => {
            let reply = ConsoleResponse::parse_error(e, 0).to_line();
            assert!(reply.starts_with("RESPONSE:"));
        }
    }
});

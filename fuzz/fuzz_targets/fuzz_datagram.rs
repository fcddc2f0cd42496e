//! Fuzz target: `Request::parse`
//!
//! Drives arbitrary payloads into the datagram parser.  It must never
//! panic, and every accepted request must map to one of the two
//! listening ports.
//!
//! cargo fuzz run fuzz_datagram

#![no_main]

use libfuzzer_sys::fuzz_target;
use patcom::protocol::messages::{CONFIG_PORT, DISCOVERY_PORT, Request};

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = Request::parse(data) {
        let port = request.port();
        assert!(port == DISCOVERY_PORT || port == CONFIG_PORT);
    }
});

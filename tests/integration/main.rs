//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the full `AppService`
//! against the recording mock device.  All tests run on the host
//! (x86_64) with no real hardware required.

mod console_tests;
mod dispatch_tests;
mod mock_hw;
mod power_tests;
mod protocol_tests;
mod sync_tests;
mod web_tests;

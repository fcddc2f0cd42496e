//! PATCOM button-matrix controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

// Links the std critical-section implementation used by embassy-sync.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod power;
pub mod protocol;
pub mod scheduler;
pub mod store;

pub mod pins;

// Platform modules; the ESP-IDF implementations are guarded by cfg
// attributes inside and fall back to host simulation.
pub mod adapters;
pub mod drivers;

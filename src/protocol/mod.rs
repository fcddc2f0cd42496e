//! Discovery and configuration protocol.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Protocol Stack                         │
//! │                                                           │
//! │  DatagramPort ──▶ engine (rate limit · parse · route)     │
//! │       ▲                     │                             │
//! │       │                     ▼                             │
//! │       └──── messages ◀── ConfigStore / status             │
//! │                                                           │
//! │  sync: periodic config-hash announce over HttpPort        │
//! │  web:  local HTTP interface routes (status page, config)  │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod messages;
pub mod sync;
pub mod web;

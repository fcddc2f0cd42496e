//! Local web server adapter.
//!
//! HTTP handlers run on the server's own task, but every answer comes
//! from the control loop, which owns the service.  A [`WebBridge`] joins
//! the two with a pair of bounded `embassy-sync` channels:
//!
//! ```text
//! ┌───────────────┐  Pending   ┌──────────────┐
//! │ httpd handler │──────────▶│ Control Loop │
//! │ (blocking)    │◀──────────│ handle_web   │
//! └───────────────┘ (id,reply) └──────────────┘
//! ```
//!
//! A handler waits up to [`REPLY_TIMEOUT`] for its reply and answers
//! 503 otherwise.  Replies that arrive after their handler gave up are
//! discarded by the next waiter.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpServer` on `WEB_PORT` (80).
//! - **all other targets**: no listener; requests are submitted to the
//!   bridge directly.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::protocol::web::{WebReply, WebRequest};
#[cfg(target_os = "espidf")]
use crate::protocol::web::WEB_PORT;

/// Requests in flight between handlers and the loop.
const BRIDGE_DEPTH: usize = 2;

/// Longest a handler waits for the control loop.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A request waiting for the control loop.
#[derive(Debug)]
pub struct Pending {
    pub id: u32,
    pub request: WebRequest,
}

pub struct WebBridge {
    requests: Channel<CriticalSectionRawMutex, Pending, BRIDGE_DEPTH>,
    replies: Channel<CriticalSectionRawMutex, (u32, WebReply), BRIDGE_DEPTH>,
    next_id: AtomicU32,
}

/// Bridge shared by the server handlers and the control loop.
pub static WEB_BRIDGE: WebBridge = WebBridge::new();

impl WebBridge {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            replies: Channel::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Hand a request to the control loop and block until it answers.
    /// Returns `None` when the queue is full or `timeout` expires.
    pub fn submit(&self, request: WebRequest, timeout: Duration) -> Option<WebReply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.requests.try_send(Pending { id, request }).is_err() {
            warn!("Web: request queue full");
            return None;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.replies.try_receive() {
                Ok((reply_id, reply)) if reply_id == id => return Some(reply),
                Ok((stale, _)) => warn!("Web: discarded late reply {}", stale),
                Err(_) if Instant::now() >= deadline => {
                    warn!("Web: request {} timed out", id);
                    return None;
                }
                Err(_) => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Next request for the control loop, if any.
    pub fn next_request(&self) -> Option<Pending> {
        self.requests.try_receive().ok()
    }

    /// Deliver the loop's answer to request `id`.
    pub fn respond(&self, id: u32, reply: WebReply) {
        if self.replies.try_send((id, reply)).is_err() {
            warn!("Web: reply queue full, dropping reply {}", id);
        }
    }
}

impl Default for WebBridge {
    fn default() -> Self {
        Self::new()
    }
}

// ── Server ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WebServer {
    _server: esp_idf_svc::http::server::EspHttpServer<'static>,
}

#[cfg(target_os = "espidf")]
impl WebServer {
    /// Register every route on [`WEB_PORT`] and forward requests to `bridge`.
    pub fn start(bridge: &'static WebBridge) -> anyhow::Result<Self> {
        use embedded_svc::http::{Headers, Method};
        use embedded_svc::io::{Read, Write};
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};

        use crate::protocol::web::{MAX_BODY, WebMethod};

        let conf = Configuration {
            http_port: WEB_PORT,
            stack_size: 10 * 1024,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf)?;

        let routes = [
            ("/", Method::Get, WebMethod::Get),
            ("/api/config", Method::Get, WebMethod::Get),
            ("/api/config", Method::Post, WebMethod::Post),
            ("/api/test", Method::Post, WebMethod::Post),
        ];
        for (path, method, web_method) in routes {
            server.fn_handler::<anyhow::Error, _>(path, method, move |mut req| {
                let uri = req.uri().to_string();
                let len = req.content_len().unwrap_or(0) as usize;
                let reply = if len > MAX_BODY {
                    WebReply::too_large()
                } else {
                    let mut body = vec![0u8; len];
                    if len > 0 {
                        req.read_exact(&mut body)?;
                    }
                    let request = WebRequest::from_uri(web_method, &uri, body);
                    bridge
                        .submit(request, REPLY_TIMEOUT)
                        .unwrap_or_else(WebReply::unavailable)
                };
                req.into_response(reply.status, None, &[("Content-Type", reply.content_type)])?
                    .write_all(reply.body.as_bytes())?;
                Ok(())
            })?;
        }
        log::info!("Web: listening on port {}", WEB_PORT);
        Ok(Self { _server: server })
    }
}

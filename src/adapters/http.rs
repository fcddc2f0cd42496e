//! Outbound HTTP adapter.
//!
//! Implements [`HttpPort`]: one synchronous request per call, bounded
//! by the request's timeout, no retries.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` (esp-http-client),
//!   TLS via the certificate bundle for `https://` URLs.
//! - **all other targets**: simulation stub; every host is unreachable.

use log::debug;

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse};
use crate::error::TransportError;

#[derive(Default)]
pub struct HttpAdapter {
    requests_sent: u32,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests attempted since boot.
    pub fn requests_sent(&self) -> u32 {
        self.requests_sent
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_request(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        use core::time::Duration;
        use embedded_svc::http::{Method, Status};
        use embedded_svc::http::client::Client;
        use embedded_svc::io::Write;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        use crate::config::HttpMethod;

        let conf = Configuration {
            timeout: Some(Duration::from_millis(u64::from(request.timeout_ms))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let conn = EspHttpConnection::new(&conf).map_err(|e| {
            log::warn!("HTTP: client init failed: {}", e);
            TransportError::Io
        })?;
        let mut client = Client::wrap(conn);

        let method = match request.method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
            HttpMethod::Put => Method::Put,
            HttpMethod::Delete => Method::Delete,
        };
        let content_length = request.body.len().to_string();
        let mut headers: Vec<(&str, &str)> = request
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if !request.body.is_empty() {
            headers.push(("Content-Length", content_length.as_str()));
        }

        let mut req = client
            .request(method, &request.url, &headers)
            .map_err(|_| TransportError::Unreachable)?;
        if !request.body.is_empty() {
            req.write_all(request.body.as_bytes()).map_err(|_| TransportError::Io)?;
            req.flush().map_err(|_| TransportError::Io)?;
        }
        let response = req.submit().map_err(|_| TransportError::Timeout)?;
        Ok(HttpResponse {
            status: response.status(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_request(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        log::info!("HTTP(sim): {} {} unreachable", request.method.as_str(), request.url);
        Err(TransportError::Unreachable)
    }
}

impl HttpPort for HttpAdapter {
    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
            return Err(TransportError::InvalidRequest);
        }
        self.requests_sent = self.requests_sent.wrapping_add(1);
        debug!(
            "HTTP: {} {} ({} bytes, timeout {} ms)",
            request.method.as_str(),
            request.url,
            request.body.len(),
            request.timeout_ms
        );
        Self::platform_request(request)
    }
}

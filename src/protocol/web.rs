//! Local web interface served on the LAN.
//!
//! Transport-free request routing for the on-device HTTP server.  The
//! adapter turns each HTTP request into a [`WebRequest`]; the service
//! answers with a [`WebReply`].
//!
//! | Route              | Method | Answer                                  |
//! |--------------------|--------|-----------------------------------------|
//! | `/`                | GET    | status page (HTML)                      |
//! | `/api/config`      | GET    | redacted configuration view (JSON)      |
//! | `/api/config`      | POST   | apply a configuration patch             |
//! | `/api/test`        | POST   | queue a test of `button=<0..7>`         |

use core::fmt::Write as _;

use serde::Serialize;

/// TCP port of the web interface (advertised over mDNS).
pub const WEB_PORT: u16 = 80;

/// Largest request body accepted; bigger bodies get 413.
pub const MAX_BODY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    pub method: WebMethod,
    pub path: String,
    /// Raw query string without the `?`.
    pub query: String,
    pub body: Vec<u8>,
}

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebRoute {
    Index,
    GetConfig,
    PostConfig,
    Test,
    NotFound,
}

impl WebRequest {
    /// Split a request URI into path and query.
    pub fn from_uri(method: WebMethod, uri: &str, body: Vec<u8>) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            body,
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::from_uri(WebMethod::Get, uri, Vec::new())
    }

    pub fn post(uri: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::from_uri(WebMethod::Post, uri, body.into())
    }

    pub fn route(&self) -> WebRoute {
        match (self.method, self.path.as_str()) {
            (WebMethod::Get, "/") => WebRoute::Index,
            (WebMethod::Get, "/api/config") => WebRoute::GetConfig,
            (WebMethod::Post, "/api/config") => WebRoute::PostConfig,
            (WebMethod::Post, "/api/test") => WebRoute::Test,
            _ => WebRoute::NotFound,
        }
    }

    /// A form parameter from the query string, else from a
    /// url-encoded body.
    pub fn param(&self, name: &str) -> Option<String> {
        form_value(&self.query, name).or_else(|| {
            core::str::from_utf8(&self.body)
                .ok()
                .and_then(|body| form_value(body, name))
        })
    }
}

fn form_value(form: &str, name: &str) -> Option<String> {
    form.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| value.replace('+', " "))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    message: &'a str,
}

impl WebReply {
    pub const JSON: &'static str = "application/json";
    pub const HTML: &'static str = "text/html; charset=utf-8";

    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self {
            status,
            content_type: Self::JSON,
            body: serde_json::to_string(body).unwrap_or_default(),
        }
    }

    /// `{"status":"ok"|"error","message":...}`.
    pub fn message(status: u16, message: &str) -> Self {
        let kind = if status < 400 { "ok" } else { "error" };
        Self::json(status, &StatusBody { status: kind, message })
    }

    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: Self::HTML,
            body,
        }
    }

    pub fn not_found() -> Self {
        Self::message(404, "Not found")
    }

    /// The control loop did not answer in time.
    pub fn unavailable() -> Self {
        Self::message(503, "Device busy")
    }

    pub fn too_large() -> Self {
        Self::message(413, "Request body too large")
    }
}

/// Facts shown on the status page.
pub struct IndexInfo<'a> {
    pub device_name: &'a str,
    pub device_id: &'a str,
    pub version: &'a str,
    pub wifi: &'a str,
    pub battery_volts: Option<f32>,
    pub power_mode: &'a str,
}

pub fn index_page(info: &IndexInfo<'_>) -> String {
    let mut page = String::with_capacity(768);
    page.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    page.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">");
    let _ = write!(page, "<title>{}</title>", escape(info.device_name));
    page.push_str("</head><body>");
    let _ = write!(page, "<h1>{}</h1><ul>", escape(info.device_name));
    let _ = write!(page, "<li>Device ID: {}</li>", escape(info.device_id));
    let _ = write!(page, "<li>Firmware: {}</li>", escape(info.version));
    let _ = write!(page, "<li>WiFi: {}</li>", escape(info.wifi));
    match info.battery_volts {
        Some(v) => {
            let _ = write!(page, "<li>Battery: {v:.2}V</li>");
        }
        None => page.push_str("<li>Battery: unknown</li>"),
    }
    let _ = write!(page, "<li>Power mode: {}</li>", escape(info.power_mode));
    page.push_str("</ul><p><a href=\"/api/config\">Configuration (JSON)</a></p></body></html>");
    page
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

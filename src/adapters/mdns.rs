//! mDNS service advertisement adapter.
//!
//! Advertises the web UI (`_patcom._tcp`, port 80) and both protocol
//! ports (`_patcom-discovery._udp`, `_patcom-config._udp`) with TXT
//! records for version, device type and device ID.  Uses the ESP-IDF
//! mDNS component on device and is a no-op on simulation targets.
//!
//! Lifecycle is tied to WiFi: start on connect, stop on disconnect
//! or sleep entry.

use log::info;

use crate::protocol::messages::{CONFIG_PORT, DISCOVERY_PORT};
use crate::protocol::web::WEB_PORT;

/// `(service, proto, port)` advertised while the link is up.
const SERVICES: [(&str, &str, u16); 3] = [
    ("_patcom", "_tcp", WEB_PORT),
    ("_patcom-discovery", "_udp", DISCOVERY_PORT),
    ("_patcom-config", "_udp", CONFIG_PORT),
];

/// mDNS advertisement adapter.
pub struct MdnsAdapter {
    hostname: heapless::String<24>,
    device_id: heapless::String<16>,
    device_type: u8,
    active: bool,
}

impl MdnsAdapter {
    pub fn new(hostname: heapless::String<24>, device_id: heapless::String<16>, device_type: u8) -> Self {
        Self {
            hostname,
            device_id,
            device_type,
            active: false,
        }
    }

    /// Whether mDNS is currently advertising.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Follow the link state: advertise while up, withdraw while down.
    pub fn sync_with_link(&mut self, link_up: bool) {
        if link_up {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Start mDNS hostname + service advertisement.
    /// Call after WiFi is connected and has an IP.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.platform_start();
        self.active = true;
        info!(
            "mDNS: advertising {}.local ({} services, device={})",
            self.hostname,
            SERVICES.len(),
            self.device_id
        );
    }

    /// Stop mDNS advertisement.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.platform_stop();
        self.active = false;
        info!("mDNS: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) {
        use esp_idf_svc::sys::*;

        fn c_str<const N: usize>(s: &str) -> [u8; N] {
            let mut buf = [0u8; N];
            let len = s.len().min(N - 1);
            buf[..len].copy_from_slice(&s.as_bytes()[..len]);
            buf
        }

        let hostname = c_str::<32>(&self.hostname);
        let id = c_str::<24>(&self.device_id);
        let device_type = c_str::<8>(&self.device_type.to_string());
        let version = concat!(env!("CARGO_PKG_VERSION"), "\0");

        // SAFETY: every pointer handed to the mDNS component is a
        // NUL-terminated buffer that outlives the call; the component
        // copies what it keeps.
        unsafe {
            let ret = mdns_init();
            if ret != ESP_OK as i32 {
                log::error!("mDNS: mdns_init failed ({})", ret);
                return;
            }
            mdns_hostname_set(hostname.as_ptr().cast());
            mdns_instance_name_set(b"PATCOM Button Matrix\0".as_ptr().cast());

            for (service, proto, port) in SERVICES {
                let svc = c_str::<24>(service);
                let pr = c_str::<8>(proto);
                mdns_service_add(core::ptr::null(), svc.as_ptr().cast(), pr.as_ptr().cast(), port, core::ptr::null_mut(), 0);
            }

            let svc = c_str::<24>(SERVICES[0].0);
            let pr = c_str::<8>(SERVICES[0].1);
            for (key, value) in [
                (&b"version\0"[..], version.as_bytes()),
                (&b"device_type\0"[..], &device_type[..]),
                (&b"device_id\0"[..], &id[..]),
            ] {
                mdns_service_txt_item_set(svc.as_ptr().cast(), pr.as_ptr().cast(), key.as_ptr().cast(), value.as_ptr().cast());
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) {
        for (service, proto, port) in SERVICES {
            info!(
                "mDNS(sim): registered {}.local {}.{}:{} v={} type={} id={}",
                self.hostname,
                service,
                proto,
                port,
                env!("CARGO_PKG_VERSION"),
                self.device_type,
                self.device_id
            );
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        // SAFETY: releases the component initialised in platform_start().
        unsafe {
            esp_idf_svc::sys::mdns_free();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("mDNS(sim): unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_adapter() -> MdnsAdapter {
        let mut hostname = heapless::String::<24>::new();
        hostname.push_str("patcom-aabbcc").ok();
        let mut device_id = heapless::String::<16>::new();
        device_id.push_str("PATCOM-AABBCC").ok();
        MdnsAdapter::new(hostname, device_id, 0)
    }

    #[test]
    fn follows_link_state() {
        let mut m = make_adapter();
        assert!(!m.is_active());
        m.sync_with_link(true);
        assert!(m.is_active());
        m.sync_with_link(true);
        assert!(m.is_active());
        m.sync_with_link(false);
        assert!(!m.is_active());
    }

    #[test]
    fn double_stop_is_idempotent() {
        let mut m = make_adapter();
        m.stop();
        assert!(!m.is_active());
    }

    #[test]
    fn advertises_both_protocol_ports() {
        assert!(SERVICES.iter().any(|s| s.2 == DISCOVERY_PORT && s.1 == "_udp"));
        assert!(SERVICES.iter().any(|s| s.2 == CONFIG_PORT && s.1 == "_udp"));
    }
}

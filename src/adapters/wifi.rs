//! WiFi station-mode adapter.
//!
//! Implements [`LinkPort`]: the hexagonal boundary for network
//! connectivity.  Boot connects with a bounded number of attempts and
//! falls back to a setup access point when the station cannot join.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! On link loss the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) between reconnect attempts, driven by
//! [`WifiAdapter::poll`] from the control loop.

use core::fmt;
use std::net::Ipv4Addr;

use log::{info, warn};

use crate::app::ports::LinkPort;
use crate::config::{NetworkConfig, is_printable_ascii, parse_ipv4};

/// Setup access point started when the station cannot connect.
pub const SETUP_AP_SSID: &str = "PATCOM-Config";
pub const SETUP_AP_PASSWORD: &str = "patcom123";

const BOOT_CONNECT_ATTEMPTS: u32 = 3;
const MIN_BACKOFF_MS: u64 = 2_000;
const MAX_BACKOFF_MS: u64 = 60_000;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    InvalidStaticIp,
    ConnectionFailed,
    DriverFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-63 bytes for WPA2, or empty for open)"),
            Self::InvalidStaticIp => write!(f, "static IP settings invalid"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::DriverFailed => write!(f, "WiFi driver error"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Setup access point is up; the station is not associated.
    AccessPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIp {
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Option<Ipv4Addr>,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() {
        return Err(ConnectivityError::NoCredentials);
    }
    if ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 63 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

fn static_ip_from(network: &NetworkConfig) -> Result<Option<StaticIp>, ConnectivityError> {
    if !network.use_static_ip {
        return Ok(None);
    }
    let ip = parse_ipv4(&network.ip).ok_or(ConnectivityError::InvalidStaticIp)?;
    let gateway = parse_ipv4(&network.gateway).ok_or(ConnectivityError::InvalidStaticIp)?;
    let subnet = parse_ipv4(&network.subnet).unwrap_or(Ipv4Addr::new(255, 255, 255, 0));
    let dns = parse_ipv4(&network.dns);
    Ok(Some(StaticIp {
        ip,
        subnet,
        gateway,
        dns,
    }))
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    static_ip: Option<StaticIp>,
    backoff_ms: u64,
    next_retry_ms: u64,
    mac: [u8; 6],
    ip: Option<Ipv4Addr>,
    last_rssi: Option<i8>,
    modem_sleep: bool,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    /// Simulation: whether the configured network answers.
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        mac: [u8; 6],
    ) -> Result<Self, ConnectivityError> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None).map_err(|e| {
            warn!("WiFi: driver init failed: {}", e);
            ConnectivityError::DriverFailed
        })?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|_| ConnectivityError::DriverFailed)?;
        Ok(Self::with_platform(mac, wifi))
    }

    #[cfg(target_os = "espidf")]
    fn with_platform(
        mac: [u8; 6],
        wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    ) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            static_ip: None,
            backoff_ms: MIN_BACKOFF_MS,
            next_retry_ms: 0,
            mac,
            ip: None,
            last_rssi: None,
            modem_sleep: false,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            static_ip: None,
            backoff_ms: MIN_BACKOFF_MS,
            next_retry_ms: 0,
            mac,
            ip: None,
            last_rssi: None,
            modem_sleep: false,
            sim_reachable: true,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Take credentials and addressing from the stored network record.
    pub fn configure(&mut self, network: &NetworkConfig) -> Result<(), ConnectivityError> {
        validate_ssid(&network.ssid)?;
        validate_password(&network.password)?;
        let static_ip = static_ip_from(network)?;
        self.ssid.clear();
        self.ssid.push_str(&network.ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(&network.password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        self.static_ip = static_ip;
        info!(
            "WiFi: credentials updated (SSID='{}', {})",
            self.ssid,
            if self.static_ip.is_some() { "static" } else { "DHCP" }
        );
        Ok(())
    }

    /// Boot-time connect.  Falls back to the setup access point when
    /// there are no credentials or every attempt fails.
    pub fn connect(&mut self) -> WifiState {
        if self.ssid.is_empty() {
            warn!("WiFi: no credentials, starting setup AP");
            self.start_access_point();
            return self.state;
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;
        for attempt in 1..=BOOT_CONNECT_ATTEMPTS {
            match self.platform_connect() {
                Ok(()) => {
                    self.on_connected();
                    return self.state;
                }
                Err(e) => {
                    warn!("WiFi: attempt {}/{} failed: {}", attempt, BOOT_CONNECT_ATTEMPTS, e);
                    self.platform_disconnect();
                }
            }
        }

        warn!("WiFi: could not join '{}', starting setup AP", self.ssid);
        self.start_access_point();
        self.state
    }

    /// Drive link-loss detection and backoff reconnects.
    pub fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Connected => {
                if self.platform_is_connected() {
                    self.last_rssi = self.platform_rssi();
                } else {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.backoff_ms = MIN_BACKOFF_MS;
                    self.next_retry_ms = now_ms.saturating_add(self.backoff_ms);
                    self.ip = None;
                    self.last_rssi = None;
                }
            }
            WifiState::Reconnecting { attempt } if now_ms >= self.next_retry_ms => {
                info!("WiFi: reconnect attempt {} (backoff {} ms)", attempt, self.backoff_ms);
                match self.platform_connect() {
                    Ok(()) => self.on_connected(),
                    Err(_) => {
                        self.platform_disconnect();
                        self.backoff_ms = (self.backoff_ms * 2).min(MAX_BACKOFF_MS);
                        self.next_retry_ms = now_ms.saturating_add(self.backoff_ms);
                        self.state = WifiState::Reconnecting { attempt: attempt + 1 };
                    }
                }
            }
            _ => {}
        }
    }

    /// Enable or disable modem sleep between AP beacons.
    pub fn set_modem_sleep(&mut self, enabled: bool) {
        if enabled == self.modem_sleep {
            return;
        }
        match self.platform_set_modem_sleep(enabled) {
            Ok(()) => {
                self.modem_sleep = enabled;
                info!("WiFi: modem sleep {}", if enabled { "on" } else { "off" });
            }
            Err(e) => warn!("WiFi: power save change failed: {}", e),
        }
    }

    pub fn modem_sleep(&self) -> bool {
        self.modem_sleep
    }

    fn on_connected(&mut self) {
        self.state = WifiState::Connected;
        self.backoff_ms = MIN_BACKOFF_MS;
        self.ip = self.platform_ip();
        self.last_rssi = self.platform_rssi();
        info!("WiFi: connected (IP={:?}, RSSI={:?})", self.ip, self.last_rssi);
    }

    fn start_access_point(&mut self) {
        match self.platform_start_ap() {
            Ok(ip) => {
                self.state = WifiState::AccessPoint;
                self.ip = Some(ip);
                info!("WiFi: setup AP '{}' up at {}", SETUP_AP_SSID, ip);
            }
            Err(e) => {
                warn!("WiFi: setup AP failed: {}", e);
                self.state = WifiState::Disconnected;
                self.ip = None;
            }
        }
        self.last_rssi = None;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        if let Some(fixed) = self.static_ip {
            self.apply_static_ip(fixed)?;
        }

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&conf).map_err(|_| ConnectivityError::DriverFailed)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|_| ConnectivityError::DriverFailed)?;
        }
        self.wifi.connect().map_err(|_| ConnectivityError::ConnectionFailed)?;
        self.wifi.wait_netif_up().map_err(|_| ConnectivityError::ConnectionFailed)?;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn apply_static_ip(&mut self, fixed: StaticIp) -> Result<(), ConnectivityError> {
        use esp_idf_svc::ipv4::{
            ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
            Configuration as IpConfiguration, Mask, Subnet,
        };
        use esp_idf_svc::netif::{EspNetif, NetifConfiguration};

        let mask = Mask::try_from(fixed.subnet).map_err(|_| ConnectivityError::InvalidStaticIp)?;
        let conf = NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                IpClientSettings {
                    ip: fixed.ip,
                    subnet: Subnet {
                        gateway: fixed.gateway,
                        mask,
                    },
                    dns: fixed.dns,
                    secondary_dns: None,
                },
            ))),
            ..NetifConfiguration::wifi_default_client()
        };
        let netif = EspNetif::new_with_conf(&conf).map_err(|_| ConnectivityError::DriverFailed)?;
        self.wifi
            .wifi_mut()
            .swap_netif_sta(netif)
            .map_err(|_| ConnectivityError::DriverFailed)?;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_ap(&mut self) -> Result<Ipv4Addr, ConnectivityError> {
        use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration};

        let conf = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: SETUP_AP_SSID.try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: SETUP_AP_PASSWORD
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        });
        let _ = self.wifi.stop();
        self.wifi.set_configuration(&conf).map_err(|_| ConnectivityError::DriverFailed)?;
        self.wifi.start().map_err(|_| ConnectivityError::DriverFailed)?;
        self.wifi.wait_netif_up().map_err(|_| ConnectivityError::DriverFailed)?;
        self.wifi
            .wifi()
            .ap_netif()
            .get_ip_info()
            .map(|info| info.ip)
            .map_err(|_| ConnectivityError::DriverFailed)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(target_os = "espidf")]
    fn platform_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.wifi().sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        // SAFETY: esp_wifi_sta_get_ap_info fills a caller-owned record;
        // an all-zero record is a valid initial value.
        let mut info: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) };
        (ret == esp_idf_svc::sys::ESP_OK as i32).then_some(info.rssi)
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_modem_sleep(&mut self, enabled: bool) -> Result<(), ConnectivityError> {
        use esp_idf_svc::sys::{ESP_OK, esp_wifi_set_ps, wifi_ps_type_t_WIFI_PS_MIN_MODEM, wifi_ps_type_t_WIFI_PS_NONE};

        let mode = if enabled { wifi_ps_type_t_WIFI_PS_MIN_MODEM } else { wifi_ps_type_t_WIFI_PS_NONE };
        // SAFETY: the WiFi driver is initialised for the adapter's lifetime.
        let ret = unsafe { esp_wifi_set_ps(mode) };
        if ret == ESP_OK as i32 { Ok(()) } else { Err(ConnectivityError::DriverFailed) }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_modem_sleep(&mut self, _enabled: bool) -> Result<(), ConnectivityError> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim_reachable {
            info!("WiFi(sim): joined '{}'", self.ssid);
            Ok(())
        } else {
            Err(ConnectivityError::ConnectionFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_ap(&mut self) -> Result<Ipv4Addr, ConnectivityError> {
        Ok(Ipv4Addr::new(192, 168, 4, 1))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.sim_reachable
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self) -> Option<Ipv4Addr> {
        Some(self.static_ip.map_or(Ipv4Addr::new(192, 168, 1, 50), |s| s.ip))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        Some(-60)
    }

    /// Simulation: make the configured network (un)reachable.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
    }
}

// ───────────────────────────────────────────────────────────────
// LinkPort
// ───────────────────────────────────────────────────────────────

impl LinkPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE];

    fn network(ssid: &str, password: &str) -> NetworkConfig {
        NetworkConfig {
            ssid: ssid.into(),
            password: password.into(),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn rejects_short_password() {
        let mut a = WifiAdapter::new(MAC);
        assert_eq!(
            a.configure(&network("MyNet", "short")),
            Err(ConnectivityError::InvalidPassword)
        );
    }

    #[test]
    fn modem_sleep_follows_requests() {
        let mut a = WifiAdapter::new(MAC);
        assert!(!a.modem_sleep());
        a.set_modem_sleep(true);
        assert!(a.modem_sleep());
        a.set_modem_sleep(true);
        assert!(a.modem_sleep());
        a.set_modem_sleep(false);
        assert!(!a.modem_sleep());
    }

    #[test]
    fn accepts_open_network() {
        let mut a = WifiAdapter::new(MAC);
        assert!(a.configure(&network("OpenCafe", "")).is_ok());
    }

    #[test]
    fn no_credentials_starts_setup_ap() {
        let mut a = WifiAdapter::new(MAC);
        assert_eq!(a.configure(&network("", "")), Err(ConnectivityError::NoCredentials));
        assert_eq!(a.connect(), WifiState::AccessPoint);
        assert!(!a.is_connected());
        assert_eq!(a.local_ip(), Some(Ipv4Addr::new(192, 168, 4, 1)));
    }

    #[test]
    fn unreachable_network_falls_back_to_ap() {
        let mut a = WifiAdapter::new(MAC);
        a.configure(&network("HomeWiFi", "mysecret8")).unwrap();
        a.set_sim_reachable(false);
        assert_eq!(a.connect(), WifiState::AccessPoint);
    }

    #[test]
    fn static_ip_is_reported() {
        let mut a = WifiAdapter::new(MAC);
        let net = NetworkConfig {
            use_static_ip: true,
            ip: "192.168.1.77".into(),
            gateway: "192.168.1.1".into(),
            ..network("HomeWiFi", "mysecret8")
        };
        a.configure(&net).unwrap();
        assert_eq!(a.connect(), WifiState::Connected);
        assert_eq!(a.local_ip(), Some(Ipv4Addr::new(192, 168, 1, 77)));
        assert_eq!(a.mac(), MAC);
    }

    #[test]
    fn link_loss_backs_off_then_reconnects() {
        let mut a = WifiAdapter::new(MAC);
        a.configure(&network("HomeWiFi", "mysecret8")).unwrap();
        a.connect();
        assert!(a.is_connected());

        a.set_sim_reachable(false);
        a.poll(1_000);
        assert_eq!(a.state(), WifiState::Reconnecting { attempt: 0 });
        assert_eq!(a.local_ip(), None);

        a.poll(3_000);
        assert_eq!(a.state(), WifiState::Reconnecting { attempt: 1 });

        a.set_sim_reachable(true);
        a.poll(5_000);
        assert_eq!(a.state(), WifiState::Reconnecting { attempt: 1 });
        a.poll(7_000);
        assert!(a.is_connected());
    }
}

//! The assembled device: every concrete adapter behind one value.
//!
//! `AppService::tick` takes a single `&mut impl DevicePorts`; [`Board`]
//! satisfies it by delegating each port to the adapter that owns it.

use std::net::{Ipv4Addr, SocketAddrV4};

use embedded_hal::digital::InputPin;

use crate::app::ports::{
    ConsolePort, Datagram, DatagramPort, HttpPort, HttpRequest, HttpResponse, IndicatorPort,
    InputPort, LinkPort, PowerSensePort,
};
use crate::config::CHANNEL_COUNT;
use crate::error::TransportError;

use super::console::ConsoleAdapter;
use super::hardware::HardwareAdapter;
use super::http::HttpAdapter;
use super::udp::UdpAdapter;
use super::wifi::WifiAdapter;

pub struct Board<P: InputPin> {
    pub hardware: HardwareAdapter<P>,
    pub wifi: WifiAdapter,
    pub udp: UdpAdapter,
    pub http: HttpAdapter,
    pub console: ConsoleAdapter,
}

impl<P: InputPin> InputPort for Board<P> {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT] {
        self.hardware.read_levels()
    }
}

impl<P: InputPin> IndicatorPort for Board<P> {
    fn set_status(&mut self, on: bool) {
        self.hardware.set_status(on);
    }

    fn set_channel(&mut self, index: u8, level: u8) {
        self.hardware.set_channel(index, level);
    }
}

impl<P: InputPin> PowerSensePort for Board<P> {
    fn read_voltage(&mut self) -> f32 {
        self.hardware.read_voltage()
    }
}

impl<P: InputPin> LinkPort for Board<P> {
    fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.local_ip()
    }

    fn mac(&self) -> [u8; 6] {
        self.wifi.mac()
    }

    fn rssi(&self) -> Option<i8> {
        self.wifi.rssi()
    }
}

impl<P: InputPin> HttpPort for Board<P> {
    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if !self.wifi.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.http.request(request)
    }
}

impl<P: InputPin> DatagramPort for Board<P> {
    fn recv(&mut self) -> Option<Datagram> {
        self.udp.recv()
    }

    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<(), TransportError> {
        self.udp.send_to(payload, dest)
    }

    fn reply(&mut self, payload: &[u8], request: &Datagram) -> Result<(), TransportError> {
        self.udp.reply(payload, request)
    }

    fn broadcast(&mut self, payload: &[u8], port: u16) -> Result<(), TransportError> {
        self.udp.broadcast(payload, port)
    }
}

impl<P: InputPin> ConsolePort for Board<P> {
    fn read_line(&mut self) -> Option<String> {
        self.console.read_line()
    }

    fn write_line(&mut self, line: &str) {
        self.console.write_line(line);
    }
}

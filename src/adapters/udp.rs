//! UDP datagram adapter.
//!
//! Implements [`DatagramPort`] over two non-blocking `std::net`
//! sockets, one per protocol port.  ESP-IDF ships a BSD socket layer
//! under `std`, so the same code runs on device and host.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use log::{info, warn};

use crate::app::ports::{Datagram, DatagramPort};
use crate::error::TransportError;

/// Largest datagram accepted; `set_config` bodies stay well below this.
const MAX_DATAGRAM: usize = 4096;

pub struct UdpAdapter {
    discovery: UdpSocket,
    config: UdpSocket,
    discovery_port: u16,
    config_port: u16,
}

impl UdpAdapter {
    /// Bind both listening sockets on all interfaces.  Port 0 picks an
    /// ephemeral port (tests).
    pub fn bind(discovery_port: u16, config_port: u16) -> std::io::Result<Self> {
        let discovery = open(discovery_port)?;
        let config = open(config_port)?;
        let discovery_port = discovery.local_addr()?.port();
        let config_port = config.local_addr()?.port();
        info!("UDP: listening on {} (discovery) and {} (config)", discovery_port, config_port);
        Ok(Self {
            discovery,
            config,
            discovery_port,
            config_port,
        })
    }

    pub fn discovery_port(&self) -> u16 {
        self.discovery_port
    }

    pub fn config_port(&self) -> u16 {
        self.config_port
    }

    fn poll(socket: &UdpSocket, local_port: u16) -> Option<Datagram> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(source))) => Some(Datagram {
                source,
                local_port,
                payload: buf[..len].to_vec(),
            }),
            Ok((_, SocketAddr::V6(source))) => {
                warn!("UDP: ignoring IPv6 datagram from {}", source);
                None
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("UDP: recv on {} failed: {}", local_port, e);
                None
            }
        }
    }
}

fn open(port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
    socket.set_nonblocking(true)?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

fn map_io(e: &std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
        ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => TransportError::Unreachable,
        ErrorKind::NotConnected => TransportError::NotConnected,
        _ => TransportError::Io,
    }
}

impl DatagramPort for UdpAdapter {
    fn recv(&mut self) -> Option<Datagram> {
        Self::poll(&self.discovery, self.discovery_port)
            .or_else(|| Self::poll(&self.config, self.config_port))
    }

    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<(), TransportError> {
        self.config.send_to(payload, dest).map(|_| ()).map_err(|e| {
            warn!("UDP: send to {} failed: {}", dest, e);
            map_io(&e)
        })
    }

    fn reply(&mut self, payload: &[u8], request: &Datagram) -> Result<(), TransportError> {
        let socket = if request.local_port == self.discovery_port {
            &self.discovery
        } else {
            &self.config
        };
        socket.send_to(payload, request.source).map(|_| ()).map_err(|e| {
            warn!("UDP: reply to {} failed: {}", request.source, e);
            map_io(&e)
        })
    }

    fn broadcast(&mut self, payload: &[u8], port: u16) -> Result<(), TransportError> {
        let dest = SocketAddrV4::new(Ipv4Addr::BROADCAST, port);
        self.discovery.send_to(payload, dest).map(|_| ()).map_err(|e| map_io(&e))
    }
}

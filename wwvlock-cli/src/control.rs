//! UDP control-command endpoint.
//!
//! Single-line `CMD ARG` datagrams in, single-line responses back to the
//! sender. The socket is non-blocking and polled from the ingest loop; the
//! core's rate limiter bounds throughput.

use std::net::{SocketAddr, UdpSocket};

use color_eyre::eyre::{Context, Result};

pub struct ControlEndpoint {
    socket: UdpSocket,
    buf: [u8; 512],
}

impl ControlEndpoint {
    pub fn bind(address: &str) -> Result<Self> {
        let socket = UdpSocket::bind(address)
            .wrap_err_with(|| format!("binding control socket {address}"))?;
        socket
            .set_nonblocking(true)
            .wrap_err("setting control socket non-blocking")?;
        Ok(Self {
            socket,
            buf: [0u8; 512],
        })
    }

    /// Drain pending command datagrams.
    pub fn poll(&mut self) -> Vec<(String, SocketAddr)> {
        let mut commands = Vec::new();
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, addr)) => {
                    let line = String::from_utf8_lossy(&self.buf[..len]).trim().to_string();
                    if !line.is_empty() {
                        commands.push((line, addr));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        commands
    }

    /// Send a response line back to the commanding peer.
    pub fn respond(&self, addr: SocketAddr, response: &str) {
        let _ = self.socket.send_to(response.as_bytes(), addr);
    }
}

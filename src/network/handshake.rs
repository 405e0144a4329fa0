//! One-shot TCP handshake server
//!
//! Binds a listening socket, waits for exactly one inbound connection, and
//! writes the two-line negotiation payload (UDP port, sample rate) before
//! closing the connection. The accept wait is bounded by a 1 second timeout
//! so the cancel flag is observed promptly; a timeout with no cancellation
//! simply retries.

use socket2::SockRef;
use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::ACCEPT_TIMEOUT;
use crate::error::HandshakeError;
use crate::protocol;

/// TCP server for the one-shot port/format negotiation
pub struct HandshakeServer {
    listener: TcpListener,
    udp_port: u16,
    sample_rate: u32,
}

impl HandshakeServer {
    /// Bind and listen on `bind_ip:tcp_port` with the accept timeout set.
    ///
    /// `udp_port` is the uplink's already-allocated local port, advertised
    /// to the peer as the port to listen on.
    pub fn open(
        bind_ip: IpAddr,
        tcp_port: u16,
        udp_port: u16,
        sample_rate: u32,
    ) -> Result<Self, HandshakeError> {
        let listener =
            TcpListener::bind(SocketAddr::new(bind_ip, tcp_port)).map_err(HandshakeError::Bind)?;
        // SO_RCVTIMEO bounds each accept call so cancellation is observed
        SockRef::from(&listener)
            .set_read_timeout(Some(ACCEPT_TIMEOUT))
            .map_err(HandshakeError::Bind)?;
        Ok(Self {
            listener,
            udp_port,
            sample_rate,
        })
    }

    /// Address the listener actually bound to (port 0 resolves here)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one connection, retrying on accept timeouts.
    ///
    /// Returns `Ok(None)` when cancelled before a client connected; that is
    /// a normal outcome, not an error. Any accept failure other than a
    /// timeout is fatal and reported immediately.
    pub fn accept_loop(&self, cancel: &AtomicBool) -> Result<Option<TcpStream>, HandshakeError> {
        while !cancel.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "client connected");
                    return Ok(Some(stream));
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => return Err(HandshakeError::Accept(e)),
            }
        }
        Ok(None)
    }

    /// Write the negotiation payload and shut down the write side
    pub fn send_payload(&self, stream: &mut TcpStream) -> Result<(), HandshakeError> {
        protocol::write_handshake(stream, self.udp_port, self.sample_rate)
            .map_err(HandshakeError::SendPayload)?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(HandshakeError::SendPayload)?;
        Ok(())
    }

    /// Run the whole handshake: accept one client, send the payload, and
    /// report the peer's address. `Ok(None)` means cancelled.
    pub fn run(&self, cancel: &AtomicBool) -> Result<Option<SocketAddr>, HandshakeError> {
        let Some(mut stream) = self.accept_loop(cancel)? else {
            return Ok(None);
        };
        if cancel.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let peer = stream.peer_addr().map_err(HandshakeError::Accept)?;
        self.send_payload(&mut stream)?;
        tracing::info!(peer = %peer, udp_port = self.udp_port, rate = self.sample_rate,
            "handshake payload sent");
        Ok(Some(peer))
    }
}

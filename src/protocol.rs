//! Wire contract between sender and receiver
//!
//! The handshake is two newline-terminated decimal integers written by the
//! server right after accept: the UDP port to stream to, then the sample rate
//! in Hz. No header, no length prefix, no acknowledgment. Audio datagrams are
//! raw interleaved little-endian PCM16 with no framing beyond the datagram
//! boundary itself.

use std::io::{self, BufRead, Write};
use std::net::IpAddr;

/// Negotiated streaming target, created once per successful handshake.
///
/// The port carried here is the uplink's own local UDP port: the receiver is
/// expected to listen on the same port number the sender's socket was bound
/// to. This avoids a second handshake round-trip and is a fixed part of the
/// protocol contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub address: IpAddr,
    pub udp_port: u16,
}

impl PeerEndpoint {
    pub fn new(address: IpAddr, udp_port: u16) -> Self {
        Self { address, udp_port }
    }
}

/// Write the two-line handshake payload and flush it.
pub fn write_handshake<W: Write>(w: &mut W, udp_port: u16, sample_rate: u32) -> io::Result<()> {
    writeln!(w, "{udp_port}")?;
    writeln!(w, "{sample_rate}")?;
    w.flush()
}

/// Read and parse the handshake payload on the receiving side.
///
/// Returns `(udp_port, sample_rate)`. A line that does not parse as the
/// expected decimal integer is reported as `InvalidData`; the wire format is
/// authoritative and no recovery is attempted.
pub fn read_handshake<R: BufRead>(r: &mut R) -> io::Result<(u16, u32)> {
    let mut line = String::new();
    r.read_line(&mut line)?;
    let udp_port = line
        .trim()
        .parse::<u16>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad UDP port line: {e}")))?;

    line.clear();
    r.read_line(&mut line)?;
    let sample_rate = line
        .trim()
        .parse::<u32>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad sample rate line: {e}")))?;

    Ok((udp_port, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_handshake_round_trip() {
        let mut payload = Vec::new();
        write_handshake(&mut payload, 49321, 48000).unwrap();
        assert_eq!(payload, b"49321\n48000\n");

        let (port, rate) = read_handshake(&mut Cursor::new(payload)).unwrap();
        assert_eq!(port, 49321);
        assert_eq!(rate, 48000);
    }

    #[test]
    fn test_malformed_payload() {
        let err = read_handshake(&mut Cursor::new(b"not-a-port\n48000\n".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = read_handshake(&mut Cursor::new(b"49321\nforty-eight\n".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_payload() {
        // Missing second line parses as an empty string
        let err = read_handshake(&mut Cursor::new(b"49321\n".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

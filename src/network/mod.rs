//! Network subsystem: TCP handshake and UDP audio uplink

pub mod handshake;
pub mod uplink;

pub use handshake::HandshakeServer;
pub use uplink::AudioUplink;

//! # LAN Mic Streamer
//!
//! Streams live microphone audio from a sender device to a single receiver
//! over a trusted local network, with a volume multiplier applied to every
//! sample in real time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SENDER ─────────────────────────────┐
//! │                                                                 │
//! │   ┌─────────────┐   controller (start/stop/set_volume)          │
//! │   │StreamSession│──────────────┬───────────────────┐            │
//! │   └─────────────┘              ▼                   ▼            │
//! │                      ┌────────────────┐   ┌───────────────┐     │
//! │                      │HandshakeServer │   │  AudioUplink  │     │
//! │                      │  TCP :8126     │   │  UDP (eph.)   │     │
//! │                      │  accept loop   │   │  capture      │     │
//! │                      │  2-line payload│   │   → amplify   │     │
//! │                      └───────┬────────┘   │   → send_to   │     │
//! │                              │            └───────┬───────┘     │
//! └──────────────────────────────┼────────────────────┼─────────────┘
//!        TCP: "<udp_port>\n<sample_rate>\n"           │ UDP: raw PCM16 LE
//!                               ▼                    ▼
//! ┌──────────────────────────── RECEIVER ───────────────────────────┐
//! │  connect → parse port + rate → bind UDP port → play datagrams   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The handshake is one-shot: the server accepts a single TCP connection,
//! tells the peer which UDP port and sample rate to expect, and closes. The
//! uplink then streams each captured buffer as one datagram until stopped or
//! a send fails. All failures are terminal for the session; the controller
//! decides whether to start a fresh one.

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default TCP control port for the handshake listener
    pub const DEFAULT_TCP_PORT: u16 = 8126;

    /// Default sample rate for audio capture
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    /// Default volume multiplier applied to captured samples
    pub const DEFAULT_VOLUME: f32 = 10.0;

    /// Upper bound for the volume multiplier
    pub const MAX_VOLUME: f32 = 20.0;

    /// How long a single accept attempt blocks before re-checking cancellation
    pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Capture read granularity in milliseconds (one UDP datagram per chunk)
    pub const CAPTURE_CHUNK_MS: u32 = 20;

    /// Capacity of the capture chunk ring (in chunks)
    pub const RING_BUFFER_CAPACITY: usize = 256;
}

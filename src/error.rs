//! Error types for the streaming pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("uplink error: {0}")]
    Uplink(#[from] UplinkError),

    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the TCP handshake phase.
///
/// Each variant names the phase that failed; accept timeouts are not errors
/// and never surface here.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("failed to bind TCP listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("failed to send handshake payload: {0}")]
    SendPayload(#[source] std::io::Error),
}

/// Failures of the capture-amplify-send loop
#[derive(Error, Debug)]
pub enum UplinkError {
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("capture failed: {0}")]
    Capture(#[source] AudioError),

    #[error("UDP send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("no peer endpoint set")]
    NoTarget,
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to open stream: {0}")]
    Stream(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("capture device closed")]
    Closed,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

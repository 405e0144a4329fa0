//! Continuous capture-amplify-send loop
//!
//! Owns the UDP socket (bound before the handshake so its port can be
//! advertised) and the capture device. Runs until cancelled or a send
//! fails; teardown stops and releases the device on every exit path.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::amplifier::amplify;
use crate::audio::capture::CaptureDevice;
use crate::audio::volume::VolumeControl;
use crate::error::UplinkError;
use crate::protocol::PeerEndpoint;

/// UDP audio uplink worker
pub struct AudioUplink {
    socket: UdpSocket,
    capture: Box<dyn CaptureDevice>,
    volume: VolumeControl,
    cancel: Arc<AtomicBool>,
    target: Option<SocketAddr>,
}

impl AudioUplink {
    pub fn new(
        socket: UdpSocket,
        capture: Box<dyn CaptureDevice>,
        volume: VolumeControl,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            socket,
            capture,
            volume,
            cancel,
            target: None,
        }
    }

    /// Install the negotiated streaming target; must happen before `run`
    pub fn set_target(&mut self, peer: PeerEndpoint) {
        self.target = Some(SocketAddr::new(peer.address, peer.udp_port));
    }

    /// Run the streaming loop on the current thread until cancelled or a
    /// failure occurs, then tear down the capture device.
    pub fn run(mut self) -> Result<(), UplinkError> {
        let target = self.target.ok_or(UplinkError::NoTarget)?;
        let mut buf = vec![0u8; self.capture.buffer_len()];
        tracing::debug!(%target, buffer = buf.len(), volume = self.volume.get(), "uplink streaming");

        let result = self.stream_loop(target, &mut buf);

        self.capture.stop();
        self.capture.release();
        // UDP socket closes on drop
        result
    }

    fn stream_loop(&mut self, target: SocketAddr, buf: &mut [u8]) -> Result<(), UplinkError> {
        while !self.cancel.load(Ordering::SeqCst) {
            let n = self
                .capture
                .read_into(buf)
                .map_err(UplinkError::Capture)?;
            if n == 0 {
                // Stalled or stopping; re-check cancellation
                continue;
            }
            amplify(&mut buf[..n], self.volume.get());
            self.socket
                .send_to(&buf[..n], target)
                .map_err(UplinkError::Send)?;
        }
        Ok(())
    }

    /// Spawn the loop on a dedicated named thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<(), UplinkError>>> {
        thread::Builder::new()
            .name("audio-uplink".to_string())
            .spawn(move || self.run())
    }
}

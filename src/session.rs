//! Session orchestration
//!
//! [`StreamSession`] sequences the handshake server and the audio uplink,
//! owns the authoritative [`SessionState`], and pushes every transition to
//! the controller over a channel. A session instance is single-shot: every
//! failure is terminal and a fresh session is needed for a new run.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::capture::CaptureDevice;
use crate::audio::format::AudioFormatSpec;
use crate::audio::volume::VolumeControl;
use crate::config::AppConfig;
use crate::error::{Error, UplinkError};
use crate::network::handshake::HandshakeServer;
use crate::network::uplink::AudioUplink;
use crate::protocol::PeerEndpoint;

/// Lifecycle of one streaming session.
///
/// Transitions are monotonic within a run (Starting → Started → Connected →
/// Stopping → Stopped) except that any point may jump to Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Started,
    Connected,
    Stopping,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Started => "started",
            SessionState::Connected => "connected",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// One state transition, delivered in occurrence order.
///
/// `failure` carries the cause whenever `state` is [`SessionState::Error`]:
/// the typed error for worker failures, a rendered message for failures
/// inside `start()` (which also returns the typed error to the caller).
#[derive(Debug)]
pub struct SessionEvent {
    pub state: SessionState,
    pub failure: Option<Error>,
}

struct SessionShared {
    state: Mutex<SessionState>,
    events: Sender<SessionEvent>,
}

impl SessionShared {
    fn transition(&self, state: SessionState, failure: Option<Error>) {
        *self.state.lock() = state;
        // The controller may have dropped its receiver during shutdown
        let _ = self.events.send(SessionEvent { state, failure });
    }
}

/// Controller-owned handle for one streaming run
pub struct StreamSession {
    config: AppConfig,
    shared: Arc<SessionShared>,
    volume: VolumeControl,
    cancel: Arc<AtomicBool>,
    capture: Option<Box<dyn CaptureDevice>>,
    handshake_handle: Option<JoinHandle<()>>,
    uplink_handle: Arc<Mutex<Option<JoinHandle<Result<(), UplinkError>>>>>,
    control_addr: Option<SocketAddr>,
    started: bool,
}

impl StreamSession {
    /// Create a session around a capture device. Returns the session handle
    /// and the receiver for state-change notifications.
    pub fn new(
        config: AppConfig,
        capture: Box<dyn CaptureDevice>,
    ) -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded();
        let volume = VolumeControl::new(config.volume.multiplier);
        let session = Self {
            config,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Stopped),
                events: tx,
            }),
            volume,
            cancel: Arc::new(AtomicBool::new(false)),
            capture: Some(capture),
            handshake_handle: None,
            uplink_handle: Arc::new(Mutex::new(None)),
            control_addr: None,
            started: false,
        };
        (session, rx)
    }

    /// Current authoritative state
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Update the volume multiplier; takes effect on the next loop iteration
    pub fn set_volume(&self, multiplier: f32) {
        self.volume.set(multiplier);
    }

    /// Effective (clamped) multiplier
    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Cloneable handle to the volume cell, for a controller UI task
    pub fn volume_control(&self) -> VolumeControl {
        self.volume.clone()
    }

    /// Address of the TCP control listener, once `start()` succeeded
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    /// Bind both sockets and begin the handshake accept loop.
    ///
    /// Bind failures are returned directly (the session moves to Error and
    /// never starts its workers); later worker failures arrive as events.
    pub fn start(&mut self) -> crate::Result<()> {
        if self.started {
            return Err(Error::Session(
                "session instances are single-shot; create a new one".to_string(),
            ));
        }
        let capture = self
            .capture
            .take()
            .ok_or_else(|| Error::Session("capture device already consumed".to_string()))?;
        self.started = true;

        self.shared.transition(SessionState::Starting, None);

        let bind_ip = self.config.network.bind_address;
        let format: AudioFormatSpec = self.config.audio;

        // Ephemeral UDP port first, so the handshake can advertise it
        let socket = match UdpSocket::bind(SocketAddr::new(bind_ip, 0)) {
            Ok(s) => s,
            Err(e) => return Err(self.fail_during_start(UplinkError::Bind(e).into())),
        };
        let udp_port = match socket.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => return Err(self.fail_during_start(UplinkError::Bind(e).into())),
        };

        let server = match HandshakeServer::open(
            bind_ip,
            self.config.network.tcp_port,
            udp_port,
            format.sample_rate,
        ) {
            Ok(s) => s,
            Err(e) => return Err(self.fail_during_start(e.into())),
        };
        self.control_addr = server.local_addr().ok();

        let uplink = AudioUplink::new(socket, capture, self.volume.clone(), self.cancel.clone());

        self.shared.transition(SessionState::Started, None);
        tracing::info!(control = ?self.control_addr, udp_port, "session started, waiting for receiver");

        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        let uplink_slot = self.uplink_handle.clone();

        let handle = thread::Builder::new()
            .name("handshake-server".to_string())
            .spawn(move || {
                Self::handshake_worker(server, uplink, udp_port, shared, cancel, uplink_slot);
            });

        match handle {
            Ok(h) => {
                self.handshake_handle = Some(h);
                Ok(())
            }
            Err(e) => Err(self.fail_during_start(Error::Io(e))),
        }
    }

    fn handshake_worker(
        server: HandshakeServer,
        mut uplink: AudioUplink,
        udp_port: u16,
        shared: Arc<SessionShared>,
        cancel: Arc<AtomicBool>,
        uplink_slot: Arc<Mutex<Option<JoinHandle<Result<(), UplinkError>>>>>,
    ) {
        match server.run(&cancel) {
            Ok(Some(peer)) => {
                // Protocol contract: the receiver listens on the same port
                // number our UDP socket was bound to.
                uplink.set_target(PeerEndpoint::new(peer.ip(), udp_port));
                tracing::info!(peer = %peer.ip(), udp_port, "receiver connected, starting uplink");

                let uplink_shared = shared.clone();
                let spawned = thread::Builder::new()
                    .name("audio-uplink".to_string())
                    .spawn(move || {
                        let result = uplink.run();
                        if let Err(e) = &result {
                            tracing::error!(error = %e, "uplink stopped on failure");
                        }
                        result
                    });

                match spawned {
                    Ok(h) => {
                        *uplink_slot.lock() = Some(h);
                        shared.transition(SessionState::Connected, None);
                        Self::watch_uplink(shared, uplink_slot, cancel);
                    }
                    Err(e) => shared.transition(SessionState::Error, Some(Error::Io(e))),
                }
            }
            Ok(None) => {
                // Cancelled before a client connected; not an error
                tracing::debug!("handshake cancelled, no receiver connected");
            }
            Err(e) => {
                tracing::error!(error = %e, "handshake failed");
                shared.transition(SessionState::Error, Some(e.into()));
            }
        }
        // Listener closes when the server drops, success or failure
    }

    /// Wait for the uplink to finish and surface its failure, if any.
    ///
    /// Runs on the handshake thread after its own work is done, so a failed
    /// send produces exactly one Error event without a third worker. On
    /// cancellation the uplink handle is left for `stop()` to join.
    fn watch_uplink(
        shared: Arc<SessionShared>,
        uplink_slot: Arc<Mutex<Option<JoinHandle<Result<(), UplinkError>>>>>,
        cancel: Arc<AtomicBool>,
    ) {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let finished = uplink_slot.lock().as_ref().map(|h| h.is_finished());
            match finished {
                None => return,
                Some(false) => thread::sleep(std::time::Duration::from_millis(10)),
                Some(true) => {
                    // Uplink finished on its own; join and report
                    let handle = uplink_slot.lock().take();
                    if let Some(h) = handle {
                        match h.join() {
                            Ok(Err(e)) => shared.transition(SessionState::Error, Some(e.into())),
                            Ok(Ok(())) => {}
                            Err(_) => shared.transition(
                                SessionState::Error,
                                Some(Error::Session("uplink worker panicked".to_string())),
                            ),
                        }
                    }
                    return;
                }
            }
        }
    }

    fn fail_during_start(&self, err: Error) -> Error {
        tracing::error!(error = %err, "session failed to start");
        // The typed error goes to the caller; the event carries a rendered
        // copy so the notification channel stands on its own.
        self.shared
            .transition(SessionState::Error, Some(Error::Session(err.to_string())));
        err
    }

    /// Cancel both workers, join them, and release their resources.
    ///
    /// Synchronous: when this returns, the sockets and the capture device
    /// are closed. Safe to call whether or not the session ever connected.
    pub fn stop(&mut self) {
        self.shared.transition(SessionState::Stopping, None);
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handshake_handle.take() {
            let _ = handle.join();
        }
        let uplink = self.uplink_handle.lock().take();
        if let Some(handle) = uplink {
            let _ = handle.join();
        }

        self.shared.transition(SessionState::Stopped, None);
        tracing::debug!("session stopped");
    }
}

impl Drop for StreamSession {
    /// Cancel and join the workers if the controller never called `stop()`,
    /// so a dropped session cannot leak its threads. No state events are
    /// emitted here; the receiver is usually gone by this point.
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handshake_handle.take() {
            let _ = handle.join();
        }
        let uplink = self.uplink_handle.lock().take();
        if let Some(handle) = uplink {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, VolumeConfig};
    use crate::error::AudioError;
    use crate::protocol;
    use std::io::BufReader;
    use std::net::{IpAddr, Ipv4Addr, TcpStream};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct FakeCapture {
        chunk_len: usize,
        fail_at: Option<usize>,
        served: usize,
        releases: Arc<AtomicUsize>,
    }

    impl FakeCapture {
        fn new(chunk_len: usize) -> (Self, Arc<AtomicUsize>) {
            let releases = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    chunk_len,
                    fail_at: None,
                    served: 0,
                    releases: releases.clone(),
                },
                releases,
            )
        }
    }

    impl CaptureDevice for FakeCapture {
        fn buffer_len(&self) -> usize {
            self.chunk_len
        }

        fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
            if let Some(at) = self.fail_at {
                if self.served >= at {
                    return Err(AudioError::Stream("injected failure".to_string()));
                }
            }
            self.served += 1;
            thread::sleep(Duration::from_millis(2));
            buf[..self.chunk_len].fill(0);
            Ok(self.chunk_len)
        }

        fn stop(&mut self) {}

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn localhost_config() -> AppConfig {
        AppConfig {
            network: NetworkConfig {
                tcp_port: 0,
                bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            },
            audio: AudioFormatSpec::default(),
            volume: VolumeConfig { multiplier: 2.0 },
        }
    }

    fn wait_for(rx: &Receiver<SessionEvent>, state: SessionState) -> SessionEvent {
        let deadline = Duration::from_secs(5);
        loop {
            let event = rx.recv_timeout(deadline).expect("event before timeout");
            if event.state == state {
                return event;
            }
        }
    }

    #[test]
    fn test_full_session_lifecycle() {
        let (capture, releases) = FakeCapture::new(640);
        let (mut session, events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        assert_eq!(wait_for(&events, SessionState::Starting).state, SessionState::Starting);
        wait_for(&events, SessionState::Started);

        let addr = session.control_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream);
        let (udp_port, rate) = protocol::read_handshake(&mut reader).unwrap();
        assert_ne!(udp_port, 0);
        assert_eq!(rate, 48000);

        wait_for(&events, SessionState::Connected);
        assert_eq!(session.state(), SessionState::Connected);

        session.stop();
        wait_for(&events, SessionState::Stopping);
        wait_for(&events, SessionState::Stopped);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_before_any_client() {
        let (capture, _) = FakeCapture::new(640);
        let (mut session, events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        wait_for(&events, SessionState::Started);

        let start = Instant::now();
        session.stop();
        // The accept loop observes cancellation within one timeout cycle
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Stopped);

        // No Error event anywhere in the run
        while let Ok(event) = events.try_recv() {
            assert_ne!(event.state, SessionState::Error);
        }
    }

    #[test]
    fn test_uplink_failure_reports_error_once() {
        let (mut capture, releases) = FakeCapture::new(640);
        capture.fail_at = Some(5);
        let (mut session, events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        wait_for(&events, SessionState::Started);

        let stream = TcpStream::connect(session.control_addr().unwrap()).unwrap();
        let mut reader = BufReader::new(stream);
        protocol::read_handshake(&mut reader).unwrap();

        wait_for(&events, SessionState::Connected);

        let event = wait_for(&events, SessionState::Error);
        assert!(matches!(
            event.failure,
            Some(Error::Uplink(UplinkError::Capture(_)))
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // Terminal: the controller reacts by stopping
        session.stop();
        let mut error_events = 0;
        while let Ok(event) = events.try_recv() {
            if event.state == SessionState::Error {
                error_events += 1;
            }
        }
        assert_eq!(error_events, 0, "error must be reported exactly once");
    }

    #[test]
    fn test_send_failure_reports_error_once() {
        // Buffers above the 65507-byte UDP maximum make send_to fail
        let (capture, releases) = FakeCapture::new(70_000);
        let (mut session, events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        wait_for(&events, SessionState::Started);

        let stream = TcpStream::connect(session.control_addr().unwrap()).unwrap();
        let mut reader = BufReader::new(stream);
        protocol::read_handshake(&mut reader).unwrap();

        wait_for(&events, SessionState::Connected);

        let event = wait_for(&events, SessionState::Error);
        assert!(matches!(
            event.failure,
            Some(Error::Uplink(UplinkError::Send(_)))
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        session.stop();
        let mut error_events = 0;
        while let Ok(event) = events.try_recv() {
            if event.state == SessionState::Error {
                error_events += 1;
            }
        }
        assert_eq!(error_events, 0, "error must be reported exactly once");
    }

    #[test]
    fn test_drop_joins_workers_without_stop() {
        let (capture, releases) = FakeCapture::new(640);
        let (mut session, events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        wait_for(&events, SessionState::Started);

        let stream = TcpStream::connect(session.control_addr().unwrap()).unwrap();
        let mut reader = BufReader::new(stream);
        protocol::read_handshake(&mut reader).unwrap();
        wait_for(&events, SessionState::Connected);

        let start = Instant::now();
        drop(session);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tcp_bind_conflict_fails_start() {
        let blocker = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut config = localhost_config();
        config.network.tcp_port = blocker.local_addr().unwrap().port();

        let (capture, _) = FakeCapture::new(640);
        let (mut session, events) = StreamSession::new(config, Box::new(capture));

        let result = session.start();
        assert!(matches!(
            result,
            Err(Error::Handshake(crate::error::HandshakeError::Bind(_)))
        ));
        assert_eq!(session.state(), SessionState::Error);

        let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
        assert_eq!(last.state, SessionState::Error);
        match last.failure {
            Some(Error::Session(msg)) => assert!(msg.contains("bind")),
            other => panic!("expected a rendered cause in the event, got {other:?}"),
        }
    }

    #[test]
    fn test_volume_clamped_through_session() {
        let (capture, _) = FakeCapture::new(640);
        let (session, _events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.set_volume(25.0);
        assert_eq!(session.volume(), 20.0);
        session.set_volume(-1.0);
        assert_eq!(session.volume(), 0.0);
    }

    #[test]
    fn test_session_is_single_shot() {
        let (capture, _) = FakeCapture::new(640);
        let (mut session, _events) = StreamSession::new(localhost_config(), Box::new(capture));

        session.start().unwrap();
        session.stop();
        assert!(matches!(session.start(), Err(Error::Session(_))));
    }
}

//! Audio receiver application
//!
//! The PC-side counterpart of the sender: connects to its TCP control port,
//! learns the UDP port and sample rate from the two-line handshake, binds
//! that UDP port, and plays every received datagram as one playback buffer.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io::BufReader;
use std::net::{Ipv4Addr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_mic_streamer::audio::buffer::{create_shared_ring, SharedChunkRing};
use lan_mic_streamer::constants::{DEFAULT_TCP_PORT, RING_BUFFER_CAPACITY};
use lan_mic_streamer::protocol;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let sender_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_TCP_PORT}"));

    tracing::info!(sender = %sender_addr, "Starting LAN mic receiver");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_worker = shutdown.clone();
    let worker =
        tokio::task::spawn_blocking(move || run_receiver(&sender_addr, &shutdown_for_worker));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    shutdown.store(true, Ordering::SeqCst);

    worker.await??;
    Ok(())
}

fn run_receiver(sender_addr: &str, shutdown: &AtomicBool) -> Result<()> {
    // Handshake: the sender tells us where to listen and at what rate
    let control = TcpStream::connect(sender_addr)
        .with_context(|| format!("connecting to sender at {sender_addr}"))?;
    let (udp_port, sample_rate) =
        protocol::read_handshake(&mut BufReader::new(control)).context("reading handshake")?;
    tracing::info!(udp_port, sample_rate, "handshake complete");

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, udp_port))
        .with_context(|| format!("binding UDP port {udp_port}"))?;
    // Bounded so the shutdown flag is observed between datagrams
    socket.set_read_timeout(Some(Duration::from_millis(500)))?;

    let ring = create_shared_ring(RING_BUFFER_CAPACITY);
    let _stream = start_playback(sample_rate, ring.clone())?;

    let mut buf = vec![0u8; 65536];
    while !shutdown.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((n, _)) => {
                // One datagram is one playback buffer
                let _ = ring.push(buf[..n].to_vec());
            }
            Err(e) if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
            {
                continue;
            }
            Err(e) => return Err(e).context("receiving audio datagram"),
        }
    }

    tracing::info!("receiver stopped");
    Ok(())
}

/// Build a mono PCM16 output stream that drains the chunk ring, playing
/// silence on underrun.
fn start_playback(sample_rate: u32, ring: SharedChunkRing) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        "opening playback device"
    );

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    // Bytes popped from the ring but not yet played
    let mut pending: Vec<u8> = Vec::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            for sample in data.iter_mut() {
                while pending.len() < 2 {
                    match ring.try_pop() {
                        Some(chunk) => pending.extend_from_slice(&chunk),
                        None => {
                            *sample = 0;
                            break;
                        }
                    }
                }
                if pending.len() >= 2 {
                    *sample = i16::from_le_bytes([pending[0], pending[1]]);
                    pending.drain(..2);
                } else {
                    *sample = 0;
                }
            }
        },
        |err| tracing::error!(error = %err, "playback stream error"),
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

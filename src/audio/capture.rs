//! Audio capture from the input device
//!
//! The core consumes capture through the [`CaptureDevice`] trait; the shipped
//! implementation backs it with a cpal input stream running on a dedicated
//! thread, feeding a lock-free chunk ring that `read_into` drains.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::{create_shared_ring, SharedChunkRing};
use crate::audio::format::AudioFormatSpec;
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::AudioError;

/// How long a read waits for fresh chunks before returning short.
///
/// A healthy stream delivers a chunk every few milliseconds; this bound only
/// exists so the uplink can re-check its cancel flag when the device stalls.
const READ_STALL_TIMEOUT: Duration = Duration::from_millis(100);

/// A source of raw PCM bytes, owned exclusively by the uplink worker.
///
/// `stop` and `release` must both be idempotent: teardown runs on every exit
/// path and may overlap with the drop of the device.
pub trait CaptureDevice: Send {
    /// Preferred read size in bytes; the uplink sizes its reusable buffer
    /// from this and sends one datagram per filled buffer.
    fn buffer_len(&self) -> usize;

    /// Fill `buf` with captured bytes, blocking briefly for data.
    ///
    /// May return fewer bytes than requested (including zero) when the
    /// device is stopping or stalls; a device failure is an error.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Stop delivering data
    fn stop(&mut self);

    /// Release device resources
    fn release(&mut self);
}

/// Capture device backed by the default cpal input device
pub struct CpalCapture {
    format: AudioFormatSpec,
    ring: SharedChunkRing,
    /// Bytes popped from the ring but not yet handed to a reader
    pending: Vec<u8>,
    running: Arc<AtomicBool>,
    stream_thread: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
    released: bool,
}

impl CpalCapture {
    /// Open the default input device with the requested format.
    ///
    /// The cpal stream itself is built on a dedicated thread because streams
    /// are not `Send`; build and runtime errors surface through `read_into`.
    pub fn open(format: AudioFormatSpec) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(device = %device_name, rate = format.sample_rate, "opening capture device");

        let config = StreamConfig {
            channels: format.channels.count(),
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = create_shared_ring(RING_BUFFER_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let running = Arc::new(AtomicBool::new(true));

        let ring_for_callback = ring.clone();
        let running_for_callback = running.clone();
        let running_for_loop = running.clone();
        let error_tx_for_callback = error_tx.clone();

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if !running_for_callback.load(Ordering::Relaxed) {
                            return;
                        }
                        let mut bytes = Vec::with_capacity(data.len() * 2);
                        for sample in data {
                            bytes.extend_from_slice(&sample.to_le_bytes());
                        }
                        // Overflow is counted by the ring; the callback must not block
                        let _ = ring_for_callback.push(bytes);
                    },
                    move |err| {
                        let _ = error_tx_for_callback.try_send(AudioError::Stream(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = error_tx.try_send(AudioError::Stream(e.to_string()));
                            return;
                        }
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                        // Stream is dropped here, stopping capture
                    }
                    Err(e) => {
                        let _ = error_tx.try_send(AudioError::Stream(e.to_string()));
                    }
                }
            })
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            format,
            ring,
            pending: Vec::new(),
            running,
            stream_thread: Some(handle),
            error_rx,
            released: false,
        })
    }

    fn take_error(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl CaptureDevice for CpalCapture {
    fn buffer_len(&self) -> usize {
        self.format.min_buffer_size()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if self.released {
            return Err(AudioError::Closed);
        }
        if let Some(err) = self.take_error() {
            return Err(err);
        }

        let deadline = Instant::now() + READ_STALL_TIMEOUT;
        let mut filled = 0;

        while filled < buf.len() {
            if self.pending.is_empty() {
                match self.ring.try_pop() {
                    Some(chunk) => self.pending = chunk,
                    None => {
                        if !self.running.load(Ordering::Relaxed) || Instant::now() >= deadline {
                            return Ok(filled);
                        }
                        if let Some(err) = self.take_error() {
                            return Err(err);
                        }
                        thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                }
            }

            let take = (buf.len() - filled).min(self.pending.len());
            buf[filled..filled + take].copy_from_slice(&self.pending[..take]);
            self.pending.drain(..take);
            filled += take;
        }

        Ok(filled)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }

    fn release(&mut self) {
        self.stop();
        self.pending.clear();
        while self.ring.try_pop().is_some() {}
        self.released = true;
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Audio format description and buffer sizing

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{CAPTURE_CHUNK_MS, DEFAULT_SAMPLE_RATE};

/// Channel layout of the captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn count(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Sample encoding on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Pcm16,
}

impl SampleEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::Pcm16 => 2,
        }
    }
}

/// Immutable description of the audio format for one session.
///
/// Produced by configuration, serialized (sample rate only) during the
/// handshake, and used to size the uplink's reusable capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormatSpec {
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub encoding: SampleEncoding,
}

impl Default for AudioFormatSpec {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: ChannelLayout::Mono,
            encoding: SampleEncoding::Pcm16,
        }
    }
}

impl AudioFormatSpec {
    /// Bytes occupied by one frame (one sample per channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels.count() as usize * self.encoding.bytes_per_sample()
    }

    /// Minimum capture buffer size in bytes: one chunk's worth of frames.
    ///
    /// Each read fills exactly one such buffer and each buffer becomes one
    /// UDP datagram.
    pub fn min_buffer_size(&self) -> usize {
        let frames = self.sample_rate as usize * CAPTURE_CHUNK_MS as usize / 1000;
        frames * self.bytes_per_frame()
    }

    /// Wall-clock duration of one capture chunk
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(CAPTURE_CHUNK_MS as u64)
    }
}

//! Audio subsystem module

pub mod amplifier;
pub mod buffer;
pub mod capture;
pub mod format;
pub mod volume;

pub use amplifier::amplify;
pub use capture::{CaptureDevice, CpalCapture};
pub use format::{AudioFormatSpec, ChannelLayout, SampleEncoding};
pub use volume::VolumeControl;

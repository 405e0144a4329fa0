//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory when present,
//! falling back to defaults that match the reference sender: TCP control
//! port 8126, 48 kHz mono PCM16, volume multiplier 10.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::audio::format::AudioFormatSpec;
use crate::constants::{DEFAULT_TCP_PORT, DEFAULT_VOLUME, MAX_VOLUME};
use crate::error::Error;

/// Network section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the handshake listener binds to
    pub tcp_port: u16,
    /// Local address to bind both sockets on
    pub bind_address: IpAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// Volume section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Initial multiplier; runtime changes go through the session
    pub multiplier: f32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_VOLUME,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioFormatSpec,
    pub volume: VolumeConfig,
}

impl AppConfig {
    /// Load from the config file if one exists, otherwise defaults
    pub fn load() -> crate::Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)?;
                let config: AppConfig = toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                config.validate()?;
                tracing::debug!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location (`config.toml` under the app dir)
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-mic-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if !(0.0..=MAX_VOLUME).contains(&self.volume.multiplier) {
            return Err(Error::Config(format!(
                "volume multiplier must be within 0..={MAX_VOLUME}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::ChannelLayout;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.network.tcp_port, 8126);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.channels, ChannelLayout::Mono);
        assert_eq!(config.volume.multiplier, 10.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [network]
            tcp_port = 9000

            [audio]
            sample_rate = 44100
            channels = "stereo"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.tcp_port, 9000);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.channels, ChannelLayout::Stereo);
        assert_eq!(config.volume.multiplier, 10.0);
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let mut config = AppConfig::default();
        config.audio.sample_rate = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_out_of_range_volume_rejected() {
        let mut config = AppConfig::default();
        config.volume.multiplier = 21.0;
        assert!(config.validate().is_err());
    }
}

//! Configuration for Drishti
//!
//! Loaded once at startup from a TOML file. Runtime changes (sonar socket
//! settings, projector parameters) go through [`crate::FusionContext`] and
//! are not written back.
//!
//! ```toml
//! [sonar]
//! multicast_addr = "224.0.0.96"
//! port = 4747
//! enabled = true
//!
//! [camera]
//! backend = "test_pattern"
//! device_index = 0
//! width = 1280
//! height = 720
//!
//! [projector.extrinsics]
//! rvec = [0.0, 0.0, 0.0]
//! tvec = [0.0, 0.0, 0.0]
//!
//! [projector.overlay]
//! point_radius = 2
//! decimate = 4
//!
//! [logging]
//! level = "info"
//! ```

use crate::core::types::{Extrinsics, Intrinsics, OverlayOptions};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub sonar: SonarConfig,
    pub camera: CameraConfig,
    pub projector: ProjectorConfig,
    pub logging: LoggingConfig,
}

/// Sonar multicast socket settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SonarConfig {
    /// IPv4 multicast group the sonar publishes to
    pub multicast_addr: String,
    /// UDP port
    pub port: u16,
    /// Whether the receiver should hold a socket at all
    pub enabled: bool,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            multicast_addr: "224.0.0.96".to_string(),
            port: 4747,
            enabled: true,
        }
    }
}

impl SonarConfig {
    /// Parsed multicast group
    pub fn group(&self) -> Result<Ipv4Addr> {
        let addr: Ipv4Addr = self.multicast_addr.trim().parse().map_err(|_| {
            Error::InvalidConfig(format!(
                "multicast_addr '{}' is not an IPv4 address",
                self.multicast_addr
            ))
        })?;
        if !addr.is_multicast() {
            return Err(Error::InvalidConfig(format!(
                "{} is not a multicast address",
                addr
            )));
        }
        Ok(addr)
    }

    /// Group address with port
    pub fn group_socket_addr(&self) -> Result<SocketAddrV4> {
        Ok(SocketAddrV4::new(self.group()?, self.port))
    }

    pub fn validate(&self) -> Result<()> {
        self.group()?;
        if self.port == 0 {
            return Err(Error::InvalidConfig("sonar port must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Camera capture settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture backend name (see [`crate::camera::create_backend`])
    pub backend: String,
    /// Device opened at startup, if any
    pub device_index: Option<u32>,
    /// Resolution hint passed to the device
    pub width: u32,
    pub height: u32,
    /// Frame rate of the test-pattern backend
    pub fps: u32,
    /// Device indices the test-pattern backend reports as present
    pub available_devices: Vec<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: "test_pattern".to_string(),
            device_index: None,
            width: 1280,
            height: 720,
            fps: 30,
            available_devices: vec![0],
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "camera resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(Error::InvalidConfig("camera fps must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Initial projector state
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectorConfig {
    pub extrinsics: Extrinsics,
    pub overlay: OverlayOptions,
    /// Camera intrinsics, if already calibrated
    pub intrinsics: Option<Intrinsics>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use drishti::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("drishti.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.sonar.validate()?;
        self.camera.validate()?;
        self.projector.overlay.validate()?;
        if let Some(intrinsics) = &self.projector.intrinsics {
            intrinsics.validate()?;
        }
        Ok(())
    }
}

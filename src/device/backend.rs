//! Capability contract every device transport implements.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::screenshot::Screenshot;

/// Pause between the two taps of the default double tap.
pub const DOUBLE_TAP_INTERVAL: Duration = Duration::from_millis(100);

/// Device backend errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Command execution failed: {0}")]
    CommandFailed(String),
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operating system family of a device. Selects the app registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Harmony,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Harmony => "harmony",
        })
    }
}

/// Transport used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Adb,
    Hdc,
    Wda,
}

impl DeviceKind {
    pub fn platform(&self) -> Platform {
        match self {
            DeviceKind::Adb => Platform::Android,
            DeviceKind::Hdc => Platform::Harmony,
            DeviceKind::Wda => Platform::Ios,
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adb" | "android" => Ok(DeviceKind::Adb),
            "hdc" | "harmony" | "harmonyos" => Ok(DeviceKind::Hdc),
            "wda" | "ios" => Ok(DeviceKind::Wda),
            other => Err(format!("unknown device type: {}", other)),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Adb => "adb",
            DeviceKind::Hdc => "hdc",
            DeviceKind::Wda => "wda",
        })
    }
}

/// Primitive operations the dispatcher drives, in absolute pixel space.
///
/// Backends own any per-device state (sessions, scale factors, the last
/// tap position) so several devices can be driven from one process.
/// The input-method hooks default to no-ops for platforms that can type
/// without switching keyboards.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    fn platform(&self) -> Platform;

    async fn screenshot(&self) -> Result<Screenshot, DeviceError>;

    /// Human-readable name of the foreground app.
    async fn current_app(&self) -> Result<String, DeviceError>;

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError>;

    async fn double_tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.tap(x, y).await?;
        tokio::time::sleep(DOUBLE_TAP_INTERVAL).await;
        self.tap(x, y).await
    }

    async fn long_press(&self, x: u32, y: u32, duration: Duration) -> Result<(), DeviceError> {
        self.swipe(x, y, x, y, duration).await
    }

    async fn swipe(
        &self,
        start_x: u32,
        start_y: u32,
        end_x: u32,
        end_y: u32,
        duration: Duration,
    ) -> Result<(), DeviceError>;

    async fn back(&self) -> Result<(), DeviceError>;

    async fn home(&self) -> Result<(), DeviceError>;

    /// Switch to the automation keyboard. Returns the input method to restore.
    async fn switch_input_method(&self) -> Result<Option<String>, DeviceError> {
        Ok(None)
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;

    async fn restore_input_method(&self, _original: Option<String>) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Launch an app by display name. `Ok(false)` when the registry has no entry.
    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError>;
}

//! Android devices driven through `adb`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;

use super::backend::{DeviceBackend, DeviceError, Platform};
use super::command::{self, stdout_text};
use super::screenshot::Screenshot;
use crate::config::apps;

const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

/// Package component of a `mCurrentFocus`/`mFocusedApp` line.
static FOCUS_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:mCurrentFocus|mFocusedApp).*?\s([A-Za-z][\w.]*)/").expect("valid focus regex")
});

/// An Android device reachable over USB, Wi-Fi or a remote adb server.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    device_id: Option<String>,
    adb_path: String,
    timeout: Duration,
    settle_delay: Duration,
}

impl AdbDevice {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            device_id,
            adb_path: "adb".to_string(),
            timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }

    /// Use a custom `adb` executable.
    pub fn with_adb_path(mut self, path: impl Into<String>) -> Self {
        self.adb_path = path.into();
        self
    }

    /// Per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause after each input so the UI can redraw before the next capture.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    fn prefix(&self) -> Vec<String> {
        match &self.device_id {
            Some(id) => vec!["-s".to_string(), id.clone()],
            None => Vec::new(),
        }
    }

    async fn adb(&self, args: &[&str]) -> Result<std::process::Output, DeviceError> {
        command::run(&self.adb_path, &self.prefix(), args, self.timeout).await
    }

    async fn shell(&self, args: &[&str]) -> Result<String, DeviceError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        let output = self.adb(&full).await?;
        Ok(stdout_text(&output))
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

/// Resolve the foreground app from `dumpsys window` output.
fn focused_app(dumpsys: &str) -> Option<&'static str> {
    dumpsys
        .lines()
        .filter_map(|line| FOCUS_PACKAGE.captures(line))
        .filter_map(|caps| caps.get(1))
        .find_map(|package| apps::app_for_package(Platform::Android, package.as_str()))
}

#[async_trait]
impl DeviceBackend for AdbDevice {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn screenshot(&self) -> Result<Screenshot, DeviceError> {
        // exec-out streams the PNG over stdout with no temp file on either side.
        let output = match self.adb(&["exec-out", "screencap", "-p"]).await {
            Ok(output) => output,
            Err(DeviceError::CommandFailed(msg)) => {
                tracing::warn!("Screenshot refused (sensitive screen?): {}", msg);
                return Ok(Screenshot::fallback(true));
            }
            Err(e) => return Err(e),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Status: -1") || stderr.contains("Failed") {
            tracing::warn!("Screenshot may have failed (sensitive screen): {}", stderr.trim());
            return Ok(Screenshot::fallback(true));
        }

        match Screenshot::from_png(&output.stdout) {
            Ok(screenshot) => Ok(screenshot),
            Err(e) => {
                tracing::error!("Unusable screenshot data: {}", e);
                Ok(Screenshot::fallback(false))
            }
        }
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        let dumpsys = self.shell(&["dumpsys", "window"]).await?;
        Ok(focused_app(&dumpsys).unwrap_or("System Home").to_string())
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await?;
        self.settle().await;
        Ok(())
    }

    async fn double_tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.shell(&["input", "tap", &x, &y]).await?;
        tokio::time::sleep(super::backend::DOUBLE_TAP_INTERVAL).await;
        self.shell(&["input", "tap", &x, &y]).await?;
        self.settle().await;
        Ok(())
    }

    async fn swipe(
        &self,
        start_x: u32,
        start_y: u32,
        end_x: u32,
        end_y: u32,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        self.shell(&[
            "input",
            "swipe",
            &start_x.to_string(),
            &start_y.to_string(),
            &end_x.to_string(),
            &end_y.to_string(),
            &duration.as_millis().to_string(),
        ])
        .await?;
        self.settle().await;
        Ok(())
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.shell(&["input", "keyevent", "4"]).await?;
        self.settle().await;
        Ok(())
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.shell(&["input", "keyevent", "KEYCODE_HOME"]).await?;
        self.settle().await;
        Ok(())
    }

    async fn switch_input_method(&self) -> Result<Option<String>, DeviceError> {
        let current = self
            .shell(&["settings", "get", "secure", "default_input_method"])
            .await?
            .trim()
            .to_string();

        let original = Some(current).filter(|ime| !ime.is_empty());

        if !original.as_deref().is_some_and(|ime| ime.contains(ADB_KEYBOARD_IME)) {
            self.shell(&["ime", "set", ADB_KEYBOARD_IME]).await?;
        }
        // An empty broadcast wakes the keyboard service. If that fails the
        // caller never learns the original IME, so put it back here.
        if let Err(e) = self.type_text("").await {
            if let Err(restore) = self.restore_input_method(original).await {
                tracing::warn!("Could not restore input method: {}", restore);
            }
            return Err(e);
        }

        Ok(original)
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.shell(&["am", "broadcast", "-a", "ADB_CLEAR_TEXT"])
            .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        let encoded = STANDARD.encode(text.as_bytes());
        self.shell(&["am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", &encoded])
            .await?;
        Ok(())
    }

    async fn restore_input_method(&self, original: Option<String>) -> Result<(), DeviceError> {
        match original {
            Some(ime) if !ime.contains(ADB_KEYBOARD_IME) => {
                self.shell(&["ime", "set", &ime]).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
        let Some(package) = apps::package_for(Platform::Android, app_name) else {
            return Ok(false);
        };

        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await?;
        self.settle().await;
        Ok(true)
    }
}

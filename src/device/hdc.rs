//! HarmonyOS devices driven through `hdc` and `uitest`.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::backend::{DeviceBackend, DeviceError, Platform};
use super::command::{self, stdout_text};
use super::screenshot::Screenshot;
use crate::config::apps;

const REMOTE_SCREENSHOT: &str = "/data/local/tmp/screenshot.png";

// uitest key codes
const KEY_ENTER: &str = "2054";
const KEY_CTRL: &str = "2072";
const KEY_A: &str = "2017";
const KEY_DEL: &str = "2055";

/// A HarmonyOS device.
///
/// `uitest uiInput inputText` types at a coordinate rather than into the
/// focused field, so the device keeps the position of its last tap.
#[derive(Debug)]
pub struct HdcDevice {
    target: Option<String>,
    hdc_path: String,
    timeout: Duration,
    last_tap: Mutex<Option<(u32, u32)>>,
}

impl HdcDevice {
    pub fn new(target: Option<String>) -> Self {
        Self {
            target,
            hdc_path: "hdc".to_string(),
            timeout: Duration::from_secs(10),
            last_tap: Mutex::new(None),
        }
    }

    pub fn with_hdc_path(mut self, path: impl Into<String>) -> Self {
        self.hdc_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Position of the most recent tap, if any.
    pub fn last_tap(&self) -> Option<(u32, u32)> {
        self.last_tap.lock().map(|guard| *guard).unwrap_or(None)
    }

    fn remember_tap(&self, x: u32, y: u32) {
        if let Ok(mut guard) = self.last_tap.lock() {
            *guard = Some((x, y));
        }
    }

    fn prefix(&self) -> Vec<String> {
        match &self.target {
            Some(id) => vec!["-t".to_string(), id.clone()],
            None => Vec::new(),
        }
    }

    async fn hdc(&self, args: &[&str]) -> Result<String, DeviceError> {
        let output = command::run(&self.hdc_path, &self.prefix(), args, self.timeout).await?;
        Ok(stdout_text(&output))
    }

    async fn ui_input(&self, args: &[&str]) -> Result<(), DeviceError> {
        let mut full = vec!["shell", "uitest", "uiInput"];
        full.extend_from_slice(args);
        self.hdc(&full).await.map(|_| ())
    }
}

/// Bundle of the foreground ability in `aa dump -l` output.
fn foreground_bundle(dump: &str) -> Option<&'static str> {
    let mut in_foreground_mission = false;
    for line in dump.lines().map(str::trim) {
        if line.starts_with("Mission ID") {
            in_foreground_mission = false;
        }
        if line.contains("FOREGROUND") {
            in_foreground_mission = true;
        }
        if let Some(rest) = line.strip_prefix("bundle name [") {
            let bundle = rest.trim_end_matches(']');
            if in_foreground_mission {
                if let Some(app) = apps::app_for_package(Platform::Harmony, bundle) {
                    return Some(app);
                }
            }
        }
    }
    None
}

#[async_trait]
impl DeviceBackend for HdcDevice {
    fn platform(&self) -> Platform {
        Platform::Harmony
    }

    async fn screenshot(&self) -> Result<Screenshot, DeviceError> {
        let local: PathBuf =
            std::env::temp_dir().join(format!("harmony_screenshot_{}.png", uuid::Uuid::new_v4()));
        let local_str = local.to_string_lossy().into_owned();

        // A stale file would be returned if screenCap is refused.
        let _ = self.hdc(&["shell", "rm", "-f", REMOTE_SCREENSHOT]).await;
        if let Err(e) = self
            .hdc(&["shell", "uitest", "screenCap", "-p", REMOTE_SCREENSHOT])
            .await
        {
            tracing::warn!("screenCap failed: {}", e);
            return Ok(Screenshot::fallback(true));
        }
        self.hdc(&["file", "recv", REMOTE_SCREENSHOT, &local_str])
            .await?;

        let bytes = tokio::fs::read(&local).await;
        let _ = tokio::fs::remove_file(&local).await;

        match bytes.map_err(DeviceError::from).and_then(|b| Screenshot::from_png(&b)) {
            Ok(screenshot) => Ok(screenshot),
            Err(e) => {
                tracing::error!("Unusable screenshot data: {}", e);
                Ok(Screenshot::fallback(false))
            }
        }
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        let dump = self.hdc(&["shell", "aa", "dump", "-l"]).await?;
        Ok(foreground_bundle(&dump).unwrap_or("System Home").to_string())
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.ui_input(&["click", &x.to_string(), &y.to_string()])
            .await?;
        self.remember_tap(x, y);
        Ok(())
    }

    async fn double_tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.ui_input(&["doubleClick", &x.to_string(), &y.to_string()])
            .await?;
        self.remember_tap(x, y);
        Ok(())
    }

    async fn long_press(&self, x: u32, y: u32, _duration: Duration) -> Result<(), DeviceError> {
        // uitest's longClick has a fixed hold time.
        self.ui_input(&["longClick", &x.to_string(), &y.to_string()])
            .await
    }

    async fn swipe(
        &self,
        start_x: u32,
        start_y: u32,
        end_x: u32,
        end_y: u32,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        // uitest takes a velocity in px/s, not a duration.
        let dx = start_x.abs_diff(end_x) as f64;
        let dy = start_y.abs_diff(end_y) as f64;
        let distance = (dx * dx + dy * dy).sqrt();
        let velocity = (distance / duration.as_secs_f64().max(0.1)).clamp(200.0, 40000.0) as u32;

        self.ui_input(&[
            "swipe",
            &start_x.to_string(),
            &start_y.to_string(),
            &end_x.to_string(),
            &end_y.to_string(),
            &velocity.to_string(),
        ])
        .await
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.ui_input(&["keyEvent", "Back"]).await
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.ui_input(&["keyEvent", "Home"]).await
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.ui_input(&["keyEvent", KEY_CTRL, KEY_A]).await?;
        self.ui_input(&["keyEvent", KEY_DEL]).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        let Some((x, y)) = self.last_tap() else {
            return Err(DeviceError::Unsupported(
                "inputText needs a target; tap the input field first",
            ));
        };
        let (x, y) = (x.to_string(), y.to_string());

        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.ui_input(&["keyEvent", KEY_ENTER]).await?;
            }
            if !line.is_empty() {
                self.ui_input(&["inputText", &x, &y, line]).await?;
            }
        }
        Ok(())
    }

    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
        let Some(bundle) = apps::package_for(Platform::Harmony, app_name) else {
            return Ok(false);
        };
        self.hdc(&["shell", "aa", "start", "-b", bundle, "-a", "EntryAbility"])
            .await?;
        Ok(true)
    }
}

//! Device backends: Android (adb), HarmonyOS (hdc) and iOS (WebDriverAgent).

mod adb;
mod backend;
mod command;
mod hdc;
mod screenshot;
mod wda;

use std::sync::Arc;
use std::time::Duration;

pub use adb::AdbDevice;
pub use backend::{DeviceBackend, DeviceError, DeviceKind, Platform, DOUBLE_TAP_INTERVAL};
pub use hdc::HdcDevice;
pub use screenshot::{Screenshot, FALLBACK_HEIGHT, FALLBACK_WIDTH};
pub use wda::WdaDevice;

/// Default WebDriverAgent endpoint (iproxy / USB forwarding).
pub const DEFAULT_WDA_URL: &str = "http://localhost:8100";

/// Build the backend for `kind`.
///
/// `device_id` selects a device for adb/hdc; `wda_url` is only read for iOS.
pub fn create_device(
    kind: DeviceKind,
    device_id: Option<String>,
    wda_url: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn DeviceBackend>, DeviceError> {
    tracing::info!("Using {} backend", kind);
    Ok(match kind {
        DeviceKind::Adb => Arc::new(AdbDevice::new(device_id).with_timeout(timeout)),
        DeviceKind::Hdc => Arc::new(HdcDevice::new(device_id).with_timeout(timeout)),
        DeviceKind::Wda => Arc::new(WdaDevice::new(
            wda_url.unwrap_or(DEFAULT_WDA_URL),
            timeout,
        )?),
    })
}

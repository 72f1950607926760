//! iOS devices driven through WebDriverAgent's HTTP API.
//!
//! Screen coordinates arrive in pixels; WDA works in points, so every
//! position is divided by the screen scale reported by `/wda/screen`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};

use super::backend::{DeviceBackend, DeviceError, Platform};
use super::screenshot::Screenshot;
use crate::config::apps;

const DEFAULT_SCALE: f64 = 3.0;
const KEY_FREQUENCY: u32 = 60;

/// Edge swipe standing in for the missing hardware back button, in points.
const BACK_SWIPE_START_X: f64 = 10.0;
const BACK_SWIPE_END_X: f64 = 150.0;
const BACK_SWIPE_Y: f64 = 400.0;
const BACK_SWIPE_DURATION: Duration = Duration::from_millis(300);

/// An iOS device running WebDriverAgent.
#[derive(Debug)]
pub struct WdaDevice {
    base_url: String,
    http: Client,
    session_id: Mutex<Option<String>>,
    scale: OnceCell<f64>,
}

impl WdaDevice {
    /// Connect to WDA at `base_url`, e.g. `http://localhost:8100`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DeviceError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            session_id: Mutex::new(None),
            scale: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn session(&self) -> Result<String, DeviceError> {
        let mut guard = self.session_id.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }

        let body = self
            .send(Method::POST, "/session", Some(json!({ "capabilities": {} })))
            .await?;
        let id = body
            .get("sessionId")
            .or_else(|| body.pointer("/value/sessionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| DeviceError::InvalidResponse("no sessionId in /session reply".into()))?
            .to_string();

        tracing::debug!("Created WDA session {}", id);
        *guard = Some(id.clone());
        Ok(id)
    }

    async fn invalidate_session(&self) {
        *self.session_id.lock().await = None;
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DeviceError> {
        self.send_raw(method, path, body)
            .await?
            .map_err(|(status, text)| {
                DeviceError::CommandFailed(format!("WDA {} -> {}: {}", path, status, text))
            })
    }

    /// Returns the JSON body, or the status and text of a non-2xx reply.
    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Result<Value, (StatusCode, String)>, DeviceError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("WDA {} {}", method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Err((status, response.text().await.unwrap_or_default())));
        }
        Ok(Ok(response.json::<Value>().await?))
    }

    /// Session-scoped call. A stale session (404) is recreated once.
    async fn session_call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DeviceError> {
        for attempt in 0..2 {
            let session = self.session().await?;
            let full = format!("/session/{}{}", session, path);
            match self.send_raw(method.clone(), &full, body.clone()).await? {
                Ok(value) => return Ok(value),
                Err((StatusCode::NOT_FOUND, _)) if attempt == 0 => {
                    tracing::warn!("WDA session {} expired, recreating", session);
                    self.invalidate_session().await;
                }
                Err((status, text)) => {
                    return Err(DeviceError::CommandFailed(format!(
                        "WDA {} -> {}: {}",
                        path, status, text
                    )))
                }
            }
        }
        Err(DeviceError::InvalidResponse(format!(
            "WDA {} kept returning 404",
            path
        )))
    }

    async fn scale(&self) -> f64 {
        *self
            .scale
            .get_or_init(|| async {
                match self.send(Method::GET, "/wda/screen", None).await {
                    Ok(body) => scale_from_screen(&body),
                    Err(e) => {
                        tracing::warn!("Could not read screen scale, assuming {}: {}", DEFAULT_SCALE, e);
                        DEFAULT_SCALE
                    }
                }
            })
            .await
    }

    async fn to_points(&self, x: u32, y: u32) -> (f64, f64) {
        let scale = self.scale().await;
        (x as f64 / scale, y as f64 / scale)
    }

    async fn drag_points(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> Result<(), DeviceError> {
        self.session_call(
            Method::POST,
            "/wda/dragfromtoforduration",
            Some(json!({
                "fromX": from.0,
                "fromY": from.1,
                "toX": to.0,
                "toY": to.1,
                "duration": duration.as_secs_f64(),
            })),
        )
        .await
        .map(|_| ())
    }
}

fn scale_from_screen(body: &Value) -> f64 {
    body.pointer("/value/scale")
        .and_then(Value::as_f64)
        .filter(|s| *s > 0.0)
        .unwrap_or(DEFAULT_SCALE)
}

/// Id of the focused element in a `/element/active` reply.
fn element_id(body: &Value) -> Option<&str> {
    let value = body.get("value")?;
    value
        .get("ELEMENT")
        .or_else(|| value.get("element-6066-11e4-a52e-4f735466cecf"))
        .and_then(Value::as_str)
}

#[async_trait]
impl DeviceBackend for WdaDevice {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn screenshot(&self) -> Result<Screenshot, DeviceError> {
        let body = self.send(Method::GET, "/screenshot", None).await?;
        let data = body
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| DeviceError::InvalidResponse("screenshot value missing".into()))?;

        match Screenshot::from_base64_png(data) {
            Ok(screenshot) => Ok(screenshot),
            Err(e) => {
                tracing::error!("Unusable screenshot data: {}", e);
                Ok(Screenshot::fallback(false))
            }
        }
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        let body = self.send(Method::GET, "/wda/activeAppInfo", None).await?;
        let bundle = body
            .pointer("/value/bundleId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(apps::app_for_package(Platform::Ios, bundle)
            .unwrap_or("System Home")
            .to_string())
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        let (x, y) = self.to_points(x, y).await;
        self.session_call(Method::POST, "/wda/tap", Some(json!({ "x": x, "y": y })))
            .await
            .map(|_| ())
    }

    async fn double_tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        let (x, y) = self.to_points(x, y).await;
        self.session_call(Method::POST, "/wda/doubleTap", Some(json!({ "x": x, "y": y })))
            .await
            .map(|_| ())
    }

    async fn long_press(&self, x: u32, y: u32, duration: Duration) -> Result<(), DeviceError> {
        let (x, y) = self.to_points(x, y).await;
        self.session_call(
            Method::POST,
            "/wda/touchAndHold",
            Some(json!({ "x": x, "y": y, "duration": duration.as_secs_f64() })),
        )
        .await
        .map(|_| ())
    }

    async fn swipe(
        &self,
        start_x: u32,
        start_y: u32,
        end_x: u32,
        end_y: u32,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        let from = self.to_points(start_x, start_y).await;
        let to = self.to_points(end_x, end_y).await;
        self.drag_points(from, to, duration).await
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.drag_points(
            (BACK_SWIPE_START_X, BACK_SWIPE_Y),
            (BACK_SWIPE_END_X, BACK_SWIPE_Y),
            BACK_SWIPE_DURATION,
        )
        .await
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.send(Method::POST, "/wda/homescreen", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        let active = self.session_call(Method::GET, "/element/active", None).await?;
        match element_id(&active) {
            Some(id) => self
                .session_call(Method::POST, &format!("/element/{}/clear", id), Some(json!({})))
                .await
                .map(|_| ()),
            None => {
                tracing::debug!("No focused element to clear");
                Ok(())
            }
        }
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        if text.is_empty() {
            return Ok(());
        }
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.session_call(
            Method::POST,
            "/wda/keys",
            Some(json!({ "value": chars, "frequency": KEY_FREQUENCY })),
        )
        .await
        .map(|_| ())
    }

    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
        let Some(bundle) = apps::package_for(Platform::Ios, app_name) else {
            return Ok(false);
        };
        self.session_call(
            Method::POST,
            "/wda/apps/launch",
            Some(json!({ "bundleId": bundle })),
        )
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_from_screen() {
        let body = json!({ "value": { "scale": 2.0, "screenSize": { "width": 390 } } });
        assert_eq!(scale_from_screen(&body), 2.0);
        assert_eq!(scale_from_screen(&json!({ "value": {} })), DEFAULT_SCALE);
        assert_eq!(scale_from_screen(&json!({ "value": { "scale": 0 } })), DEFAULT_SCALE);
    }

    #[test]
    fn test_element_id() {
        let legacy = json!({ "value": { "ELEMENT": "abc" } });
        let w3c = json!({ "value": { "element-6066-11e4-a52e-4f735466cecf": "def" } });
        assert_eq!(element_id(&legacy), Some("abc"));
        assert_eq!(element_id(&w3c), Some("def"));
        assert_eq!(element_id(&json!({ "value": null })), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let device = WdaDevice::new("http://localhost:8100/", Duration::from_secs(5)).unwrap();
        assert_eq!(device.base_url(), "http://localhost:8100");
    }

    #[tokio::test]
    async fn test_launch_unknown_app_makes_no_request() {
        let device = WdaDevice::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(!device.launch_app("UnknownApp123").await.unwrap());
    }
}

//! Action dispatch onto a device backend.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use super::types::{Action, ActionName, ActionParams, ActionResult, Coordinate};
use crate::config::{get_messages, Lang, Messages};
use crate::device::{DeviceBackend, DeviceError};

/// Callback type for confirmation requests.
pub type ConfirmationCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback type for takeover requests.
pub type TakeoverCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Swipe durations are clamped to this range.
pub const MIN_SWIPE_DURATION: Duration = Duration::from_millis(1000);
pub const MAX_SWIPE_DURATION: Duration = Duration::from_millis(2000);

pub const LONG_PRESS_DURATION: Duration = Duration::from_millis(3000);

pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);
pub const MAX_WAIT: Duration = Duration::from_secs(60);

static DURATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)?\s*$")
        .expect("valid duration regex")
});

/// Parse `"3 seconds"`, `"3s"`, `"3"` or `"500ms"`. Bare numbers are seconds.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let caps = DURATION_PATTERN.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let millis = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit.starts_with("m") => value,
        _ => value * 1000.0,
    };
    Some(Duration::from_millis(millis.round() as u64))
}

/// Wait length for a `Wait` action: defaults to one second, capped at a minute.
pub fn wait_duration(duration: Option<&str>) -> Duration {
    duration
        .and_then(parse_duration)
        .unwrap_or(DEFAULT_WAIT)
        .min(MAX_WAIT)
}

/// Swipe length: the requested duration if given, else derived from distance.
pub fn swipe_duration(start: (u32, u32), end: (u32, u32), requested: Option<&str>) -> Duration {
    let computed = requested.and_then(parse_duration).unwrap_or_else(|| {
        let dx = start.0.abs_diff(end.0) as u64;
        let dy = start.1.abs_diff(end.1) as u64;
        Duration::from_millis((dx * dx + dy * dy) / 1000)
    });
    computed.clamp(MIN_SWIPE_DURATION, MAX_SWIPE_DURATION)
}

/// Handles execution of actions from AI model output.
///
/// Every `do(...)` action maps to device primitives in absolute pixels.
/// Device failures become failed results; they never propagate.
pub struct ActionHandler {
    device: Arc<dyn DeviceBackend>,
    confirmation_callback: Option<ConfirmationCallback>,
    takeover_callback: Option<TakeoverCallback>,
    input_delay: Duration,
    /// Language of the console prompts used when no callback is set.
    lang: Lang,
}

impl ActionHandler {
    /// Create a new ActionHandler. Missing callbacks fall back to console prompts.
    pub fn new(
        device: Arc<dyn DeviceBackend>,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        Self {
            device,
            confirmation_callback,
            takeover_callback,
            input_delay: Duration::from_secs(1),
            lang: Lang::default(),
        }
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    /// Pause between the phases of a `Type` action.
    pub fn with_input_delay(mut self, delay: Duration) -> Self {
        self.input_delay = delay;
        self
    }

    pub fn device(&self) -> &Arc<dyn DeviceBackend> {
        &self.device
    }

    /// Execute an action against the current screen size.
    pub async fn execute(&self, action: &Action, screen_width: u32, screen_height: u32) -> ActionResult {
        let action = match action {
            Action::Finish { message } => return ActionResult::finish(Some(message.clone())),
            Action::Do(action) => action,
        };
        let params = &action.params;
        let screen = (screen_width, screen_height);

        tracing::debug!("Dispatching {}", action.name);

        let outcome = match &action.name {
            ActionName::Launch => self.handle_launch(params).await,
            ActionName::Tap => self.handle_tap(params, screen).await,
            ActionName::Type | ActionName::TypeName => self.handle_type(params).await,
            ActionName::Swipe => self.handle_swipe(params, screen).await,
            ActionName::Back => self.device.back().await.map(|_| ActionResult::success()),
            ActionName::Home => self.device.home().await.map(|_| ActionResult::success()),
            ActionName::DoubleTap => self.handle_double_tap(params, screen).await,
            ActionName::LongPress => self.handle_long_press(params, screen).await,
            ActionName::Wait => {
                let duration = wait_duration(params.duration.as_deref());
                tokio::time::sleep(duration).await;
                Ok(ActionResult::success())
            }
            ActionName::TakeOver => {
                let message = params
                    .message
                    .as_deref()
                    .unwrap_or("User intervention required");
                self.request_takeover(message);
                Ok(ActionResult::success())
            }
            ActionName::Note | ActionName::CallApi => Ok(ActionResult::success()),
            ActionName::Interact => Ok(ActionResult::success_with("User interaction required")),
            ActionName::Unknown(name) => Ok(ActionResult::failure(format!("Unknown action: {}", name))),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!("{} failed: {}", action.name, e);
            ActionResult::failure(format!("Action failed: {}", e))
        })
    }

    /// Ask for confirmation when the action carries a sensitive-operation message.
    fn confirmed(&self, params: &ActionParams) -> bool {
        let Some(message) = params.message.as_deref() else {
            return true;
        };
        match &self.confirmation_callback {
            Some(callback) => callback(message),
            None => confirm_on_console(
                get_messages(self.lang),
                message,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            ),
        }
    }

    fn request_takeover(&self, message: &str) {
        match &self.takeover_callback {
            Some(callback) => callback(message),
            None => takeover_on_console(
                get_messages(self.lang),
                message,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            ),
        }
    }

    async fn handle_launch(&self, params: &ActionParams) -> Result<ActionResult, DeviceError> {
        let Some(app_name) = params.app.as_deref() else {
            return Ok(ActionResult::failure("No app name specified"));
        };

        if self.device.launch_app(app_name).await? {
            Ok(ActionResult::success())
        } else {
            Ok(ActionResult::failure(format!("App not found: {}", app_name)))
        }
    }

    async fn handle_tap(
        &self,
        params: &ActionParams,
        screen: (u32, u32),
    ) -> Result<ActionResult, DeviceError> {
        let (x, y) = match target(params.element, "element", screen) {
            Ok(point) => point,
            Err(result) => return Ok(result),
        };
        if !self.confirmed(params) {
            return Ok(ActionResult::declined());
        }
        self.device.tap(x, y).await?;
        Ok(ActionResult::success())
    }

    async fn handle_double_tap(
        &self,
        params: &ActionParams,
        screen: (u32, u32),
    ) -> Result<ActionResult, DeviceError> {
        let (x, y) = match target(params.element, "element", screen) {
            Ok(point) => point,
            Err(result) => return Ok(result),
        };
        if !self.confirmed(params) {
            return Ok(ActionResult::declined());
        }
        self.device.double_tap(x, y).await?;
        Ok(ActionResult::success())
    }

    async fn handle_long_press(
        &self,
        params: &ActionParams,
        screen: (u32, u32),
    ) -> Result<ActionResult, DeviceError> {
        let (x, y) = match target(params.element, "element", screen) {
            Ok(point) => point,
            Err(result) => return Ok(result),
        };
        if !self.confirmed(params) {
            return Ok(ActionResult::declined());
        }
        self.device.long_press(x, y, LONG_PRESS_DURATION).await?;
        Ok(ActionResult::success())
    }

    async fn handle_swipe(
        &self,
        params: &ActionParams,
        screen: (u32, u32),
    ) -> Result<ActionResult, DeviceError> {
        let start = match target(params.start, "start", screen) {
            Ok(point) => point,
            Err(result) => return Ok(result),
        };
        let end = match target(params.end, "end", screen) {
            Ok(point) => point,
            Err(result) => return Ok(result),
        };
        let duration = swipe_duration(start, end, params.duration.as_deref());

        self.device
            .swipe(start.0, start.1, end.0, end.1, duration)
            .await?;
        Ok(ActionResult::success())
    }

    /// Switch keyboard, clear, type, restore. The keyboard is restored even
    /// when clearing or typing fails.
    async fn handle_type(&self, params: &ActionParams) -> Result<ActionResult, DeviceError> {
        let text = params.text.as_deref().unwrap_or("");

        let original_ime = self.device.switch_input_method().await?;
        self.pause().await;

        let typed = async {
            self.device.clear_text().await?;
            self.pause().await;
            self.device.type_text(text).await?;
            self.pause().await;
            Ok::<(), DeviceError>(())
        }
        .await;

        let restored = self.device.restore_input_method(original_ime).await;
        self.pause().await;

        typed?;
        restored?;
        Ok(ActionResult::success())
    }

    async fn pause(&self) {
        if !self.input_delay.is_zero() {
            tokio::time::sleep(self.input_delay).await;
        }
    }
}

/// Convert a relative coordinate to pixels, or explain why it cannot be.
fn target(
    coordinate: Option<Coordinate>,
    name: &str,
    (width, height): (u32, u32),
) -> Result<(u32, u32), ActionResult> {
    if width == 0 || height == 0 {
        return Err(ActionResult::failure(format!(
            "Invalid screen size: {}x{}",
            width, height
        )));
    }
    coordinate
        .map(|c| c.to_absolute(width, height))
        .ok_or_else(|| ActionResult::failure(format!("Missing {} coordinates", name)))
}

/// Console confirmation used when no callback is set. A closed input declines.
fn confirm_on_console(
    msgs: &Messages,
    message: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> bool {
    let _ = write!(
        output,
        "⚠️ {}: {}\n{} ",
        msgs.confirmation_required, message, msgs.continue_prompt
    );
    let _ = output.flush();

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => line.trim().eq_ignore_ascii_case("y"),
    }
}

/// Console takeover used when no callback is set. Returns on Enter or closed input.
fn takeover_on_console(
    msgs: &Messages,
    message: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) {
    let _ = write!(
        output,
        "✋ {}: {}\n{}...",
        msgs.manual_operation_required, message, msgs.press_enter_when_done
    );
    let _ = output.flush();

    let mut line = String::new();
    let _ = input.read_line(&mut line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::parse_action;
    use crate::testing::{DeviceCall, MockDevice};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn handler(device: &Arc<MockDevice>, confirm: bool) -> ActionHandler {
        ActionHandler::new(
            device.clone(),
            Some(Box::new(move |_: &str| confirm)),
            Some(Box::new(|_: &str| {})),
        )
        .with_input_delay(Duration::ZERO)
    }

    async fn run(device: &Arc<MockDevice>, text: &str) -> ActionResult {
        let action = parse_action(text).unwrap();
        handler(device, true).execute(&action, 1080, 1920).await
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3 seconds"), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_wait_duration_defaults_and_caps() {
        assert_eq!(wait_duration(None), DEFAULT_WAIT);
        assert_eq!(wait_duration(Some("a while")), DEFAULT_WAIT);
        assert_eq!(wait_duration(Some("4 seconds")), Duration::from_secs(4));
        assert_eq!(wait_duration(Some("3600 seconds")), MAX_WAIT);
    }

    #[test]
    fn test_swipe_duration_clamped() {
        assert_eq!(swipe_duration((0, 0), (10, 10), None), MIN_SWIPE_DURATION);
        assert_eq!(swipe_duration((0, 0), (0, 1900), None), MAX_SWIPE_DURATION);
        assert_eq!(
            swipe_duration((0, 0), (0, 1200), None),
            Duration::from_millis(1440)
        );
        assert_eq!(
            swipe_duration((0, 0), (0, 10), Some("1.2 seconds")),
            Duration::from_millis(1200)
        );
        assert_eq!(swipe_duration((0, 0), (0, 10), Some("0")), MIN_SWIPE_DURATION);
    }

    #[tokio::test]
    async fn test_tap_center_pixel() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Tap", element=[500,500])"#).await;
        assert!(result.success);
        assert!(!result.should_finish);
        assert_eq!(device.calls(), vec![DeviceCall::Tap(540, 960)]);
    }

    #[tokio::test]
    async fn test_declined_confirmation_touches_nothing() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let asked = Arc::new(AtomicUsize::new(0));
        let seen = asked.clone();
        let handler = ActionHandler::new(
            device.clone(),
            Some(Box::new(move |msg: &str| {
                assert_eq!(msg, "confirm payment");
                seen.fetch_add(1, Ordering::SeqCst);
                false
            })),
            None,
        );

        let action =
            parse_action(r#"do(action="Tap", element=[10,10], message="confirm payment")"#).unwrap();
        let result = handler.execute(&action, 1080, 1920).await;

        assert!(!result.success);
        assert!(result.should_finish);
        assert!(result.requires_confirmation);
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_long_press() {
        let device = Arc::new(MockDevice::new(1000, 2000));
        let action =
            parse_action(r#"do(action="Long Press", element=[100,100], message="delete chat")"#)
                .unwrap();
        let result = handler(&device, true).execute(&action, 1000, 2000).await;
        assert!(result.success);
        assert_eq!(
            device.calls(),
            vec![DeviceCall::LongPress(100, 200, LONG_PRESS_DURATION)]
        );
    }

    #[tokio::test]
    async fn test_type_runs_four_phases() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Type", text="hello")"#).await;
        assert!(result.success);
        assert_eq!(
            device.calls(),
            vec![
                DeviceCall::SwitchInputMethod,
                DeviceCall::ClearText,
                DeviceCall::TypeText("hello".to_string()),
                DeviceCall::RestoreInputMethod(Some("com.example/.Ime".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_type_restores_keyboard_after_failure() {
        let device = Arc::new(MockDevice::new(1080, 1920).failing_on("type_text"));
        let result = run(&device, r#"do(action="Type_Name", text="Alice")"#).await;
        assert!(!result.success);
        assert!(!result.should_finish);
        assert!(result.message.unwrap().starts_with("Action failed"));
        assert_eq!(
            device.calls().last(),
            Some(&DeviceCall::RestoreInputMethod(Some("com.example/.Ime".to_string())))
        );
    }

    #[tokio::test]
    async fn test_swipe_dispatch() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Swipe", start=[500,800], end=[500,200])"#).await;
        assert!(result.success);
        // 1152px of travel: 1152^2 / 1000 ms
        assert_eq!(
            device.calls(),
            vec![DeviceCall::Swipe(540, 1536, 540, 384, Duration::from_millis(1327))]
        );
    }

    #[tokio::test]
    async fn test_launch_unknown_app_is_recoverable() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Launch", app="NoSuchApp")"#).await;
        assert!(!result.success);
        assert!(!result.should_finish);
        assert_eq!(result.message.as_deref(), Some("App not found: NoSuchApp"));

        let ok = run(&device, r#"do(action="Launch", app="微信")"#).await;
        assert!(ok.success);
    }

    #[tokio::test]
    async fn test_unknown_action_is_recoverable() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Teleport", element=[1,1])"#).await;
        assert!(!result.success);
        assert!(!result.should_finish);
        assert_eq!(result.message.as_deref(), Some("Unknown action: Teleport"));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_error_becomes_failure() {
        let device = Arc::new(MockDevice::new(1080, 1920).failing_on("back"));
        let result = run(&device, r#"do(action="Back")"#).await;
        assert!(!result.success);
        assert!(!result.should_finish);
    }

    #[tokio::test]
    async fn test_invalid_screen_size() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let action = parse_action(r#"do(action="Tap", element=[1,1])"#).unwrap();
        let result = handler(&device, true).execute(&action, 0, 1920).await;
        assert!(!result.success);
        assert!(!result.should_finish);
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_placeholders_and_finish() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        assert!(run(&device, r#"do(action="Note", message="True")"#).await.success);
        assert!(run(&device, r#"do(action="Call_API", instruction="sum up")"#).await.success);

        let interact = run(&device, r#"do(action="Interact")"#).await;
        assert_eq!(interact.message.as_deref(), Some("User interaction required"));

        let takeover = run(&device, r#"do(action="Take_over", message="login")"#).await;
        assert!(takeover.success);

        let finish = run(&device, r#"finish(message="done")"#).await;
        assert!(finish.should_finish);
        assert_eq!(finish.message.as_deref(), Some("done"));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_double_tap_pixel() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Double Tap", element=[250,750])"#).await;
        assert!(result.success);
        assert_eq!(device.calls(), vec![DeviceCall::DoubleTap(270, 1440)]);
    }

    #[tokio::test]
    async fn test_declined_double_tap() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let action = parse_action(
            r#"do(action="Double Tap", element=[500,500], message="like this post")"#,
        )
        .unwrap();
        let result = handler(&device, false).execute(&action, 1080, 1920).await;

        assert_eq!(result, ActionResult::declined());
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_takeover_passes_message() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = ActionHandler::new(
            device.clone(),
            None,
            Some(Box::new(move |msg: &str| sink.lock().unwrap().push(msg.to_string()))),
        );

        let action = parse_action(r#"do(action="Take_over", message="login")"#).unwrap();
        assert!(handler.execute(&action, 1080, 1920).await.success);

        let bare = parse_action(r#"do(action="Take_over")"#).unwrap();
        assert!(handler.execute(&bare, 1080, 1920).await.success);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["login".to_string(), "User intervention required".to_string()]
        );
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_home() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Home")"#).await;
        assert!(result.success);
        assert_eq!(device.calls(), vec![DeviceCall::Home]);
    }

    #[test]
    fn test_console_confirmation_is_localized() {
        let mut out = Vec::new();
        let yes = confirm_on_console(
            get_messages(Lang::Cn),
            "确认支付",
            &mut Cursor::new("y\n"),
            &mut out,
        );
        assert!(yes);
        let prompt = String::from_utf8(out).unwrap();
        assert!(prompt.contains("需要确认: 确认支付"));
        assert!(prompt.contains("是否继续？(y/n)"));

        let mut out = Vec::new();
        let closed = confirm_on_console(
            get_messages(Lang::En),
            "pay",
            &mut Cursor::new(""),
            &mut out,
        );
        assert!(!closed);
        assert!(String::from_utf8(out).unwrap().contains("Confirmation Required: pay"));
    }

    #[test]
    fn test_console_takeover_is_localized() {
        let mut out = Vec::new();
        takeover_on_console(
            get_messages(Lang::En),
            "log in",
            &mut Cursor::new(""),
            &mut out,
        );
        let prompt = String::from_utf8(out).unwrap();
        assert!(prompt.contains("Manual Operation Required: log in"));
        assert!(prompt.contains("Press Enter when done"));
    }

    #[tokio::test]
    async fn test_wait_zero_seconds() {
        let device = Arc::new(MockDevice::new(1080, 1920));
        let result = run(&device, r#"do(action="Wait", duration="0 seconds")"#).await;
        assert!(result.success);
    }
}

//! Test doubles for the device and model seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::package_for;
use crate::device::{DeviceBackend, DeviceError, Platform, Screenshot};
use crate::model::{Conversation, LanguageModel, ModelError, ModelResponse};

/// Input primitive recorded by [`MockDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Tap(u32, u32),
    DoubleTap(u32, u32),
    LongPress(u32, u32, Duration),
    Swipe(u32, u32, u32, u32, Duration),
    Back,
    Home,
    SwitchInputMethod,
    ClearText,
    TypeText(String),
    RestoreInputMethod(Option<String>),
    Launch(String),
}

/// In-memory device with a fixed screen that records every input.
pub struct MockDevice {
    width: u32,
    height: u32,
    app: String,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
    calls: Mutex<Vec<DeviceCall>>,
    screenshots: AtomicUsize,
}

impl MockDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            app: "System Home".to_string(),
            fail_on: None,
            panic_on: None,
            calls: Mutex::new(Vec::new()),
            screenshots: AtomicUsize::new(0),
        }
    }

    pub fn with_app(mut self, app: &str) -> Self {
        self.app = app.to_string();
        self
    }

    /// Make the named primitive return an error.
    pub fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Make the named primitive panic.
    pub fn panicking_on(mut self, op: &'static str) -> Self {
        self.panic_on = Some(op);
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn screenshot_count(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    fn check(&self, op: &'static str) -> Result<(), DeviceError> {
        if self.panic_on == Some(op) {
            panic!("{} exploded", op);
        }
        if self.fail_on == Some(op) {
            return Err(DeviceError::CommandFailed(format!("{} failed", op)));
        }
        Ok(())
    }

    fn record(&self, op: &'static str, call: DeviceCall) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(call);
        self.check(op)
    }
}

#[async_trait]
impl DeviceBackend for MockDevice {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn screenshot(&self) -> Result<Screenshot, DeviceError> {
        self.check("screenshot")?;
        let n = self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(Screenshot::new(
            format!("c2NyZWVu{}", n),
            self.width,
            self.height,
            false,
        ))
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        self.check("current_app")?;
        Ok(self.app.clone())
    }

    async fn tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.record("tap", DeviceCall::Tap(x, y))
    }

    async fn double_tap(&self, x: u32, y: u32) -> Result<(), DeviceError> {
        self.record("double_tap", DeviceCall::DoubleTap(x, y))
    }

    async fn long_press(&self, x: u32, y: u32, duration: Duration) -> Result<(), DeviceError> {
        self.record("long_press", DeviceCall::LongPress(x, y, duration))
    }

    async fn swipe(
        &self,
        start_x: u32,
        start_y: u32,
        end_x: u32,
        end_y: u32,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        self.record(
            "swipe",
            DeviceCall::Swipe(start_x, start_y, end_x, end_y, duration),
        )
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.record("back", DeviceCall::Back)
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.record("home", DeviceCall::Home)
    }

    async fn switch_input_method(&self) -> Result<Option<String>, DeviceError> {
        self.record("switch_input_method", DeviceCall::SwitchInputMethod)?;
        Ok(Some("com.example/.Ime".to_string()))
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.record("clear_text", DeviceCall::ClearText)
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.record("type_text", DeviceCall::TypeText(text.to_string()))
    }

    async fn restore_input_method(&self, original: Option<String>) -> Result<(), DeviceError> {
        self.record("restore_input_method", DeviceCall::RestoreInputMethod(original))
    }

    async fn launch_app(&self, app_name: &str) -> Result<bool, DeviceError> {
        self.check("launch_app")?;
        if package_for(Platform::Android, app_name).is_none() {
            return Ok(false);
        }
        self.calls
            .lock()
            .unwrap()
            .push(DeviceCall::Launch(app_name.to_string()));
        Ok(true)
    }
}

/// Model that replays canned replies, then repeats a fallback reply.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same reply.
    pub fn repeating(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Fail every request.
    pub fn failing(message: &str) -> Self {
        let model = Self::new(Vec::<String>::new());
        model
            .replies
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        model
    }

    /// Conversations as they were when each request was made.
    pub fn requests(&self) -> Vec<Conversation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn request(&self, conversation: &Conversation) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(conversation.clone());

        let next = self.replies.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone().map(Ok)) {
            Some(Ok(raw)) => Ok(ModelResponse::from_raw(raw)),
            Some(Err(message)) => Err(ModelError::Api {
                status: 503,
                body: message,
            }),
            None => Err(ModelError::Parse("script exhausted".to_string())),
        }
    }
}

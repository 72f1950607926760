//! Main PhoneAgent for orchestrating phone automation.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;

use super::metrics::{SessionMetrics, StepMetrics};
use crate::actions::{
    parse_action, render_action, Action, ActionHandler, ActionResult, ConfirmationCallback,
    TakeoverCallback,
};
use crate::config::{get_messages, get_system_prompt, Lang};
use crate::device::DeviceBackend;
use crate::model::{Conversation, LanguageModel, MessageBuilder};

const SCREEN_INFO_HEADER: &str = "** Screen Info **";

/// Agent errors. Task outcomes, including failures, are returned as messages.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Task required for first step")]
    TaskRequired,
    #[error("Task cancelled")]
    Cancelled,
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Where the agent is in its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgentState {
    Idle,
    AwaitingFirstPrompt,
    Stepping,
    Finished,
    StepBudgetExhausted,
}

/// Shared flag that asks a running agent to stop before its next model call.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for the PhoneAgent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of steps before stopping.
    pub max_steps: u32,
    pub lang: Lang,
    /// Custom system prompt (if None, uses default based on lang).
    pub system_prompt: Option<String>,
    /// Print the thinking/action banner for each step.
    pub verbose: bool,
    /// Pause between the phases of text input.
    pub input_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            lang: Lang::Cn,
            system_prompt: None,
            verbose: true,
            input_delay: Duration::from_secs(1),
        }
    }
}

impl AgentConfig {
    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_input_delay(mut self, delay: Duration) -> Self {
        self.input_delay = delay;
        self
    }

    /// Disable the per-step console banner.
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Get the system prompt (custom or default based on language).
    pub fn get_system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| get_system_prompt(self.lang))
    }
}

/// Result of a single agent step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub finished: bool,
    /// The executed action; `None` when the model or device failed first.
    pub action: Option<Action>,
    pub thinking: String,
    pub message: Option<String>,
}

impl StepResult {
    fn aborted(message: String) -> Self {
        Self {
            success: false,
            finished: true,
            action: None,
            thinking: String::new(),
            message: Some(message),
        }
    }
}

/// Agent that drives a device with a vision-language model until the task ends.
///
/// Each step captures the screen, asks the model for one action, and
/// dispatches it. A task ends when the model finishes, an action asks to
/// finish, the model or device becomes unavailable, or the step budget runs
/// out. All of these are `Ok` outcomes of [`PhoneAgent::run`].
pub struct PhoneAgent {
    device: Arc<dyn DeviceBackend>,
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
    action_handler: ActionHandler,
    context: Conversation,
    step_count: u32,
    state: AgentState,
    stop: StopSignal,
    metrics: SessionMetrics,
}

impl PhoneAgent {
    /// Create a new PhoneAgent. Missing callbacks prompt on the console.
    pub fn new(
        device: Arc<dyn DeviceBackend>,
        model: Arc<dyn LanguageModel>,
        config: AgentConfig,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        let action_handler =
            ActionHandler::new(device.clone(), confirmation_callback, takeover_callback)
                .with_input_delay(config.input_delay)
                .with_lang(config.lang);

        Self {
            device,
            model,
            config,
            action_handler,
            context: Conversation::new(),
            step_count: 0,
            state: AgentState::Idle,
            stop: StopSignal::new(),
            metrics: SessionMetrics::default(),
        }
    }

    /// Run the agent to complete a task. Any previous context is discarded.
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        self.reset();
        self.metrics.start();
        self.state = AgentState::AwaitingFirstPrompt;
        tracing::info!("Starting task: {}", task);

        let outcome = self.drive(task).await;

        self.metrics.finalize();
        self.metrics.log_summary();
        if outcome.is_err() {
            self.state = AgentState::Idle;
        }
        outcome
    }

    async fn drive(&mut self, task: &str) -> Result<String, AgentError> {
        let mut result = self.execute_step(Some(task), true).await?;

        while !result.finished && self.step_count < self.config.max_steps {
            result = self.execute_step(None, false).await?;
        }

        if result.finished {
            let message = result.message.unwrap_or_else(|| "Task completed".to_string());
            tracing::info!("Task finished after {} steps: {}", self.step_count, message);
            return Ok(message);
        }

        self.state = AgentState::StepBudgetExhausted;
        tracing::info!("Max steps reached ({})", self.config.max_steps);
        Ok("Max steps reached".to_string())
    }

    /// Run to completion on a private current-thread runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn run_blocking(&mut self, task: &str) -> Result<String, AgentError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(task))
    }

    /// Execute a single step. `task` is required when the context is empty.
    pub async fn step(&mut self, task: Option<&str>) -> Result<StepResult, AgentError> {
        let is_first = self.context.is_empty();

        if is_first && task.is_none() {
            return Err(AgentError::TaskRequired);
        }
        if is_first {
            self.state = AgentState::AwaitingFirstPrompt;
        }

        self.execute_step(task, is_first).await
    }

    /// Reset the agent state for a new task.
    pub fn reset(&mut self) {
        self.context.clear();
        self.step_count = 0;
        self.state = AgentState::Idle;
    }

    async fn execute_step(
        &mut self,
        user_prompt: Option<&str>,
        is_first: bool,
    ) -> Result<StepResult, AgentError> {
        self.step_count += 1;
        let step_started = Instant::now();
        let mut metrics = StepMetrics {
            step: self.step_count,
            ..Default::default()
        };

        // Capture current screen state
        let screenshot = match self.device.screenshot().await {
            Ok(screenshot) => screenshot,
            Err(e) => {
                tracing::error!("Screenshot failed: {}", e);
                self.state = AgentState::Finished;
                return Ok(StepResult::aborted(format!("Device error: {}", e)));
            }
        };
        if screenshot.is_sensitive {
            tracing::warn!("Screen capture blocked, sending a blank frame");
        }
        let current_app = self.device.current_app().await.unwrap_or_else(|e| {
            tracing::warn!("Could not read current app: {}", e);
            "System Home".to_string()
        });
        metrics.screenshot = step_started.elapsed();

        // Build messages
        let screen_info = MessageBuilder::screen_info(&current_app);
        if is_first {
            self.context.push_system(&self.config.get_system_prompt());
            let text = format!("{}\n\n{}", user_prompt.unwrap_or_default(), screen_info);
            self.context.push_user(&text, Some(&screenshot.base64_data));
        } else {
            let text = format!("{}\n\n{}", SCREEN_INFO_HEADER, screen_info);
            self.context.push_user(&text, Some(&screenshot.base64_data));
        }
        self.state = AgentState::Stepping;

        if self.stop.is_stopped() {
            tracing::info!("Stop requested before step {}", self.step_count);
            return Err(AgentError::Cancelled);
        }

        // Get model response
        let inference_started = Instant::now();
        let response = match self.model.request(&self.context).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Model error: {}", e);
                self.state = AgentState::Finished;
                return Ok(StepResult::aborted(format!("Model error: {}", e)));
            }
        };
        metrics.inference = inference_started.elapsed();

        let mut action = match parse_action(&response.action) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("Failed to parse action ({}): {}", e, response.action);
                Action::finish(response.raw_content.clone())
            }
        };

        // The model has seen this frame; keep only text from here on.
        self.context.strip_images();

        if self.config.verbose {
            self.print_step(&response.thinking, &action);
        }

        // Execute action
        let execution_started = Instant::now();
        let dispatch = AssertUnwindSafe(self.action_handler.execute(
            &action,
            screenshot.width,
            screenshot.height,
        ))
        .catch_unwind()
        .await;
        let result = match dispatch {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Action dispatch panicked: {}", message);
                action = Action::finish(message.clone());
                ActionResult::finish(Some(message))
            }
        };
        metrics.execution = execution_started.elapsed();

        self.context.push_assistant(&format!(
            "<think>{}</think><answer>{}</answer>",
            response.thinking, response.action
        ));

        let finished = action.is_finish() || result.should_finish;
        tracing::info!(
            step = self.step_count,
            action = action.label(),
            success = result.success,
            finished,
            "{}",
            result.message.as_deref().unwrap_or("")
        );

        metrics.action = Some(action.label().to_string());
        metrics.total = step_started.elapsed();
        self.metrics.add_step(metrics);

        if finished {
            self.state = AgentState::Finished;
            if self.config.verbose {
                self.print_finished(&result, &action);
            }
        }

        Ok(StepResult {
            success: result.success,
            finished,
            message: result.message,
            action: Some(action),
            thinking: response.thinking,
        })
    }

    fn print_step(&self, thinking: &str, action: &Action) {
        let msgs = get_messages(self.config.lang);
        println!("\n{}", "=".repeat(50));
        println!("📍 {} {}", msgs.step, self.step_count);
        println!("💭 {}:", msgs.thinking);
        println!("{}", "-".repeat(50));
        println!("{}", thinking);
        println!("{}", "-".repeat(50));
        println!("🎯 {}:", msgs.action);
        println!("{}", render_action(action));
        println!("{}\n", "=".repeat(50));
    }

    fn print_finished(&self, result: &ActionResult, action: &Action) {
        let msgs = get_messages(self.config.lang);
        let message = result
            .message
            .as_deref()
            .or_else(|| action.message())
            .unwrap_or_default();
        println!("\n🎉 {}", "=".repeat(48));
        println!("✅ {}: {}", msgs.task_completed, message);
        println!("{}\n", "=".repeat(50));
    }

    /// Get the current conversation context.
    pub fn context(&self) -> &Conversation {
        &self.context
    }

    /// Get the current step count.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Timings of the current or last `run`.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Handle for stopping this agent from elsewhere.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action dispatch panicked".to_string()
    }
}

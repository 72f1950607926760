// Copyright 2025 Zhipu AI (Original Python implementation)
// Copyright 2025 ModerRAS (Rust implementation)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Mobile Agent
//!
//! Vision-language agent for automating Android, HarmonyOS and iOS devices.
//!
//! Each step captures the screen, asks a model for the next action in the
//! `do(action="...", ...)` / `finish(message="...")` format, and dispatches
//! it to a [`DeviceBackend`]: ADB for Android, HDC for HarmonyOS and
//! WebDriverAgent for iOS.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mobile_agent::device::{create_device, DeviceKind};
//! use mobile_agent::{AgentConfig, ModelClient, ModelConfig, PhoneAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = create_device(DeviceKind::Adb, None, None, Duration::from_secs(10))?;
//!     let model = Arc::new(ModelClient::new(ModelConfig::default())?);
//!
//!     let mut agent = PhoneAgent::new(device, model, AgentConfig::default(), None, None);
//!     let result = agent.run("打开微信").await?;
//!
//!     println!("Task result: {}", result);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod model;
pub mod settings;

#[cfg(test)]
mod testing;

pub use actions::{parse_action, Action, ActionHandler, ActionResult, ParseError};
pub use agent::{AgentConfig, AgentError, AgentState, PhoneAgent, StepResult, StopSignal};
pub use config::Lang;
pub use device::{DeviceBackend, DeviceError, DeviceKind, Platform, Screenshot};
pub use model::{LanguageModel, ModelClient, ModelConfig, ModelError, ModelResponse};
pub use settings::AppSettings;

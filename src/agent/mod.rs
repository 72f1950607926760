//! Agent module for orchestrating phone automation.

mod metrics;
mod phone_agent;

pub use metrics::{Averages, SessionMetrics, StepMetrics};
pub use phone_agent::{AgentConfig, AgentError, AgentState, PhoneAgent, StepResult, StopSignal};

//! Model client module for AI inference.

mod client;
mod message;

pub use client::{
    parse_response, LanguageModel, ModelClient, ModelConfig, ModelError, ModelResponse,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use message::{
    ContentPart, Conversation, ImageUrl, Message, MessageBuilder, MessageContent, Role,
};

//! Chat messages in the OpenAI wire shape and the conversation that owns them.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Reference to an image, inline as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One item of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::ImageUrl { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Number of image parts carried by this message.
    pub fn image_count(&self) -> usize {
        match &self.content {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts.iter().filter(|p| p.is_image()).count(),
        }
    }

    /// Remove image content to save context space.
    pub fn strip_images(&mut self) {
        if let MessageContent::Parts(parts) = &mut self.content {
            parts.retain(|p| !p.is_image());
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Helper for building conversation messages.
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn system(content: &str) -> Message {
        Message {
            role: Role::System,
            content: MessageContent::Text(content.to_string()),
        }
    }

    /// User message with an optional base64 PNG placed before the text.
    pub fn user(text: &str, image_base64: Option<&str>) -> Message {
        let mut parts = Vec::with_capacity(2);
        if let Some(data) = image_base64 {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", data),
                },
            });
        }
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
        Message {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn assistant(content: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: MessageContent::Text(content.to_string()),
        }
    }

    /// Screen-state JSON shown to the model.
    pub fn screen_info(current_app: &str) -> String {
        json!({ "current_app": current_app }).to_string()
    }
}

/// Ordered message history for one task.
///
/// Only the newest user message may carry an image: appending a user
/// message strips images from everything before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_system(&mut self, content: &str) {
        self.messages.push(MessageBuilder::system(content));
    }

    pub fn push_user(&mut self, text: &str, image_base64: Option<&str>) {
        self.strip_images();
        self.messages.push(MessageBuilder::user(text, image_base64));
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(MessageBuilder::assistant(content));
    }

    /// Strip image payloads from every message.
    pub fn strip_images(&mut self) {
        for message in &mut self.messages {
            message.strip_images();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// Total image parts across the conversation.
    pub fn image_count(&self) -> usize {
        self.messages.iter().map(Message::image_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let system_msg = serde_json::to_value(MessageBuilder::system("You are an assistant")).unwrap();
        assert_eq!(system_msg["role"], "system");
        assert_eq!(system_msg["content"], "You are an assistant");

        let user_msg = serde_json::to_value(MessageBuilder::user("Look at this", Some("base64data"))).unwrap();
        assert_eq!(user_msg["role"], "user");
        assert_eq!(user_msg["content"][0]["type"], "image_url");
        assert_eq!(
            user_msg["content"][0]["image_url"]["url"],
            "data:image/png;base64,base64data"
        );
        assert_eq!(user_msg["content"][1]["type"], "text");
    }

    #[test]
    fn test_screen_info() {
        assert_eq!(MessageBuilder::screen_info("微信"), r#"{"current_app":"微信"}"#);
    }

    #[test]
    fn test_push_user_strips_older_images() {
        let mut conv = Conversation::new();
        conv.push_system("sys");
        conv.push_user("first", Some("AAA"));
        conv.push_assistant("do(action=\"Back\")");
        conv.push_user("second", Some("BBB"));

        assert_eq!(conv.image_count(), 1);
        assert_eq!(conv.messages()[1].image_count(), 0);
        assert_eq!(conv.messages()[1].text(), "first");
        assert_eq!(conv.last().map(Message::image_count), Some(1));
    }

    #[test]
    fn test_clear_and_counts() {
        let mut conv = Conversation::new();
        conv.push_system("sys");
        conv.push_user("task", None);
        conv.push_assistant("a");
        assert_eq!(conv.count_role(Role::Assistant), 1);
        assert_eq!(conv.len(), 3);

        conv.clear();
        assert!(conv.is_empty());
    }

    #[test]
    fn test_message_deserializes_from_wire() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [{ "type": "text", "text": "hi" }]
        }))
        .unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "hi");
    }
}

//! HTTP DTOs for the chat gateway.

use serde::Deserialize;

/// Maximum allowed message length (10,000 characters).
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Body for POST /api/chat/stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    /// Target conversation; must already exist.
    pub conversation_id: String,
    /// The new user message.
    pub content: String,
}

impl ChatStreamRequest {
    /// Validates the message content.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.content.trim().is_empty() {
            return Err("Message content cannot be empty");
        }
        if self.content.len() > MAX_MESSAGE_LENGTH {
            return Err("Message content exceeds maximum length");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> ChatStreamRequest {
        ChatStreamRequest {
            conversation_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn accepts_normal_content() {
        assert!(request("hello").validate().is_ok());
    }

    #[test]
    fn rejects_empty_content() {
        assert_eq!(
            request("   ").validate().err(),
            Some("Message content cannot be empty")
        );
    }

    #[test]
    fn rejects_oversized_content() {
        let content = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert_eq!(
            request(&content).validate().err(),
            Some("Message content exceeds maximum length")
        );
    }

    #[test]
    fn accepts_max_length_content() {
        let content = "x".repeat(MAX_MESSAGE_LENGTH);
        assert!(request(&content).validate().is_ok());
    }

    #[test]
    fn deserializes_camel_case() {
        let json = r#"{"conversationId": "c1", "content": "hi"}"#;
        let request: ChatStreamRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.conversation_id, "c1");
        assert_eq!(request.content, "hi");
    }
}

use serde_json::{Map, Value};

use super::{ActionState, Liveness};
use crate::models::{ChatMessage, PradoContext};
use crate::services::AiChatService;

pub const WELCOME_MESSAGE: &str = "Hello! I'm your AI assistant. I can help you with PRADO document verification. Please specify the country (e.g., 'Belgium ID card', 'French passport').";

/// Conversation with the document-verification assistant.
pub struct ChatController {
    service: AiChatService,
    messages: Vec<ChatMessage>,
    context: Map<String, Value>,
    prado_context: Option<PradoContext>,
    state: ActionState,
    liveness: Liveness,
}

impl ChatController {
    /// Starts a session with the welcome message and `context` as the
    /// initial request context.
    pub fn new(service: AiChatService, context: Map<String, Value>) -> Self {
        Self {
            service,
            messages: vec![ChatMessage::system(WELCOME_MESSAGE)],
            context,
            prado_context: None,
            state: ActionState::Idle,
            liveness: Liveness::new(),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Latest lookup hints from the assistant, kept across replies that carry none.
    pub fn prado_context(&self) -> Option<&PradoContext> {
        self.prado_context.as_ref()
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Sends `text` and appends the answer. Blank input is ignored.
    pub async fn send_message(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        self.messages.push(ChatMessage::user(text));
        self.state = ActionState::Loading;

        let result = self.service.send_chat_query(text, &self.context).await;

        if !self.liveness.is_live() {
            tracing::debug!("Chat controller unmounted, discarding reply");
            return;
        }

        match result {
            Ok(reply) if reply.is_success() => {
                self.messages
                    .push(ChatMessage::ai(reply.response.unwrap_or_default()));
                if let Some(prado) = reply.prado_context {
                    self.prado_context = Some(prado);
                }
                self.state = ActionState::Success;
            }
            Ok(reply) => {
                let reason = reply.message.unwrap_or_else(|| "Unknown error".to_string());
                tracing::warn!("Assistant declined the query: {}", reason);
                self.messages.push(ChatMessage::failure(&reason));
                self.state = ActionState::Error(reason);
            }
            Err(e) => {
                tracing::error!("Error in AI chat: {}", e);
                let reason = e.to_string();
                self.messages.push(ChatMessage::failure(&reason));
                self.state = ActionState::Error(reason);
            }
        }
    }

    pub fn add_system_message(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::system(text));
    }

    /// Empties the conversation and forgets the lookup hints.
    pub fn clear_chat(&mut self) {
        self.messages.clear();
        self.prado_context = None;
        self.state = ActionState::Idle;
    }

    /// Merges `update` into the request context, overwriting existing keys.
    pub fn update_context(&mut self, update: Map<String, Value>) {
        self.context.extend(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ApiClient;
    use crate::models::Sender;
    use serde_json::json;
    use std::time::Duration;

    fn offline() -> ChatController {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        ChatController::new(AiChatService::new(api), Map::new())
    }

    #[test]
    fn starts_with_welcome() {
        let chat = offline();
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].sender, Sender::System);
        assert_eq!(chat.messages()[0].text, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut chat = offline();
        chat.send_message("   ").await;
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.state(), &ActionState::Idle);
    }

    #[tokio::test]
    async fn transport_failure_becomes_apology() {
        let mut chat = offline();
        chat.send_message("Belgium ID card").await;

        let messages = chat.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[2].sender, Sender::Ai);
        assert!(messages[2]
            .text
            .starts_with("Sorry, I couldn't process your request."));
        assert!(chat.state().error().is_some());
    }

    #[test]
    fn context_updates_merge() {
        let mut chat = offline();
        let first = json!({ "documentCount": 1, "hasDocuments": true });
        let second = json!({ "documentCount": 2 });
        if let (Value::Object(a), Value::Object(b)) = (first, second) {
            chat.update_context(a);
            chat.update_context(b);
        }

        assert_eq!(chat.context().get("documentCount"), Some(&json!(2)));
        assert_eq!(chat.context().get("hasDocuments"), Some(&json!(true)));
    }

    #[test]
    fn clearing_drops_messages_and_hints() {
        let mut chat = offline();
        chat.add_system_message("Document uploaded");
        chat.prado_context = Some(PradoContext {
            url: Some("https://prado.example/BEL".to_string()),
            ..PradoContext::default()
        });

        chat.clear_chat();

        assert!(chat.messages().is_empty());
        assert!(chat.prado_context().is_none());
    }
}

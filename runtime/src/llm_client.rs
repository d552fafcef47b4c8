use std::fmt::Debug;

use async_trait::async_trait;
use membot_core::{
    Content, ContentPart, GenerateContentRequest, GenerationConfig, ModelClient, ModelError, ModelResult, Turn,
};
use membot_memory::{format_memories_for_prompt, MemorySnippet};
use tracing::{debug, info};

/// Number of preceding turns replayed to the model
const MAX_HISTORY_TURNS: usize = 20;
/// Token budget for the memory block
const MEMORY_TOKEN_BUDGET: usize = 1000;

/// Everything the reply generation step gets to see
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    /// Turns preceding the message, oldest first
    pub history: Vec<Turn>,
    /// Context contributed by before-turn hooks
    pub memories: Vec<MemorySnippet>,
    pub message: String,
}

/// Produces the agent's reply for one turn
#[async_trait]
pub trait ReplyGenerator: Send + Sync + Debug {
    async fn generate(&self, request: &GenerationRequest) -> ModelResult<String>;
}

/// Reply generator backed by the generateContent API
#[derive(Debug, Clone)]
pub struct ModelReplyGenerator {
    client: ModelClient,
    temperature: Option<f32>,
}

impl ModelReplyGenerator {
    pub fn new(client: ModelClient) -> Self {
        Self {
            client,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl ReplyGenerator for ModelReplyGenerator {
    async fn generate(&self, request: &GenerationRequest) -> ModelResult<String> {
        let body = GenerateContentRequest {
            contents: construct_prompt(request),
            system_instruction: Some(Content {
                parts: vec![ContentPart {
                    text: Some(request.system_prompt.clone()),
                }],
                role: None,
            }),
            generation_config: self.temperature.map(|temperature| GenerationConfig {
                temperature: Some(temperature),
                max_output_tokens: None,
            }),
        };
        debug!(
            model = self.client.model_name(),
            memories = request.memories.len(),
            history = request.history.len(),
            "Generating reply"
        );

        let response = self.client.generate_content(body).await?;
        let text = ModelClient::extract_text_from_response(&response)?;
        info!(reply_len = text.len(), "Received reply from model");
        Ok(text)
    }
}

/// Builds the conversation contents: recent history, then the memory block, then the message
pub fn construct_prompt(request: &GenerationRequest) -> Vec<Content> {
    let start = request.history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut contents: Vec<Content> = request.history[start..]
        .iter()
        .filter(|turn| !turn.text().is_empty())
        .map(Content::from_turn)
        .collect();

    let memory_block = format_memories_for_prompt(&request.memories, MEMORY_TOKEN_BUDGET);
    if !memory_block.is_empty() {
        contents.push(Content::text("user", memory_block));
    }

    contents.push(Content::text("user", request.message.clone()));
    contents
}

/// Maps an empty reply to an error so callers never append a blank agent turn
pub fn non_empty_reply(reply: String) -> ModelResult<String> {
    if reply.trim().is_empty() {
        return Err(ModelError::ResponseError("Model returned an empty reply".to_string()));
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(history: Vec<Turn>, memories: Vec<MemorySnippet>) -> GenerationRequest {
        GenerationRequest {
            system_prompt: "be helpful".to_string(),
            history,
            memories,
            message: "what do I like?".to_string(),
        }
    }

    #[test]
    fn test_prompt_without_memories_is_just_the_message() {
        let contents = construct_prompt(&request(vec![], vec![]));
        assert_eq!(contents, vec![Content::text("user", "what do I like?")]);
    }

    #[test]
    fn test_prompt_orders_history_memories_message() {
        let contents = construct_prompt(&request(
            vec![Turn::user("hi"), Turn::agent("hello")],
            vec![MemorySnippet::new("The user loves pizza.")],
        ));

        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        let memory_text = contents[2].parts[0].text.as_deref().unwrap();
        assert!(memory_text.starts_with("Relevant previous interactions:"));
        assert!(memory_text.contains("1. The user loves pizza."));
        assert_eq!(contents[3].parts[0].text.as_deref(), Some("what do I like?"));
    }

    #[test]
    fn test_prompt_keeps_only_recent_history() {
        let history: Vec<Turn> = (0..30).map(|i| Turn::user(format!("turn {}", i))).collect();
        let contents = construct_prompt(&request(history, vec![]));

        assert_eq!(contents.len(), MAX_HISTORY_TURNS + 1);
        assert_eq!(contents[0].parts[0].text.as_deref(), Some("turn 10"));
    }

    #[test]
    fn test_empty_reply_is_an_error() {
        assert!(non_empty_reply("  ".to_string()).is_err());
        assert_eq!(non_empty_reply("ok".to_string()).unwrap(), "ok");
    }
}

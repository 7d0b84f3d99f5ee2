//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves DeepSeek, OpenRouter, OpenAI
//! and any self-hosted endpoint speaking the chat completions protocol, via
//! configurable base URLs and factory functions.
//!
//! Uses [`async_openai`] for type-safe request/response handling.

pub mod config;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use secrecy::{ExposeSecret, SecretString};

use dyad_core::llm::provider::LlmProvider;
use dyad_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, Usage};

use self::config::OpenAiCompatConfig;

/// Unified provider for any OpenAI-compatible API.
///
/// # API Key Security
///
/// Does NOT derive Debug to prevent accidental exposure of the API key
/// stored inside the `async_openai::Client`.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Create a new OpenAI-compatible provider from a configuration.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            model: config.model,
        }
    }

    /// Create a DeepSeek provider.
    pub fn deepseek(api_key: SecretString, model: &str) -> Self {
        Self::new(config::deepseek_defaults(api_key, model))
    }

    /// Create an OpenRouter provider.
    pub fn openrouter(api_key: SecretString, model: &str) -> Self {
        Self::new(config::openrouter_defaults(api_key, model))
    }

    /// Create an OpenAI provider.
    pub fn openai(api_key: SecretString, model: &str) -> Self {
        Self::new(config::openai_defaults(api_key, model))
    }

    /// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
    fn build_request(&self, request: &CompletionRequest) -> CreateChatCompletionRequest {
        let messages = request.messages.iter().map(to_openai_message).collect();

        // Use the model from the request if set, otherwise fall back to config default
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        CreateChatCompletionRequest {
            model,
            messages,
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature.map(|t| t as f32),
            ..Default::default()
        }
    }
}

fn to_openai_message(msg: &Message) -> ChatCompletionRequestMessage {
    match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
            name: None,
        }),
        MessageRole::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
            name: None,
        }),
        MessageRole::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(msg.content.clone())),
                refusal: None,
                name: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        let raw = serde_json::to_value(&response).unwrap_or_default();

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: response.id,
            content,
            model: response.model,
            usage,
            raw,
        })
    }
}

/// Map an `async_openai::error::OpenAIError` to an [`LlmError`].
fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited { retry_after_ms: None }
            } else if code == "context_length_exceeded" || api_err.message.contains("maximum context length") {
                LlmError::ContextLengthExceeded
            } else if code == "server_error" || error_type == "overloaded_error" {
                LlmError::Overloaded(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited { retry_after_ms: None },
            Some(503) | Some(529) => LlmError::Overloaded(err.to_string()),
            Some(400) => LlmError::InvalidRequest(err.to_string()),
            _ => LlmError::Provider {
                message: err.to_string(),
            },
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyad_types::llm::SamplingParams;

    fn key() -> SecretString {
        SecretString::from("sk-test".to_string())
    }

    #[test]
    fn test_deepseek_factory() {
        let provider = OpenAiCompatibleProvider::deepseek(key(), "deepseek-chat");
        assert_eq!(provider.name(), "deepseek");
        assert_eq!(provider.model(), "deepseek-chat");
    }

    #[test]
    fn test_openrouter_factory() {
        let provider = OpenAiCompatibleProvider::openrouter(key(), "openai/gpt-4o");
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.model(), "openai/gpt-4o");
    }

    #[test]
    fn test_build_request_maps_roles_and_sampling() {
        let provider = OpenAiCompatibleProvider::openai(key(), "gpt-4o");
        let messages = vec![
            Message::system("stay in character"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let request = CompletionRequest::from_messages(&messages, &SamplingParams::new(0.25, 300));

        let oai = provider.build_request(&request);
        assert_eq!(oai.model, "gpt-4o");
        assert_eq!(oai.max_completion_tokens, Some(300));
        assert_eq!(oai.temperature, Some(0.25));
        assert_eq!(oai.messages.len(), 3);
        assert!(matches!(oai.messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(oai.messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(oai.messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_build_request_honours_model_override() {
        let provider = OpenAiCompatibleProvider::openai(key(), "gpt-4o");
        let mut request = CompletionRequest::from_messages(&[Message::user("hi")], &SamplingParams::default());
        request.model = "gpt-4o-mini".to_string();
        assert_eq!(provider.build_request(&request).model, "gpt-4o-mini");
    }

    #[test]
    fn test_map_invalid_argument() {
        let err = map_openai_error(async_openai::error::OpenAIError::InvalidArgument("bad".into()));
        assert!(matches!(err, LlmError::InvalidRequest(msg) if msg == "bad"));
    }
}

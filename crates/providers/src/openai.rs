//! Token streaming against OpenAI-compatible `/chat/completions` endpoints
//! (OpenAI, Grok, Ollama's `/v1`, local servers).
use anyhow::{Result, anyhow};
use async_openai::config::OpenAIConfig;
use async_openai::{
    Client as OpenAIClient,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use brainwire_core::completion::AiRequest;
use brainwire_core::config::ProviderSettings;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

pub struct OpenAiStreamer {
    client: OpenAIClient<OpenAIConfig>,
}

impl OpenAiStreamer {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow!("'base_url' setting is required for streaming"))?;

        let mut config = OpenAIConfig::new().with_api_base(base_url.trim_end_matches('/'));
        // Local servers (Ollama, llama.cpp) take no key
        if let Some(api_key) = settings.resolve_api_key()? {
            config = config.with_api_key(api_key);
        }

        Ok(Self {
            client: OpenAIClient::with_config(config),
        })
    }

    /// Content deltas of one streamed completion, in send order.
    pub async fn stream(&self, request: &AiRequest) -> Result<BoxStream<'static, Result<String>>> {
        let message = ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.input.as_str())
                .build()?,
        );
        let request = CreateChatCompletionRequestArgs::default()
            .model(request.model.id.clone())
            .messages(vec![message])
            .stream(true)
            .build()
            .map_err(|err| anyhow!("Invalid request: {:?}", err))?;

        let response = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|err| anyhow!("OpenAI request failed: {}", err))?;

        let deltas = response.filter_map(|next| async move {
            match next {
                // Usage-only chunks have no choices
                Ok(chunk) => chunk.choices.first().and_then(|choice| {
                    if let Some(reason) = &choice.finish_reason {
                        debug!(?reason, "Stream finished");
                    }
                    choice.delta.content.clone().map(Ok)
                }),
                Err(err) => Some(Err(anyhow!("OpenAI stream error: {}", err))),
            }
        });
        Ok(deltas.boxed())
    }
}

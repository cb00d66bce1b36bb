use std::sync::Arc;

use futures::future::BoxFuture;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::message::AssistantContent;
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use serde_json::{Value, json};
use snafu::{ResultExt, ensure};
use tokio::sync::Mutex;

use super::model::{GenerationConfig, SafetySetting};
use super::provider::{
    ChatHandle, CompletionsFailedSnafu, ConversationProvider, EmptyMessageSnafu,
    EmptyResponseSnafu, HttpClientSnafu, MissingApiKeySnafu, ProviderConfig, ProviderMessage,
    ProviderResult, Role, StartChatRequest,
};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";

pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.base_url.is_empty() {
            builder = builder.base_url(config.base_url.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }
}

impl ConversationProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig Gemini"
    }

    fn start_chat<'a>(
        &'a self,
        request: StartChatRequest,
    ) -> BoxFuture<'a, ProviderResult<Arc<dyn ChatHandle>>> {
        Box::pin(async move {
            let client = Self::build_client(&self.config)?;
            let history = request
                .history
                .iter()
                .filter(|message| !message.content.trim().is_empty())
                .map(to_rig_message)
                .collect::<Vec<_>>();

            tracing::debug!(
                provider_id = %self.config.provider_id,
                model_id = %request.model_id,
                history_len = history.len(),
                "opened gemini chat context"
            );

            let handle: Arc<dyn ChatHandle> = Arc::new(RigChatHandle {
                client,
                model_id: request.model_id,
                additional_params: additional_params(
                    &request.generation_config,
                    &request.safety_settings,
                ),
                generation_config: request.generation_config,
                history: Mutex::new(history),
            });
            Ok(handle)
        })
    }
}

/// Running dialogue against one Gemini model.
pub struct RigChatHandle {
    client: gemini::Client,
    model_id: String,
    generation_config: GenerationConfig,
    additional_params: Value,
    history: Mutex<Vec<RigMessage>>,
}

impl RigChatHandle {
    async fn complete(&self, text: String) -> ProviderResult<String> {
        ensure!(
            !text.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "send-message",
                model_id: self.model_id.clone(),
            }
        );

        // Held across the request so the history only grows by complete exchanges.
        let mut history = self.history.lock().await;
        let model = self.client.completion_model(self.model_id.clone());
        let prompt = RigMessage::user(text.clone());

        let response = model
            .completion_request(prompt.clone())
            .messages(history.clone())
            .temperature(self.generation_config.temperature)
            .max_tokens(self.generation_config.max_output_tokens)
            .additional_params(self.additional_params.clone())
            .send()
            .await
            .context(CompletionsFailedSnafu {
                stage: "send-message",
            })?;

        let reply = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        ensure!(
            !reply.is_empty(),
            EmptyResponseSnafu {
                stage: "extract-reply",
                model_id: self.model_id.clone(),
            }
        );

        history.push(prompt);
        history.push(RigMessage::assistant(reply.clone()));
        tracing::debug!(
            model_id = %self.model_id,
            history_len = history.len(),
            reply_len = reply.len(),
            "gemini reply received"
        );
        Ok(reply)
    }
}

impl ChatHandle for RigChatHandle {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn send_message<'a>(&'a self, text: String) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(self.complete(text))
    }
}

fn to_rig_message(message: &ProviderMessage) -> RigMessage {
    match message.role {
        Role::User => RigMessage::user(message.content.clone()),
        Role::Assistant => RigMessage::assistant(message.content.clone()),
    }
}

/// Gemini-native request fields that Rig's builder does not model directly.
pub(crate) fn additional_params(
    generation_config: &GenerationConfig,
    safety_settings: &[SafetySetting],
) -> Value {
    let mut params = json!({ "generationConfig": generation_config });
    if !safety_settings.is_empty() {
        params["safetySettings"] = json!(safety_settings);
    }
    params
}

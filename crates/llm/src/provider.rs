use std::sync::Arc;

use futures::future::BoxFuture;
use snafu::Snafu;

use super::model::{GenerationConfig, SafetySetting};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub base_url: String,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim().to_string(),
        }
    }
}

/// Speaker of one history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything needed to open one dialogue context.
#[derive(Debug, Clone, PartialEq)]
pub struct StartChatRequest {
    pub model_id: String,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
    pub history: Vec<ProviderMessage>,
}

impl StartChatRequest {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            generation_config: GenerationConfig::default(),
            safety_settings: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }

    pub fn with_safety_settings(mut self, safety_settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = safety_settings;
        self
    }

    pub fn with_history(mut self, history: Vec<ProviderMessage>) -> Self {
        self.history = history;
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("chat request for model '{model_id}' has an empty message"))]
    EmptyMessage {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("model '{model_id}' returned no text on `{stage}`"))]
    EmptyResponse {
        stage: &'static str,
        model_id: String,
    },
}

/// Opaque dialogue context bound to one `start_chat` call.
///
/// A handle keeps its own running history; a failed send leaves that history untouched.
pub trait ChatHandle: Send + Sync {
    fn model_id(&self) -> &str;
    fn send_message<'a>(&'a self, text: String) -> BoxFuture<'a, ProviderResult<String>>;
}

pub trait ConversationProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn start_chat<'a>(
        &'a self,
        request: StartChatRequest,
    ) -> BoxFuture<'a, ProviderResult<Arc<dyn ChatHandle>>>;
}

use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;

pub use futures::future::BoxFuture;
pub use model::{
    DEFAULT_GEMINI_MODEL, GenerationConfig, HarmBlockThreshold, HarmCategory, SafetySetting,
    default_safety_settings,
};
pub use provider::{
    ChatHandle, ConversationProvider, ProviderConfig, ProviderError, ProviderMessage,
    ProviderResult, Role, StartChatRequest,
};
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigChatHandle, RigProviderAdapter};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn ConversationProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

use aichat_llm::ProviderError;
use snafu::Snafu;

use super::session::SessionState;

pub const INITIALIZATION_FAILED_MESSAGE: &str = "Failed to initialize chat. Please try again.";
pub const NOT_READY_MESSAGE: &str = "Chat is not initialized yet. Please wait.";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message. Please try again.";
pub const EMPTY_MESSAGE_MESSAGE: &str = "Type a message before sending.";
pub const SEND_IN_PROGRESS_MESSAGE: &str = "Still waiting for the previous reply.";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("chat initialization failed on `{stage}`, {source}"))]
    InitializationFailed {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("chat session is not ready on `{stage}` (state: {state:?})"))]
    NotReady {
        stage: &'static str,
        state: SessionState,
    },
    #[snafu(display("sending message failed on `{stage}`, {source}"))]
    SendFailed {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("refusing to send an empty message on `{stage}`"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("another message is already in flight on `{stage}`"))]
    SendInProgress { stage: &'static str },
    #[snafu(display("completion for generation {generation} arrived after the session moved on"))]
    Superseded {
        stage: &'static str,
        generation: u64,
    },
}

impl SessionError {
    /// Text for the inline error banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InitializationFailed { .. } => INITIALIZATION_FAILED_MESSAGE,
            Self::NotReady { .. } | Self::Superseded { .. } => NOT_READY_MESSAGE,
            Self::SendFailed { .. } => SEND_FAILED_MESSAGE,
            Self::EmptyMessage { .. } => EMPTY_MESSAGE_MESSAGE,
            Self::SendInProgress { .. } => SEND_IN_PROGRESS_MESSAGE,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

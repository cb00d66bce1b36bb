#![deny(unsafe_code)]

/// Terminal shell: auth screens, the chat screen and the route loop between them.
pub mod app;
/// Chat domain: turns, conversation and the session manager.
pub mod chat;
pub mod error;
/// Settings persistence.
pub mod settings;

pub use app::ChatApp;
pub use error::{AppError, AppResult};

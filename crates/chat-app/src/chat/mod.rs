/// Banner texts and the session error type.
pub mod error;
/// Turns and the append-only conversation.
pub mod message;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use message::{Conversation, Role, Turn, TurnId, TurnStatus};
pub use session::{SessionConfig, SessionGeneration, SessionManager, SessionState};

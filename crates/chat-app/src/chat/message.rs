use std::time::SystemTime;

use aichat_llm::{ProviderMessage, Role as ProviderRole};

/// Stable identifier for one turn within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    /// Creates a typed turn identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl From<Role> for ProviderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ProviderRole::User,
            Role::Assistant => ProviderRole::Assistant,
        }
    }
}

/// Delivery status for one turn.
///
/// User turns start `Pending` and settle exactly once; assistant turns are always `Complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Pending,
    Answered,
    Failed(String),
    Complete,
}

/// One message of the conversation. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub text: String,
    pub timestamp: SystemTime,
    pub status: TurnStatus,
}

impl Turn {
    /// Creates a user turn awaiting its reply.
    pub fn user(id: TurnId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            text: text.into(),
            timestamp: SystemTime::now(),
            status: TurnStatus::Pending,
        }
    }

    /// Creates a completed assistant turn.
    pub fn assistant(id: TurnId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: text.into(),
            timestamp: SystemTime::now(),
            status: TurnStatus::Complete,
        }
    }

    /// True for turns that belong to a completed user/assistant exchange.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, TurnStatus::Answered | TurnStatus::Complete)
    }
}

/// Append-only turn sequence for one screen activation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    next_turn_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> TurnId {
        let id = self.allocate_id();
        self.turns.push(Turn::user(id, text));
        id
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) -> &Turn {
        let id = self.allocate_id();
        let index = self.turns.len();
        self.turns.push(Turn::assistant(id, text));
        &self.turns[index]
    }

    /// Settles a pending user turn. Returns false if the turn is unknown or already settled.
    pub fn settle(&mut self, id: TurnId, status: TurnStatus) -> bool {
        match self.turns.iter_mut().find(|turn| turn.id == id) {
            Some(turn) if turn.status == TurnStatus::Pending => {
                turn.status = status;
                true
            }
            Some(_) | None => false,
        }
    }

    /// History handed to the provider: completed exchanges only, in conversation order.
    pub fn history(&self) -> Vec<ProviderMessage> {
        self.turns
            .iter()
            .filter(|turn| turn.is_settled())
            .map(|turn| ProviderMessage::new(turn.role.into(), turn.text.clone()))
            .collect()
    }

    fn allocate_id(&mut self) -> TurnId {
        self.next_turn_id += 1;
        TurnId::new(self.next_turn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_ids_follow_insertion_order() {
        let mut conversation = Conversation::new();

        let first = conversation.push_user("hello");
        let second = conversation.push_assistant("hi there").id;

        assert!(first < second);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[1].role, Role::Assistant);
    }

    #[test]
    fn settle_only_moves_pending_turns_once() {
        let mut conversation = Conversation::new();
        let id = conversation.push_user("hello");

        assert!(conversation.settle(id, TurnStatus::Failed("offline".to_string())));
        assert!(!conversation.settle(id, TurnStatus::Answered));
        assert_eq!(
            conversation.get(id).map(|turn| turn.status.clone()),
            Some(TurnStatus::Failed("offline".to_string()))
        );
    }

    #[test]
    fn settle_ignores_assistant_turns() {
        let mut conversation = Conversation::new();
        let id = conversation.push_assistant("hi").id;

        assert!(!conversation.settle(id, TurnStatus::Answered));
    }

    #[test]
    fn history_skips_unanswered_user_turns() {
        let mut conversation = Conversation::new();
        let answered = conversation.push_user("hello");
        conversation.settle(answered, TurnStatus::Answered);
        conversation.push_assistant("hi there");
        let failed = conversation.push_user("are you there?");
        conversation.settle(failed, TurnStatus::Failed("timeout".to_string()));
        conversation.push_user("still waiting");

        let history = conversation.history();

        assert_eq!(
            history,
            vec![
                ProviderMessage::new(ProviderRole::User, "hello"),
                ProviderMessage::new(ProviderRole::Assistant, "hi there"),
            ]
        );
        assert_eq!(conversation.len(), 4);
    }
}

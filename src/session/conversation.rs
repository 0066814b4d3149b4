use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat completion APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single immutable entry in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: String,
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payment_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String, tokens: Option<u64>, payment_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tokens,
            payment_ref,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into(), None, None)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None, None)
    }

    /// Assistant reply annotated with usage metadata
    pub fn assistant(content: impl Into<String>, tokens: u64, payment_ref: Option<String>) -> Self {
        Self::new(Role::Assistant, content.into(), Some(tokens), payment_ref)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tokens(&self) -> Option<u64> {
        self.tokens
    }

    pub fn payment_ref(&self) -> Option<&str> {
        self.payment_ref.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Link to the payment transaction in a block explorer, if this message carries one
    pub fn explorer_link(&self, explorer_base: &str) -> Option<String> {
        self.payment_ref
            .as_deref()
            .map(|txid| format!("{}{}", explorer_base, txid))
    }
}

/// Reasons a sequence of messages is not a valid conversation log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("duplicate message id {0}")]
    DuplicateId(String),

    #[error("system message at position {0}; only the first entry may be a system message")]
    MisplacedSystem(usize),

    #[error("role order broken at position {0}")]
    RoleOrder(usize),

    #[error("conversation ends with an unanswered user message")]
    IncompleteTurn,
}

/// Ordered, append-only record of a conversation
///
/// Layout is an optional leading system message followed by whole turns
/// (user then assistant). Turns are only ever appended as a pair, so the log
/// never holds a prompt without its reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored messages, checking every invariant
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, LogError> {
        let mut seen = HashSet::with_capacity(messages.len());
        let mut expected = Role::User;

        for (index, message) in messages.iter().enumerate() {
            if !seen.insert(message.id.as_str()) {
                return Err(LogError::DuplicateId(message.id.clone()));
            }

            match message.role {
                Role::System if index == 0 => continue,
                Role::System => return Err(LogError::MisplacedSystem(index)),
                role if role != expected => return Err(LogError::RoleOrder(index)),
                Role::User => expected = Role::Assistant,
                Role::Assistant => expected = Role::User,
            }
        }

        if expected == Role::Assistant {
            return Err(LogError::IncompleteTurn);
        }

        Ok(Self { messages })
    }

    /// Append a completed turn atomically
    pub fn push_turn(&mut self, user: Message, assistant: Message) -> Result<(), LogError> {
        let position = self.messages.len();
        if user.role != Role::User {
            return Err(LogError::RoleOrder(position));
        }
        if assistant.role != Role::Assistant {
            return Err(LogError::RoleOrder(position + 1));
        }
        if user.id == assistant.id || self.messages.iter().any(|m| m.id == user.id) {
            return Err(LogError::DuplicateId(user.id));
        }
        if self.messages.iter().any(|m| m.id == assistant.id) {
            return Err(LogError::DuplicateId(assistant.id));
        }

        self.messages.push(user);
        self.messages.push(assistant);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed user/assistant turns
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    /// Sum of tokens reported for every assistant reply
    pub fn total_tokens(&self) -> u64 {
        self.messages.iter().filter_map(|m| m.tokens).sum()
    }

    /// Most recent payment reference attached to any message
    pub fn last_payment_ref(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| m.payment_ref())
    }
}

impl TryFrom<Vec<Message>> for ConversationLog {
    type Error = LogError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        Self::from_messages(messages)
    }
}

impl From<ConversationLog> for Vec<Message> {
    fn from(log: ConversationLog) -> Self {
        log.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_turn_appends_pair() {
        let mut log = ConversationLog::new();
        log.push_turn(Message::user("a"), Message::assistant("b", 12, Some("tx1".into())))
            .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].role(), Role::User);
        assert_eq!(log.messages()[1].role(), Role::Assistant);
        assert_eq!(log.total_tokens(), 12);
        assert_eq!(log.last_payment_ref(), Some("tx1"));
        assert_eq!(log.turn_count(), 1);
    }

    #[test]
    fn test_push_turn_rejects_wrong_roles() {
        let mut log = ConversationLog::new();
        let err = log
            .push_turn(Message::assistant("b", 0, None), Message::user("a"))
            .unwrap_err();
        assert_eq!(err, LogError::RoleOrder(0));
        assert!(log.is_empty());
    }

    #[test]
    fn test_from_messages_validates_layout() {
        let valid = vec![
            Message::system("be nice"),
            Message::user("a"),
            Message::assistant("b", 1, None),
        ];
        assert!(ConversationLog::from_messages(valid).is_ok());

        let doubled_user = vec![Message::user("a"), Message::user("b")];
        assert_eq!(
            ConversationLog::from_messages(doubled_user).unwrap_err(),
            LogError::RoleOrder(1)
        );

        let late_system = vec![
            Message::user("a"),
            Message::assistant("b", 1, None),
            Message::system("late"),
        ];
        assert_eq!(
            ConversationLog::from_messages(late_system).unwrap_err(),
            LogError::MisplacedSystem(2)
        );

        let dangling = vec![Message::user("a")];
        assert_eq!(
            ConversationLog::from_messages(dangling).unwrap_err(),
            LogError::IncompleteTurn
        );
    }

    #[test]
    fn test_from_messages_rejects_duplicate_ids() {
        let user = Message::user("a");
        let messages = vec![user.clone(), Message::assistant("b", 0, None), user];
        assert!(matches!(
            ConversationLog::from_messages(messages),
            Err(LogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_explorer_link() {
        let reply = Message::assistant("hi", 3, Some("abc123".into()));
        assert_eq!(
            reply.explorer_link("https://whatsonchain.com/tx/").as_deref(),
            Some("https://whatsonchain.com/tx/abc123")
        );
        assert_eq!(Message::user("q").explorer_link("https://x/"), None);
    }

    #[test]
    fn test_serializes_camel_case() {
        let reply = Message::assistant("hi", 3, Some("abc".into()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["paymentRef"], "abc");
        assert!(json.get("createdAt").is_some());

        let user = serde_json::to_value(Message::user("q")).unwrap();
        assert!(user.get("tokens").is_none());
    }

    #[test]
    fn test_deserialize_rejects_broken_log() {
        let broken = serde_json::to_string(&vec![Message::user("a"), Message::user("b")]).unwrap();
        assert!(serde_json::from_str::<ConversationLog>(&broken).is_err());

        let mut log = ConversationLog::new();
        log.push_turn(Message::user("a"), Message::assistant("b", 2, None))
            .unwrap();
        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(serde_json::from_str::<ConversationLog>(&json).unwrap(), log);
    }
}

use serde::Serialize;

use super::conversation::{ConversationLog, Role};
use crate::app::SessionConfig;
use crate::constants::{DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_CONTEXT_MESSAGES};

/// One entry of the context sent upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Builds the bounded message list for each upstream call
///
/// Output is `[system?] + trailing window of whole turns + new prompt`.
/// Only the most recent `window` exchanges are sent: older history is
/// intentionally dropped to keep upstream cost flat. The prompt is always
/// last and the output never exceeds `max_messages`.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
    window: usize,
    max_messages: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_CONTEXT_MESSAGES)
    }
}

impl ContextAssembler {
    pub fn new(system_prompt: impl Into<String>, window: usize, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            window,
            max_messages: max_messages.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.core_prompt.clone(),
            config.context_window,
            config.max_context_messages,
        )
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Assemble the context for `prompt` from the log as it stands now
    pub fn build(&self, log: &ConversationLog, prompt: &str) -> Vec<ContextMessage> {
        self.build_with_carryover(log, prompt, None)
    }

    /// Like [`build`](Self::build), but when the log holds no turns a
    /// previous user prompt supplied by the caller stands in for history
    pub fn build_with_carryover(
        &self,
        log: &ConversationLog,
        prompt: &str,
        carryover: Option<&str>,
    ) -> Vec<ContextMessage> {
        // One slot is always reserved for the new prompt
        let mut remaining = self.max_messages - 1;
        let mut messages = Vec::with_capacity(self.max_messages);

        if !self.system_prompt.is_empty() && remaining > 0 {
            messages.push(ContextMessage::new(Role::System, self.system_prompt.as_str()));
            remaining -= 1;
        }

        let history: Vec<_> = log
            .messages()
            .iter()
            .filter(|m| m.role() != Role::System)
            .collect();

        if history.is_empty() {
            if let Some(previous) = carryover.map(str::trim).filter(|p| !p.is_empty()) {
                if self.window > 0 && remaining > 0 {
                    messages.push(ContextMessage::new(Role::User, previous));
                }
            }
        } else {
            // Whole turns only, so the window never opens on a reply
            let turns = self.window.min(remaining / 2);
            let start = history.len().saturating_sub(turns * 2);
            messages.extend(
                history[start..]
                    .iter()
                    .map(|m| ContextMessage::new(m.role(), m.content())),
            );
        }

        messages.push(ContextMessage::new(Role::User, prompt));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use pretty_assertions::assert_eq;

    fn log_of(turns: &[(&str, &str)]) -> ConversationLog {
        let mut log = ConversationLog::new();
        for (user, assistant) in turns {
            log.push_turn(Message::user(*user), Message::assistant(*assistant, 1, None))
                .unwrap();
        }
        log
    }

    #[test]
    fn test_empty_log_is_system_plus_prompt() {
        let assembler = ContextAssembler::new("You are helpful.", 1, 4);
        let context = assembler.build(&ConversationLog::new(), "hello");
        assert_eq!(
            context,
            vec![
                ContextMessage::new(Role::System, "You are helpful."),
                ContextMessage::new(Role::User, "hello"),
            ]
        );
    }

    #[test]
    fn test_window_is_last_exchange() {
        let assembler = ContextAssembler::new("sys", 1, 4);
        let context = assembler.build(&log_of(&[("a", "b")]), "c");
        assert_eq!(
            context,
            vec![
                ContextMessage::new(Role::System, "sys"),
                ContextMessage::new(Role::User, "a"),
                ContextMessage::new(Role::Assistant, "b"),
                ContextMessage::new(Role::User, "c"),
            ]
        );
    }

    #[test]
    fn test_older_turns_are_dropped() {
        let assembler = ContextAssembler::new("sys", 1, 4);
        let log = log_of(&[("a", "b"), ("c", "d"), ("e", "f")]);
        let context = assembler.build(&log, "g");
        let contents: Vec<_> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "e", "f", "g"]);
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let assembler = ContextAssembler::new("", 1, 4);
        let context = assembler.build(&log_of(&[("a", "b")]), "c");
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].role, Role::User);
    }

    #[test]
    fn test_never_exceeds_max_and_ends_with_prompt() {
        let log = log_of(&[("a", "b"), ("c", "d"), ("e", "f"), ("g", "h")]);
        for max in 1..8 {
            for window in 0..4 {
                for system in ["", "sys"] {
                    let assembler = ContextAssembler::new(system, window, max);
                    let context = assembler.build(&log, "prompt");
                    assert!(context.len() <= max, "max={max} window={window}");
                    assert_eq!(context.last(), Some(&ContextMessage::new(Role::User, "prompt")));
                }
            }
        }
    }

    #[test]
    fn test_larger_window() {
        let assembler = ContextAssembler::new("sys", 2, 6);
        let log = log_of(&[("a", "b"), ("c", "d"), ("e", "f")]);
        let contents: Vec<_> = assembler
            .build(&log, "g")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["sys", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn test_log_system_message_not_resent() {
        let messages = vec![
            Message::system("old system"),
            Message::user("a"),
            Message::assistant("b", 1, None),
        ];
        let log = ConversationLog::from_messages(messages).unwrap();
        let assembler = ContextAssembler::new("new system", 1, 4);
        let context = assembler.build(&log, "c");
        assert_eq!(
            context.iter().filter(|m| m.role == Role::System).count(),
            1
        );
        assert_eq!(context[0].content, "new system");
    }

    #[test]
    fn test_carryover_only_when_log_is_empty() {
        let assembler = ContextAssembler::new("sys", 1, 4);
        let context =
            assembler.build_with_carryover(&ConversationLog::new(), "b", Some("a"));
        let contents: Vec<_> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "a", "b"]);

        let context = assembler.build_with_carryover(&log_of(&[("x", "y")]), "b", Some("a"));
        let contents: Vec<_> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "x", "y", "b"]);
    }

    #[test]
    fn test_build_does_not_mutate_log() {
        let log = log_of(&[("a", "b")]);
        let before = log.clone();
        let _ = ContextAssembler::default().build(&log, "c");
        assert_eq!(log, before);
    }
}

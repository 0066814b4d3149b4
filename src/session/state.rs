use serde::{Deserialize, Serialize};

use super::conversation::ConversationLog;

/// Session state that persists between runs
///
/// Stored as a single JSON record `{log, lastPaymentRef}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub log: ConversationLog,
    #[serde(default)]
    pub last_payment_ref: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot of a log, carrying forward the newest payment reference
    pub fn of(log: &ConversationLog, previous_ref: Option<&str>) -> Self {
        let last_payment_ref = log
            .last_payment_ref()
            .or(previous_ref)
            .map(str::to_string);
        Self {
            log: log.clone(),
            last_payment_ref,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.last_payment_ref.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    #[test]
    fn test_snapshot_layout() {
        let mut log = ConversationLog::new();
        log.push_turn(Message::user("a"), Message::assistant("b", 4, Some("tx9".into())))
            .unwrap();
        let snapshot = SessionSnapshot::of(&log, None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["lastPaymentRef"], "tx9");
        assert_eq!(json["log"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_previous_ref_is_kept_when_log_has_none() {
        let snapshot = SessionSnapshot::of(&ConversationLog::new(), Some("tx1"));
        assert_eq!(snapshot.last_payment_ref.as_deref(), Some("tx1"));
        assert!(!snapshot.is_empty());
        assert!(SessionSnapshot::default().is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let snapshot: SessionSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
    }
}

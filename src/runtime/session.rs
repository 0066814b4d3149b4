use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::access::{AccessGate, AccessState};
use crate::relay::{Relay, RelayReply};
use crate::session::{ContextAssembler, ConversationLog, Message, SessionSnapshot, SessionStore};
use crate::utils::{fingerprint, ErrorKind};

/// Where the session's single submission slot currently stands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(ErrorKind),
}

impl SubmissionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SubmissionStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Idle => "idle",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Succeeded => "succeeded",
            SubmissionStatus::Failed(_) => "failed",
        }
    }
}

/// A completed prompt/reply pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user: Message,
    pub assistant: Message,
}

struct History {
    log: ConversationLog,
    last_payment_ref: Option<String>,
}

struct Shared {
    relay: Arc<dyn Relay>,
    assembler: ContextAssembler,
    store: SessionStore,
    access: RwLock<AccessState>,
    history: Mutex<History>,
    status: watch::Sender<SubmissionStatus>,
}

/// Orchestrates one conversation: gate, context, relay, persistence
///
/// Cheap to clone; clones share the same session. At most one submission is
/// in flight at a time, and a dispatched submission always runs to completion
/// even if the caller stops waiting for it.
#[derive(Clone)]
pub struct ConversationSession {
    shared: Arc<Shared>,
}

impl ConversationSession {
    /// Start a session from whatever the store holds
    pub fn new(relay: Arc<dyn Relay>, assembler: ContextAssembler, store: SessionStore) -> Self {
        let snapshot = store.load();
        let access = match store.load_proof() {
            Some(proof) => {
                info!(proof = %fingerprint(&proof), "Restored persisted access proof");
                AccessState::Authenticated(proof)
            }
            None => AccessState::Unauthenticated,
        };
        info!(
            messages = snapshot.log.len(),
            authenticated = access.is_authenticated(),
            "Session started"
        );

        let (status, _) = watch::channel(SubmissionStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                relay,
                assembler,
                store,
                access: RwLock::new(access),
                history: Mutex::new(History {
                    log: snapshot.log,
                    last_payment_ref: snapshot.last_payment_ref,
                }),
                status,
            }),
        }
    }

    /// Current submission status
    pub fn status(&self) -> SubmissionStatus {
        self.shared.status.borrow().clone()
    }

    /// Observe status changes as they happen
    pub fn subscribe(&self) -> watch::Receiver<SubmissionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        AccessGate::check(&self.shared.access.read())
    }

    /// Copy of the conversation so far
    pub fn log(&self) -> ConversationLog {
        self.shared.history.lock().log.clone()
    }

    pub fn last_payment_ref(&self) -> Option<String> {
        self.shared.history.lock().last_payment_ref.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let history = self.shared.history.lock();
        SessionSnapshot::of(&history.log, history.last_payment_ref.as_deref())
    }

    /// Present an externally produced proof
    ///
    /// The first valid proof authenticates the session and is persisted.
    /// Once authenticated, later calls never change the state.
    pub fn authenticate(&self, proof: &str) -> Result<(), ErrorKind> {
        let state = match AccessGate::authenticate(proof) {
            Ok(state) => state,
            Err(kind) => {
                warn!(kind = kind.label(), "Rejected access proof");
                return Err(kind);
            }
        };

        let proof = {
            let mut access = self.shared.access.write();
            if access.is_authenticated() {
                return Ok(());
            }
            *access = state;
            access.proof().map(str::to_string)
        };

        if let Some(proof) = proof {
            info!(proof = %fingerprint(&proof), "Session authenticated");
            if let Err(e) = self.shared.store.save_proof(&proof) {
                error!("Failed to persist access proof: {}", e);
            }
        }
        Ok(())
    }

    /// Submit a prompt and wait for the turn to complete
    pub async fn submit(&self, prompt: &str) -> Result<Turn, ErrorKind> {
        self.submit_with_carryover(prompt, None).await
    }

    /// Submit with a previous prompt to use as context if the log is empty
    pub async fn submit_with_carryover(
        &self,
        prompt: &str,
        carryover: Option<&str>,
    ) -> Result<Turn, ErrorKind> {
        let handle = self.dispatch_with_carryover(prompt, carryover)?;
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                // Only reachable if the relay task panicked
                error!("Relay task aborted: {}", e);
                let kind = ErrorKind::Transport("relay task aborted".to_string());
                self.shared
                    .status
                    .send_replace(SubmissionStatus::Failed(kind.clone()));
                Err(kind)
            }
        }
    }

    /// Start a submission and return as soon as it is in flight
    ///
    /// Rejections (`Busy`, `NotAuthenticated`, `EmptyPrompt`) are returned
    /// immediately and leave the session untouched. Must be called from
    /// within a Tokio runtime.
    pub fn dispatch(&self, prompt: &str) -> Result<JoinHandle<Result<Turn, ErrorKind>>, ErrorKind> {
        self.dispatch_with_carryover(prompt, None)
    }

    fn dispatch_with_carryover(
        &self,
        prompt: &str,
        carryover: Option<&str>,
    ) -> Result<JoinHandle<Result<Turn, ErrorKind>>, ErrorKind> {
        self.begin(prompt)?;

        // Context comes from the log as it was before this call
        let context = {
            let history = self.shared.history.lock();
            self.shared
                .assembler
                .build_with_carryover(&history.log, prompt, carryover)
        };

        let shared = Arc::clone(&self.shared);
        let prompt = prompt.to_string();
        Ok(tokio::spawn(async move {
            let result = shared.relay.send(&context).await;
            shared.finish(prompt, result)
        }))
    }

    /// Atomically move into Pending, or say why not
    fn begin(&self, prompt: &str) -> Result<(), ErrorKind> {
        let mut rejection = None;
        self.shared.status.send_if_modified(|status| {
            if status.is_pending() {
                rejection = Some(ErrorKind::Busy);
            } else if !AccessGate::check(&self.shared.access.read()) {
                rejection = Some(ErrorKind::NotAuthenticated);
            } else if prompt.trim().is_empty() {
                rejection = Some(ErrorKind::EmptyPrompt);
            } else {
                *status = SubmissionStatus::Pending;
                return true;
            }
            false
        });

        match rejection {
            Some(kind) => {
                info!(kind = kind.label(), "Submission rejected");
                Err(kind)
            }
            None => Ok(()),
        }
    }

    /// Clear the conversation and the persisted session
    ///
    /// Access drops back to Unauthenticated only once the persisted proof is
    /// gone too. Rejected with `Busy` while a submission is in flight. The
    /// status reads `Pending` while the store is being cleared.
    pub fn reset(&self) -> Result<(), ErrorKind> {
        let mut busy = false;
        self.shared.status.send_if_modified(|status| {
            if status.is_pending() {
                busy = true;
                return false;
            }
            *status = SubmissionStatus::Pending;
            true
        });
        if busy {
            return Err(ErrorKind::Busy);
        }

        {
            let mut history = self.shared.history.lock();
            history.log = ConversationLog::new();
            history.last_payment_ref = None;
        }

        match self.shared.store.clear() {
            Ok(()) => *self.shared.access.write() = AccessState::Unauthenticated,
            Err(e) => error!("Failed to clear stored session, keeping access: {}", e),
        }

        self.shared.status.send_replace(SubmissionStatus::Idle);
        info!("Session reset");
        Ok(())
    }
}

impl Shared {
    /// Record the outcome of an in-flight submission
    fn finish(&self, prompt: String, result: Result<RelayReply, ErrorKind>) -> Result<Turn, ErrorKind> {
        let reply = match result {
            Ok(reply) => reply,
            Err(kind) => {
                warn!(kind = kind.label(), "Submission failed");
                self.status.send_replace(SubmissionStatus::Failed(kind.clone()));
                return Err(kind);
            }
        };

        let turn = Turn {
            user: Message::user(prompt),
            assistant: Message::assistant(reply.content, reply.tokens, reply.payment_ref),
        };

        let snapshot = {
            let mut history = self.history.lock();
            if let Err(e) = history
                .log
                .push_turn(turn.user.clone(), turn.assistant.clone())
            {
                error!("Conversation log rejected a completed turn: {}", e);
                drop(history);
                let kind = ErrorKind::StorageCorrupt;
                self.status.send_replace(SubmissionStatus::Failed(kind.clone()));
                return Err(kind);
            }
            if let Some(payment_ref) = turn.assistant.payment_ref() {
                history.last_payment_ref = Some(payment_ref.to_string());
            }
            SessionSnapshot::of(&history.log, history.last_payment_ref.as_deref())
        };

        if let Err(e) = self.store.save(&snapshot) {
            error!("Failed to persist session: {}", e);
        }

        info!(
            tokens = turn.assistant.tokens().unwrap_or(0),
            messages = snapshot.log.len(),
            "Turn completed"
        );
        self.status.send_replace(SubmissionStatus::Succeeded);
        self.status.send_replace(SubmissionStatus::Idle);
        Ok(turn)
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::constants::{MAX_PROOF_LEN, MIN_PROOF_LEN};
use crate::utils::{fingerprint, ErrorKind};

static PROOF_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^[A-Za-z0-9._:+/=-]{{{},{}}}$",
        MIN_PROOF_LEN, MAX_PROOF_LEN
    ))
    .expect("valid proof pattern")
});

/// Whether the current user may submit prompts
///
/// Only ever moves from `Unauthenticated` to `Authenticated` within a session.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AccessState {
    #[default]
    Unauthenticated,
    Authenticated(String),
}

impl AccessState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AccessState::Authenticated(_))
    }

    /// The proof this session was authenticated with
    pub fn proof(&self) -> Option<&str> {
        match self {
            AccessState::Authenticated(proof) => Some(proof),
            AccessState::Unauthenticated => None,
        }
    }
}

// Proofs are bearer-like, so Debug only shows a fingerprint
impl fmt::Debug for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessState::Unauthenticated => f.write_str("Unauthenticated"),
            AccessState::Authenticated(proof) => f
                .debug_tuple("Authenticated")
                .field(&fingerprint(proof))
                .finish(),
        }
    }
}

/// Pure gate in front of submission
///
/// Consumes proofs produced by an external payment provider and checks only
/// their presence and shape. Verification belongs to the provider.
pub struct AccessGate;

impl AccessGate {
    /// Allow submission iff the state is authenticated
    pub fn check(state: &AccessState) -> bool {
        state.is_authenticated()
    }

    /// Turn an externally produced proof into an authenticated state
    pub fn authenticate(proof: &str) -> Result<AccessState, ErrorKind> {
        let proof = proof.trim();
        if Self::is_well_formed(proof) {
            Ok(AccessState::Authenticated(proof.to_string()))
        } else {
            Err(ErrorKind::InvalidProof)
        }
    }

    /// Opaque format check: length bounds and a token-safe alphabet
    pub fn is_well_formed(proof: &str) -> bool {
        PROOF_SHAPE.is_match(proof)
    }
}

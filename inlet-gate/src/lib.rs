//! Inlet Authorization Gate
//!
//! A stateless decision function over an inbound request credential,
//! plus the time-bounded decision cache the gateway keeps on its side.
//!
//! The gate never errors: absent or malformed credentials evaluate to
//! "not authorized", never to a failure. Its only side effect is
//! observability logging. The gate does not assume its output is cached:
//! every call is independently correct. Callers are expected to memoize
//! decisions per distinct credential value for a bounded interval (see
//! [`DecisionCache`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;

pub use cache::DecisionCache;

use tracing::debug;

/// The outcome of evaluating a credential.
///
/// Ephemeral: held only in the caller's cache, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
    /// Whether the call may proceed
    pub is_authorized: bool,
}

impl AuthDecision {
    /// An authorized decision
    pub const ALLOW: AuthDecision = AuthDecision { is_authorized: true };
    /// A rejected decision
    pub const DENY: AuthDecision = AuthDecision { is_authorized: false };
}

/// The authorization gate.
///
/// With an expected token configured, `authorize` is a pure comparison
/// of the presented credential against it, accepting either the raw
/// token or the `Bearer <token>` header form. With no token configured,
/// any present credential is accepted, the permissive posture of the
/// original gateway authorizer, while an absent credential is always
/// rejected.
#[derive(Debug, Clone)]
pub struct Gate {
    expected_token: Option<String>,
}

impl Gate {
    /// Create a gate that validates credentials against a shared token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { expected_token: Some(token.into()) }
    }

    /// Create a permissive gate: any present credential is authorized.
    pub fn permissive() -> Self {
        Self { expected_token: None }
    }

    /// Evaluate a credential.
    ///
    /// Never panics and never returns an error, whatever the input
    /// shape: `None`, empty, or arbitrary bytes all evaluate to a
    /// decision.
    pub fn authorize(&self, credential: Option<&str>) -> AuthDecision {
        let decision = self.evaluate(credential);
        debug!(
            credential_present = credential.is_some(),
            is_authorized = decision.is_authorized,
            "Authorization decision"
        );
        decision
    }

    fn evaluate(&self, credential: Option<&str>) -> AuthDecision {
        let Some(credential) = credential else {
            return AuthDecision::DENY;
        };
        if credential.is_empty() {
            return AuthDecision::DENY;
        }

        match &self.expected_token {
            None => AuthDecision::ALLOW,
            Some(expected) => {
                let presented = credential
                    .strip_prefix("Bearer ")
                    .unwrap_or(credential);
                if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
                    AuthDecision::ALLOW
                } else {
                    AuthDecision::DENY
                }
            }
        }
    }
}

/// Length-aware byte comparison that does not short-circuit on the
/// first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// =============================================================================
// Tests
// =============================================================================

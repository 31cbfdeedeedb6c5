//! ABOUTME: Deeplink auth handshake: request a token, confirm in chat, exchange for a session
//! ABOUTME: Pending/approved/session state lives in memory only — a restart forces re-auth

use automaton_core::types::OwnerId;
use dashmap::DashMap;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Pending,
    Approved,
}

struct PendingAuth {
    status: AuthStatus,
    owner_id: Option<OwnerId>,
}

/// Backs `GET /api/auth/request` and `GET /api/auth/check/{token}`. The bot
/// link embeds `auth_token`; the orchestrator calls `approve` once the user
/// confirms in chat. A session token is minted only on approval and is the
/// only credential the rest of the dashboard API accepts.
pub struct AuthRegistry {
    pending: DashMap<String, PendingAuth>,
    sessions: DashMap<String, OwnerId>,
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

impl AuthRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { pending: DashMap::new(), sessions: DashMap::new() }
    }

    #[must_use]
    pub fn request(&self) -> String {
        let token = random_token();
        self.pending.insert(token.clone(), PendingAuth { status: AuthStatus::Pending, owner_id: None });
        token
    }

    /// Called by the orchestrator once the user confirms the deeplink in chat.
    pub fn approve(&self, auth_token: &str, owner_id: OwnerId) {
        if let Some(mut entry) = self.pending.get_mut(auth_token) {
            entry.status = AuthStatus::Approved;
            entry.owner_id = Some(owner_id);
        }
    }

    /// `None` if the token was never requested (or already exchanged).
    /// `Some((status, session_token))` — `session_token` is only `Some` once
    /// approved, and exchanging it here mints the session and burns the
    /// pending entry so a stolen auth_token can't be replayed afterward.
    pub fn check(&self, auth_token: &str) -> Option<(AuthStatus, Option<String>)> {
        let entry = self.pending.get(auth_token)?;
        if entry.status == AuthStatus::Pending {
            return Some((AuthStatus::Pending, None));
        }
        let owner_id = entry.owner_id?;
        drop(entry);
        self.pending.remove(auth_token);
        let session_token = random_token();
        self.sessions.insert(session_token.clone(), owner_id);
        Some((AuthStatus::Approved, Some(session_token)))
    }

    #[must_use]
    pub fn owner_for_session(&self, session_token: &str) -> Option<OwnerId> {
        self.sessions.get(session_token).map(|v| *v)
    }
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unapproved_token_reports_pending() {
        let registry = AuthRegistry::new();
        let token = registry.request();
        assert_eq!(registry.check(&token).unwrap().0, AuthStatus::Pending);
    }

    #[test]
    fn approval_yields_a_usable_session_exactly_once() {
        let registry = AuthRegistry::new();
        let token = registry.request();
        registry.approve(&token, 7);
        let (status, session) = registry.check(&token).unwrap();
        assert_eq!(status, AuthStatus::Approved);
        let session = session.unwrap();
        assert_eq!(registry.owner_for_session(&session), Some(7));

        // the auth token was consumed by the exchange above
        assert!(registry.check(&token).is_none());
    }

    #[test]
    fn unknown_token_is_none() {
        let registry = AuthRegistry::new();
        assert!(registry.check("nope").is_none());
    }
}

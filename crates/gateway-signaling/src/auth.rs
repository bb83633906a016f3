//! Bearer-token verification against the external identity authority.
//!
//! That authority is out of scope for this crate; [`IdentityVerifier`]
//! is the seam a real deployment plugs into.

use crate::protocol::AuthPayload;
use async_trait::async_trait;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, payload: &AuthPayload) -> bool;
}

/// Accepts any non-empty token. Stand-in used in tests and local
/// development where no identity authority is reachable.
#[derive(Debug, Default)]
pub struct AllowAllVerifier;

#[async_trait]
impl IdentityVerifier for AllowAllVerifier {
    async fn verify(&self, payload: &AuthPayload) -> bool {
        !payload.token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_token_rejected() {
        let verifier = AllowAllVerifier;
        let payload = AuthPayload {
            token: String::new(),
            agent_id: "agent-1".into(),
            tenant_id: "tenant-1".into(),
            user_id: "user-1".into(),
        };
        assert!(!verifier.verify(&payload).await);
    }

    #[tokio::test]
    async fn any_nonempty_token_accepted() {
        let verifier = AllowAllVerifier;
        let payload = AuthPayload {
            token: "tok".into(),
            agent_id: "agent-1".into(),
            tenant_id: "tenant-1".into(),
            user_id: "user-1".into(),
        };
        assert!(verifier.verify(&payload).await);
    }
}

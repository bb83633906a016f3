//! Opaque identifiers for the SIP gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SipSessionId(Uuid);

impl SipSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SipSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SipSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SipSessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Agent identity is minted by the external identity authority; the
/// gateway treats it as an opaque string key.
pub type AgentId = String;
pub type TenantId = String;

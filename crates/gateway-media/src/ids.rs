//! Opaque identifiers for media-plane resources.
//!
//! Each ID wraps a random v4 UUID and serializes as its plain string form,
//! matching the "all IDs are UUIDs" convention of the signaling protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(WorkerId);
uuid_id!(RouterId);
uuid_id!(TransportId);
uuid_id!(ProducerId);
uuid_id!(ConsumerId);

/// Defined here (rather than in `gateway-core`) because transports need to
/// record their owning peer and this crate must not depend back on
/// `gateway-core`. `gateway-core::Peer` uses this same type as its ID.
uuid_id!(PeerId);

/// Tenant identity. Tenants are opaque strings owned by the external
/// identity authority; the gateway never mints one.
pub type TenantId = String;

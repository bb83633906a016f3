//! RTP capability and parameter types exchanged between the router and its
//! clients. Deliberately minimal: enough structure for capability matching
//! and wire round-tripping, not a full SDP/RTP codec implementation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// One codec entry as advertised by a router, with the parameters a client
/// needs to build a compatible producer/consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpCodecCapability {
    pub mime_type: String,
    pub kind: MediaKind,
    pub clock_rate: u32,
    pub channels: Option<u8>,
    pub payload_type: u8,
}

/// The capability set a router exposes to peers before they create a
/// transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtpCapabilities {
    pub codecs: Vec<RtpCodecCapability>,
}

impl RtpCapabilities {
    pub fn supports(&self, mime_type: &str) -> bool {
        self.codecs.iter().any(|c| c.mime_type == mime_type)
    }
}

/// Parameters a client sends when creating a producer, or receives back
/// when creating a consumer. Opaque beyond the codec name needed for
/// capability matching; real payloads (fmtp, rtcp-fb, encodings) pass
/// through unexamined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpParameters {
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Capabilities a consuming client advertises in `consume()`. Matching
/// against the router's capability set decides `incompatible-capabilities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtpClientCapabilities {
    pub codecs: Vec<String>,
}

impl RtpClientCapabilities {
    pub fn is_compatible_with(&self, producer_params: &RtpParameters) -> bool {
        self.codecs
            .iter()
            .any(|mime| mime.eq_ignore_ascii_case(&producer_params.mime_type))
    }
}

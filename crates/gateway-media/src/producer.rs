//! Producer: an RTP ingress bound to one transport.

use crate::ids::{ProducerId, TransportId};
use crate::rtp::{MediaKind, RtpParameters};

#[derive(Debug, Clone)]
pub struct Producer {
    pub id: ProducerId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

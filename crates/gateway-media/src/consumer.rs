//! Consumer: an RTP egress bound to one transport, referencing exactly one
//! producer. Created paused; an explicit resume avoids first-frame loss.

use crate::ids::{ConsumerId, ProducerId, TransportId};
use crate::rtp::{MediaKind, RtpParameters};

#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: ConsumerId,
    pub transport_id: TransportId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub paused: bool,
}

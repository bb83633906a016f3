//! Per-call SIP configuration handed to `register_agent`.

#[derive(Debug, Clone)]
pub struct SipAgentConfig {
    pub display_name: String,
    pub contact_uri: String,
}

/// Gateway-wide SIP peer configuration, sourced from `SIP_HOST`,
/// `SIP_PORT`, `SIP_WS_URL`.
#[derive(Debug, Clone)]
pub struct SipGatewayConfig {
    pub ws_url: String,
    pub host: String,
    pub port: u16,
    pub registration_expires_secs: u32,
}

impl Default for SipGatewayConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://sip.example.internal/ws".into(),
            host: "sip.example.internal".into(),
            port: 5061,
            registration_expires_secs: 3600,
        }
    }
}

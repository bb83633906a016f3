//! Process-wide configuration, sourced from environment variables.
//! Startup aborts with exit code `1` if this fails to build
//! (`GatewayError::Config`).

use crate::error::GatewayError;
use gateway_media::{Codec, MediaConfig, WorkerLogLevel};
use gateway_sip::SipGatewayConfig;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Raw-TCP WebSocket signaling port. Separate from `port` because the
    /// signaling handshake runs its own tungstenite `accept_async` rather
    /// than going through the HTTP router.
    pub ws_port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub media: MediaConfig,
    pub sip: SipGatewayConfig,
    /// Reserved for multi-instance deployment; unused by the core.
    pub redis: Option<RedisConfig>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let port = parse_env("PORT", 3000)?;
        let ws_port = parse_env("WS_PORT", port + 1)?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let cors_origins = env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let worker_count: usize = parse_env("MEDIASOUP_WORKERS", 2)?;
        let rtc_min_port: u16 = parse_env("RTC_MIN_PORT", 40000)?;
        let rtc_max_port: u16 = parse_env("RTC_MAX_PORT", 49999)?;
        let log_level = env::var("MEDIASOUP_LOG_LEVEL")
            .ok()
            .and_then(|v| WorkerLogLevel::from_str(&v).ok())
            .unwrap_or_default();
        let listen_ip: IpAddr = env::var("WEBRTC_LISTEN_IP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "0.0.0.0".parse().unwrap());
        let announced_ip: Option<IpAddr> = env::var("WEBRTC_ANNOUNCED_IP")
            .ok()
            .and_then(|v| v.parse().ok());

        let media = MediaConfig {
            worker_count,
            rtc_min_port,
            rtc_max_port,
            log_level,
            log_tags: Vec::new(),
            codecs: vec![Codec::Opus, Codec::Pcmu, Codec::Pcma],
            announced_ip,
            listen_ip,
        };
        media
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let sip_host = env::var("SIP_HOST").unwrap_or_else(|_| "sip.example.internal".to_string());
        let sip_port: u16 = parse_env("SIP_PORT", 5061)?;
        let sip_ws_url = env::var("SIP_WS_URL")
            .unwrap_or_else(|_| format!("wss://{sip_host}/ws"));
        // SIP_ESL_PASSWORD is accepted for parity with the external peer's
        // event-socket auth but is not consumed by this gateway's
        // SIP-over-WebSocket dialect.
        let _ = env::var("SIP_ESL_PASSWORD");

        let sip = SipGatewayConfig {
            ws_url: sip_ws_url,
            host: sip_host,
            port: sip_port,
            registration_expires_secs: 3600,
        };

        let redis = match env::var("REDIS_HOST") {
            Ok(host) => Some(RedisConfig {
                host,
                port: parse_env("REDIS_PORT", 6379)?,
                password: env::var("REDIS_PASSWORD").ok(),
            }),
            Err(_) => None,
        };

        Ok(Self {
            port,
            ws_port,
            host,
            cors_origins,
            media,
            sip,
            redis,
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, GatewayError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        // No env vars set in this process; from_env should fall back to
        // defaults and validate cleanly.
        env::remove_var("RTC_MIN_PORT");
        env::remove_var("RTC_MAX_PORT");
        env::remove_var("PORT");
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.media.worker_count, 2);
    }

    #[test]
    fn invalid_port_range_surfaces_config_error() {
        env::set_var("RTC_MIN_PORT", "50000");
        env::set_var("RTC_MAX_PORT", "40000");
        let result = GatewayConfig::from_env();
        env::remove_var("RTC_MIN_PORT");
        env::remove_var("RTC_MAX_PORT");
        assert!(result.is_err());
    }
}

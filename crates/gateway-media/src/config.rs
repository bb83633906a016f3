//! Configuration contract for the media worker pool.

use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Worker-internal log verbosity, mirrored from the `MEDIASOUP_LOG_LEVEL`
/// environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogLevel {
    Debug,
    Warn,
    Error,
    None,
}

impl Default for WorkerLogLevel {
    fn default() -> Self {
        WorkerLogLevel::Error
    }
}

impl std::str::FromStr for WorkerLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(WorkerLogLevel::Debug),
            "warn" => Ok(WorkerLogLevel::Warn),
            "error" => Ok(WorkerLogLevel::Error),
            "none" => Ok(WorkerLogLevel::None),
            other => Err(format!("unknown worker log level: {other}")),
        }
    }
}

/// A codec the router is willing to negotiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    Opus,
    Pcmu,
    Pcma,
    Vp8,
    H264,
}

impl Codec {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::Opus => "audio/opus",
            Codec::Pcmu => "audio/PCMU",
            Codec::Pcma => "audio/PCMA",
            Codec::Vp8 => "video/VP8",
            Codec::H264 => "video/H264",
        }
    }

    pub fn is_mandatory(&self) -> bool {
        matches!(self, Codec::Opus | Codec::Pcmu | Codec::Pcma)
    }
}

/// Startup configuration for the worker pool and routers it creates.
///
/// Validated once at construction time; an invalid port range is a fatal
/// startup error (`port-range-invalid`).
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub worker_count: usize,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub log_level: WorkerLogLevel,
    pub log_tags: Vec<String>,
    pub codecs: Vec<Codec>,
    pub announced_ip: Option<IpAddr>,
    pub listen_ip: IpAddr,
}

/// Minimum required span `RTC_MAX_PORT - RTC_MIN_PORT`.
pub const MIN_PORT_RANGE_SPAN: u16 = 100;

impl MediaConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if self.rtc_min_port >= self.rtc_max_port
            || self.rtc_max_port - self.rtc_min_port < MIN_PORT_RANGE_SPAN
        {
            return Err(MediaError::PortRangeInvalid {
                min: self.rtc_min_port,
                max: self.rtc_max_port,
            });
        }
        let has_mandatory = [Codec::Opus, Codec::Pcmu, Codec::Pcma]
            .iter()
            .all(|c| self.codecs.contains(c));
        if !has_mandatory {
            return Err(MediaError::CodecUnsupported {
                codec: "one of OPUS/PCMU/PCMA missing from configured set".into(),
            });
        }
        Ok(())
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            log_level: WorkerLogLevel::default(),
            log_tags: vec!["info".into(), "ice".into(), "dtls".into(), "rtp".into()],
            codecs: vec![Codec::Opus, Codec::Pcmu, Codec::Pcma],
            announced_ip: None,
            listen_ip: "0.0.0.0".parse().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let cfg = MediaConfig {
            rtc_min_port: 50000,
            rtc_max_port: 40000,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MediaError::PortRangeInvalid { .. })
        ));
    }

    #[test]
    fn rejects_narrow_range() {
        let cfg = MediaConfig {
            rtc_min_port: 40000,
            rtc_max_port: 40050,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MediaError::PortRangeInvalid { .. })
        ));
    }

    #[test]
    fn accepts_exactly_100_span() {
        let cfg = MediaConfig {
            rtc_min_port: 40000,
            rtc_max_port: 40100,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_missing_mandatory_codec() {
        let cfg = MediaConfig {
            codecs: vec![Codec::Opus],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MediaError::CodecUnsupported { .. })
        ));
    }
}

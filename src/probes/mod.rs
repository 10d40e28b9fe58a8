use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::vpn::{ConnectOutcome, Region};

pub mod external_ip;
pub mod page;
pub mod redirect;

/// Why an endpoint was not checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    DedicatedIpRequired,
    ConnectionFailed,
    ServerUnavailable,
    Error(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DedicatedIpRequired => write!(f, "Dedicated IP required"),
            SkipReason::ConnectionFailed => write!(f, "VPN connection failed"),
            SkipReason::ServerUnavailable => write!(f, "Server unavailable or unsupported"),
            // Keep the results file one row per line.
            SkipReason::Error(msg) => write!(f, "Error: {}", msg.replace(['\t', '\n', '\r'], " ")),
        }
    }
}

impl SkipReason {
    /// Skip reason for a connect outcome, `None` when connected.
    pub fn from_outcome(outcome: ConnectOutcome) -> Option<Self> {
        match outcome {
            ConnectOutcome::Connected => None,
            ConnectOutcome::DedicatedIpRequired => Some(SkipReason::DedicatedIpRequired),
            ConnectOutcome::Failed => Some(SkipReason::ConnectionFailed),
            ConnectOutcome::Unavailable => Some(SkipReason::ServerUnavailable),
        }
    }
}

/// Result of a geo-block check on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Available,
    Blocked,
    Skipped(SkipReason),
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Available => write!(f, "Available"),
            Verdict::Blocked => write!(f, "Blocked"),
            Verdict::Skipped(reason) => write!(f, "Skipped ({})", reason),
        }
    }
}

impl Verdict {
    pub fn from_blocked(blocked: bool) -> Self {
        if blocked {
            Verdict::Blocked
        } else {
            Verdict::Available
        }
    }
}

/// Streaming services that can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StreamingService {
    Peacock,
    BbcIplayer,
}

impl StreamingService {
    pub fn display_name(&self) -> &'static str {
        match self {
            StreamingService::Peacock => "Peacock",
            StreamingService::BbcIplayer => "BBC iPlayer",
        }
    }

    /// Service part of generated file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            StreamingService::Peacock => "Peacock",
            StreamingService::BbcIplayer => "BBCiPlayer",
        }
    }

    /// Country the service is licensed for.
    pub fn home_region(&self) -> Region {
        match self {
            StreamingService::Peacock => Region::Us,
            StreamingService::BbcIplayer => Region::Uk,
        }
    }

    /// Build the check for this service from configuration.
    pub fn build_check(&self, config: &Config) -> Result<Box<dyn ServiceCheck>> {
        let check: Box<dyn ServiceCheck> = match self {
            StreamingService::Peacock => Box::new(redirect::RedirectCheck::new(
                *self,
                &config.peacock.url,
                &config.peacock.blocked_marker,
                &config.probes,
            )?),
            StreamingService::BbcIplayer => Box::new(page::PageCheck::from_config(
                *self,
                &config.bbc_iplayer,
            )?),
        };
        Ok(check)
    }
}

impl fmt::Display for StreamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Trait for streaming-site checks run through the active tunnel.
#[async_trait::async_trait]
pub trait ServiceCheck: Send + Sync {
    fn service(&self) -> StreamingService;

    /// Fetch the site and return `Available` or `Blocked`.
    async fn check(&self) -> Result<Verdict>;
}

/// Trait for looking up the externally visible address.
#[async_trait::async_trait]
pub trait AddressLookup: Send + Sync {
    async fn external_ip(&self) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_strings() {
        assert_eq!(Verdict::Available.to_string(), "Available");
        assert_eq!(Verdict::Blocked.to_string(), "Blocked");
        assert_eq!(
            Verdict::Skipped(SkipReason::DedicatedIpRequired).to_string(),
            "Skipped (Dedicated IP required)"
        );
        assert_eq!(
            Verdict::Skipped(SkipReason::ConnectionFailed).to_string(),
            "Skipped (VPN connection failed)"
        );
        assert_eq!(
            Verdict::Skipped(SkipReason::ServerUnavailable).to_string(),
            "Skipped (Server unavailable or unsupported)"
        );
    }

    #[test]
    fn test_error_reason_stays_on_one_line() {
        let v = Verdict::Skipped(SkipReason::Error("boom\tbang\nagain".into()));
        assert_eq!(v.to_string(), "Skipped (Error: boom bang again)");
    }

    #[test]
    fn test_skip_reason_from_outcome() {
        assert_eq!(SkipReason::from_outcome(ConnectOutcome::Connected), None);
        assert_eq!(
            SkipReason::from_outcome(ConnectOutcome::Unavailable),
            Some(SkipReason::ServerUnavailable)
        );
    }

    #[test]
    fn test_service_home_regions() {
        assert_eq!(StreamingService::Peacock.home_region(), Region::Us);
        assert_eq!(StreamingService::BbcIplayer.home_region(), Region::Uk);
        assert_eq!(StreamingService::BbcIplayer.file_tag(), "BBCiPlayer");
    }
}

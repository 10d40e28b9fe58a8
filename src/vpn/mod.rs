//! VPN provider abstraction: endpoint enumeration, connect and disconnect
//! through each provider's own CLI tool.

use std::fmt;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::runner::pacing::Pacing;

pub mod cyberghost;
pub mod expressvpn;
pub mod nordvpn;

#[derive(Debug, Error)]
pub enum VpnError {
    #[error("{tool} not found on PATH")]
    ToolNotFound { tool: String },

    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}: {stderr}")]
    CommandFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("server catalogue request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("{provider} cannot connect to a {endpoint_kind} endpoint")]
    ForeignEndpoint {
        provider: &'static str,
        endpoint_kind: &'static str,
    },
}

/// The providers streamcheck knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "nordvpn")]
    NordVpn,
    #[value(name = "expressvpn")]
    ExpressVpn,
    #[value(name = "cyberghost")]
    CyberGhost,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::NordVpn => write!(f, "nordvpn"),
            ProviderKind::ExpressVpn => write!(f, "expressvpn"),
            ProviderKind::CyberGhost => write!(f, "cyberghost"),
        }
    }
}

/// Country whose endpoints are tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[value(name = "us", alias = "usa")]
    Us,
    #[value(name = "uk", alias = "gb")]
    Uk,
}

impl Region {
    /// Upper-case tag used in file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Uk => "UK",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A NordVPN server as listed by the public catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NordServer {
    pub id: String,
    pub name: String,
    pub station: String,
    pub hostname: String,
    pub status: String,
}

impl NordServer {
    /// Hostname without the `.nordvpn.com` suffix, as `nordvpn connect` wants it.
    pub fn short_host(&self) -> &str {
        self.hostname
            .strip_suffix(".nordvpn.com")
            .unwrap_or(&self.hostname)
    }
}

/// An ExpressVPN location row from `expressvpn list all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressLocation {
    pub code: String,
    /// Only the first row of each country carries it.
    pub country: String,
    pub location: String,
}

/// A CyberGhost server instance inside a city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CyberGhostInstance {
    pub country_code: String,
    pub city: String,
    pub instance: String,
}

/// A single VPN endpoint, shaped the way its provider lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Endpoint {
    NordVpn(NordServer),
    ExpressVpn(ExpressLocation),
    CyberGhost(CyberGhostInstance),
}

impl Endpoint {
    /// Short identifier for logs.
    pub fn label(&self) -> &str {
        match self {
            Endpoint::NordVpn(s) => s.short_host(),
            Endpoint::ExpressVpn(l) => &l.code,
            Endpoint::CyberGhost(i) => &i.instance,
        }
    }

    /// Leading columns of this endpoint's results row.
    /// Lines up with [`ProviderMeta::key_headers`].
    pub fn key_columns(&self) -> Vec<String> {
        match self {
            Endpoint::NordVpn(s) => vec![s.short_host().to_string()],
            Endpoint::ExpressVpn(l) => vec![l.location.clone(), l.code.clone()],
            Endpoint::CyberGhost(i) => vec![i.instance.clone()],
        }
    }

    /// Whether this endpoint belongs to `city`, matched the way each
    /// provider's listing filters by city.
    pub fn in_city(&self, city: &str) -> bool {
        let city = city.trim().to_lowercase();
        match self {
            Endpoint::NordVpn(s) => s.name.to_lowercase().contains(&city),
            Endpoint::ExpressVpn(l) => l.location.to_lowercase().contains(&city),
            Endpoint::CyberGhost(i) => i.city.to_lowercase() == city,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Endpoint::NordVpn(_) => ProviderKind::NordVpn,
            Endpoint::ExpressVpn(_) => ProviderKind::ExpressVpn,
            Endpoint::CyberGhost(_) => ProviderKind::CyberGhost,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::NordVpn(s) => write!(f, "{}", s.short_host()),
            Endpoint::ExpressVpn(l) => write!(f, "{} - {}", l.code, l.location),
            Endpoint::CyberGhost(i) => write!(f, "{} in {}", i.instance, i.city),
        }
    }
}

/// How a connect attempt ended, judged from the CLI's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectOutcome {
    Connected,
    DedicatedIpRequired,
    Failed,
    Unavailable,
}

/// Classify the stdout of a provider's connect command.
///
/// Phrase matches win over the exit status; a non-zero exit with no
/// recognised phrase counts as a failed connection.
pub fn classify_connect_output(stdout: &str, success: bool) -> ConnectOutcome {
    let low = stdout.to_lowercase();
    if low.contains("dedicated ip") {
        ConnectOutcome::DedicatedIpRequired
    } else if low.contains("connection has failed") {
        ConnectOutcome::Failed
    } else if low.contains("the specified server is not available") {
        ConnectOutcome::Unavailable
    } else if !success {
        ConnectOutcome::Failed
    } else {
        ConnectOutcome::Connected
    }
}

/// Metadata describing a VPN provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMeta {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    /// Provider part of generated file names, e.g. `NordVPN_UK_20250301.txt`.
    pub file_tag: &'static str,
    /// Executable the provider is driven through.
    pub cli: &'static str,
    pub install_hint: &'static str,
    /// Header cells for [`Endpoint::key_columns`].
    pub key_headers: &'static [&'static str],
    pub pacing: Pacing,
}

/// Trait for all VPN providers (NordVPN, ExpressVPN, CyberGhost).
#[async_trait::async_trait]
pub trait VpnProvider: Send + Sync {
    /// Static metadata about the provider.
    fn meta(&self) -> ProviderMeta;

    /// Check if the provider's CLI is installed.
    fn is_available(&self) -> bool {
        std::process::Command::new(self.meta().cli)
            .arg("--help")
            .output()
            .is_ok()
    }

    /// Enumerate endpoints in `region`, optionally narrowed to one city.
    async fn list_endpoints(&self, region: Region, city: Option<&str>) -> Result<Vec<Endpoint>>;

    async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectOutcome>;

    async fn disconnect(&self) -> Result<()>;
}

/// Captured output of a provider CLI invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into [`VpnError::CommandFailed`].
    pub fn require_success(self, tool: &str) -> Result<Self, VpnError> {
        if self.success {
            Ok(self)
        } else {
            Err(VpnError::CommandFailed {
                tool: tool.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Run `program args...` to completion, capturing both streams.
pub async fn run_tool(program: &str, args: &[&str]) -> Result<ToolOutput, VpnError> {
    tracing::debug!(program, ?args, "running provider command");

    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VpnError::ToolNotFound {
                    tool: program.to_string(),
                }
            } else {
                VpnError::Launch {
                    tool: program.to_string(),
                    source: e,
                }
            }
        })?;

    Ok(ToolOutput {
        success: output.status.success(),
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Build the provider for `kind` from configuration.
pub fn provider_for(kind: ProviderKind, config: &Config) -> Result<Box<dyn VpnProvider>> {
    let provider: Box<dyn VpnProvider> = match kind {
        ProviderKind::NordVpn => Box::new(nordvpn::NordVpnProvider::new(
            &config.nordvpn,
            &config.probes,
        )?),
        ProviderKind::ExpressVpn => Box::new(expressvpn::ExpressVpnProvider),
        ProviderKind::CyberGhost => {
            Box::new(cyberghost::CyberGhostProvider::new(&config.cyberghost))
        }
    };
    Ok(provider)
}

/// Every supported provider, in display order.
pub fn get_all_providers(config: &Config) -> Result<Vec<Box<dyn VpnProvider>>> {
    [
        ProviderKind::NordVpn,
        ProviderKind::ExpressVpn,
        ProviderKind::CyberGhost,
    ]
    .into_iter()
    .map(|kind| provider_for(kind, config))
    .collect()
}

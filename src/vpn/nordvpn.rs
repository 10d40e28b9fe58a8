//! NordVPN: public server catalogue + `nordvpn` CLI.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{
    classify_connect_output, run_tool, ConnectOutcome, Endpoint, NordServer, ProviderKind,
    ProviderMeta, Region, VpnError, VpnProvider,
};
use crate::config::{NordVpnConfig, ProbeConfig};
use crate::runner::pacing::Pacing;

const CLI: &str = "nordvpn";

#[derive(Debug, Deserialize)]
struct Catalogue {
    servers: Vec<CatalogueServer>,
}

#[derive(Debug, Deserialize)]
struct CatalogueServer {
    id: u64,
    name: String,
    #[serde(default)]
    station: String,
    hostname: String,
    #[serde(default)]
    status: String,
}

fn hostname_prefix(region: Region) -> &'static str {
    match region {
        Region::Us => "us",
        Region::Uk => "uk",
    }
}

/// Decode the `/v2/servers` response and keep the servers of `region`,
/// optionally only those whose display name mentions `city`.
pub fn parse_catalogue(body: &str, region: Region, city: Option<&str>) -> Result<Vec<Endpoint>> {
    let catalogue: Catalogue =
        serde_json::from_str(body).context("failed to decode NordVPN server catalogue")?;
    let prefix = hostname_prefix(region);
    let city = city.map(str::to_lowercase);

    let servers = catalogue
        .servers
        .into_iter()
        .filter(|s| s.hostname.starts_with(prefix))
        .filter(|s| {
            city.as_deref()
                .map_or(true, |c| s.name.to_lowercase().contains(c))
        })
        .map(|s| {
            Endpoint::NordVpn(NordServer {
                id: s.id.to_string(),
                name: s.name,
                station: s.station,
                hostname: s.hostname,
                status: s.status,
            })
        })
        .collect();

    Ok(servers)
}

pub struct NordVpnProvider {
    client: Client,
    api_url: String,
}

impl NordVpnProvider {
    pub fn new(cfg: &NordVpnConfig, probes: &ProbeConfig) -> Result<Self> {
        // The full catalogue is several megabytes.
        let client = Client::builder()
            .timeout(Duration::from_secs(probes.http_timeout_secs.max(60)))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: cfg.api_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl VpnProvider for NordVpnProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            kind: ProviderKind::NordVpn,
            display_name: "NordVPN",
            file_tag: "NordVPN",
            cli: CLI,
            install_hint: "Install the NordVPN Linux client and run 'nordvpn login'",
            key_headers: &["Server"],
            pacing: Pacing::new(0, 5, 0, 2),
        }
    }

    async fn list_endpoints(&self, region: Region, city: Option<&str>) -> Result<Vec<Endpoint>> {
        info!(url = %self.api_url, %region, "fetching NordVPN server catalogue");
        let body = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(VpnError::Api)?
            .text()
            .await
            .map_err(VpnError::Api)?;

        parse_catalogue(&body, region, city)
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectOutcome> {
        let Endpoint::NordVpn(server) = endpoint else {
            return Err(VpnError::ForeignEndpoint {
                provider: "NordVPN",
                endpoint_kind: "non-NordVPN",
            }
            .into());
        };

        info!(server = server.short_host(), "connecting");
        let out = run_tool(CLI, &["connect", server.short_host()]).await?;
        let stdout = out.stdout.trim();
        if !stdout.is_empty() {
            info!(server = server.short_host(), output = %stdout, "nordvpn connect");
        }
        Ok(classify_connect_output(stdout, out.success))
    }

    async fn disconnect(&self) -> Result<()> {
        let out = run_tool(CLI, &["disconnect"]).await?.require_success(CLI)?;
        info!(output = %out.stdout.trim(), "disconnected");
        Ok(())
    }
}

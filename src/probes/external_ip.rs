use super::AddressLookup;
use crate::config::ProbeConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Build a probe client that never reuses a connection.
///
/// A pooled keep-alive socket opened before a VPN switch would still
/// report the old exit address.
pub(crate) fn fresh_connection_client(cfg: &ProbeConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .user_agent(cfg.user_agent.clone())
        .pool_max_idle_per_host(0)
}

/// External address lookup against a plain-text echo service.
pub struct IpEchoLookup {
    client: Client,
    url: String,
}

impl IpEchoLookup {
    pub fn new(cfg: &ProbeConfig) -> Result<Self> {
        let client = fresh_connection_client(cfg)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: cfg.ip_echo_url.clone(),
        })
    }
}

/// First non-empty line of an echo response, trimmed.
pub fn parse_echo_body(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl AddressLookup for IpEchoLookup {
    async fn external_ip(&self) -> Result<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("address lookup via {} failed", self.url))?
            .text()
            .await?;

        parse_echo_body(&body)
            .with_context(|| format!("empty response from {}", self.url))
    }
}

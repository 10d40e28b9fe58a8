use super::{ServiceCheck, StreamingService, Verdict};
use crate::config::ProbeConfig;
use anyhow::{Context, Result};
use reqwest::{redirect::Policy, Client};
use tracing::info;

/// Follows the redirect chain of a landing page and classifies by the final URL.
pub struct RedirectCheck {
    service: StreamingService,
    client: Client,
    url: String,
    blocked_marker: String,
}

impl RedirectCheck {
    pub fn new(
        service: StreamingService,
        url: &str,
        blocked_marker: &str,
        probes: &ProbeConfig,
    ) -> Result<Self> {
        let client = super::external_ip::fresh_connection_client(probes)
            .redirect(Policy::limited(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            service,
            client,
            url: url.to_string(),
            blocked_marker: blocked_marker.to_string(),
        })
    }
}

/// Blocked iff the effective URL contains `marker`.
pub fn classify_effective_url(effective_url: &str, marker: &str) -> Verdict {
    Verdict::from_blocked(effective_url.contains(marker))
}

#[async_trait::async_trait]
impl ServiceCheck for RedirectCheck {
    fn service(&self) -> StreamingService {
        self.service
    }

    async fn check(&self) -> Result<Verdict> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?;

        // Status is irrelevant; the geo page answers 200 as well.
        let effective = resp.url().as_str();
        let verdict = classify_effective_url(effective, &self.blocked_marker);
        info!(service = %self.service, %effective, status = resp.status().as_u16(), %verdict, "redirect check");
        Ok(verdict)
    }
}

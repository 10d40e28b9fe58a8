//! The campaign loop: one provider, one service, every endpoint in turn.

pub mod pacing;

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::probes::{AddressLookup, ServiceCheck, SkipReason, Verdict};
use crate::report::{server_list, ResultRow, ResultsFile, NO_ADDRESS};
use crate::vpn::{Endpoint, Region, VpnProvider};
use pacing::{pause, Pacing};

/// Everything a campaign needs besides the provider and probes.
#[derive(Debug, Clone)]
pub struct CampaignPlan {
    pub region: Region,
    pub city: Option<String>,
    pub server_list_path: PathBuf,
    pub results_path: PathBuf,
    /// Reuse a saved server list instead of asking the provider.
    pub from_list: Option<PathBuf>,
    pub limit: Option<usize>,
    pub pacing: Pacing,
    /// Print each results row to stdout as it is written.
    pub echo_rows: bool,
}

/// Outcome counts of a finished campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub run_id: Uuid,
    pub provider: String,
    pub service: String,
    pub region: Region,
    pub endpoints: usize,
    pub available: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub server_list_path: PathBuf,
    pub results_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CampaignSummary {
    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Available => self.available += 1,
            Verdict::Blocked => self.blocked += 1,
            Verdict::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Endpoints for the plan: a saved list when given, otherwise the provider's.
pub async fn collect_endpoints(
    provider: &dyn VpnProvider,
    plan: &CampaignPlan,
) -> Result<Vec<Endpoint>> {
    let meta = provider.meta();
    let mut endpoints = match &plan.from_list {
        Some(path) => {
            info!(path = %path.display(), "loading saved server list");
            let mut saved = server_list::read(path, meta.kind, plan.region)?;
            if let Some(city) = plan.city.as_deref() {
                saved.retain(|e| e.in_city(city));
            }
            saved
        }
        None => {
            provider
                .list_endpoints(plan.region, plan.city.as_deref())
                .await?
        }
    };

    if let Some(limit) = plan.limit {
        endpoints.truncate(limit);
    }
    if endpoints.is_empty() {
        bail!(
            "no {} endpoints found for region {}{}",
            meta.display_name,
            plan.region,
            plan.city
                .as_deref()
                .map(|c| format!(" / {}", c))
                .unwrap_or_default()
        );
    }
    Ok(endpoints)
}

/// Run a whole campaign: list, persist, then test every endpoint in order.
///
/// Per-endpoint failures end up in the results file; only setup failures
/// (no endpoints, unwritable files) return an error.
pub async fn run_campaign(
    provider: &dyn VpnProvider,
    lookup: &dyn AddressLookup,
    check: &dyn ServiceCheck,
    plan: &CampaignPlan,
) -> Result<CampaignSummary> {
    let run_id = Uuid::new_v4();
    let meta = provider.meta();
    let service = check.service();
    let started_at = Utc::now();

    let endpoints = collect_endpoints(provider, plan).await?;
    server_list::write(&plan.server_list_path, &endpoints)?;

    let mut results = ResultsFile::create(&plan.results_path, meta.key_headers)?;

    info!(
        %run_id,
        provider = %meta.kind,
        %service,
        endpoints = endpoints.len(),
        est_secs = plan.pacing.per_endpoint().as_secs() * endpoints.len() as u64,
        "starting campaign"
    );

    let mut summary = CampaignSummary {
        run_id,
        provider: meta.display_name.to_string(),
        service: service.display_name().to_string(),
        region: plan.region,
        endpoints: endpoints.len(),
        available: 0,
        blocked: 0,
        skipped: 0,
        server_list_path: plan.server_list_path.clone(),
        results_path: plan.results_path.clone(),
        started_at,
        finished_at: started_at,
    };

    for (idx, endpoint) in endpoints.iter().enumerate() {
        info!(%run_id, endpoint = %endpoint, n = idx + 1, of = endpoints.len(), "testing endpoint");

        let row = test_endpoint(provider, lookup, check, endpoint, &plan.pacing).await;
        info!(%run_id, endpoint = %endpoint, external_ip = %row.external_ip, verdict = %row.verdict, "endpoint done");
        if plan.echo_rows {
            println!("{}", row.to_line());
        }
        results.append(&row)?;
        summary.record(&row.verdict);

        if idx + 1 < endpoints.len() {
            pause(plan.pacing.between_endpoints_secs, "between endpoints").await;
        }
    }

    summary.finished_at = Utc::now();
    info!(
        %run_id,
        available = summary.available,
        blocked = summary.blocked,
        skipped = summary.skipped,
        results = %results.path().display(),
        "campaign complete"
    );
    Ok(summary)
}

/// Test one endpoint. Always yields a row and always disconnects afterwards.
pub async fn test_endpoint(
    provider: &dyn VpnProvider,
    lookup: &dyn AddressLookup,
    check: &dyn ServiceCheck,
    endpoint: &Endpoint,
    pacing: &Pacing,
) -> ResultRow {
    let (external_ip, verdict) = match connect_and_check(provider, lookup, check, endpoint, pacing).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(endpoint = %endpoint, error = %e, "connect failed");
            (
                NO_ADDRESS.to_string(),
                Verdict::Skipped(SkipReason::Error(format!("{:#}", e))),
            )
        }
    };

    if let Err(e) = provider.disconnect().await {
        warn!(endpoint = %endpoint, error = %e, "disconnect failed");
    }
    pause(pacing.disconnect_settle_secs, "disconnect settle").await;

    ResultRow {
        key: endpoint.key_columns(),
        external_ip,
        verdict,
    }
}

async fn connect_and_check(
    provider: &dyn VpnProvider,
    lookup: &dyn AddressLookup,
    check: &dyn ServiceCheck,
    endpoint: &Endpoint,
    pacing: &Pacing,
) -> Result<(String, Verdict)> {
    let outcome = provider.connect(endpoint).await?;
    pause(pacing.connect_settle_secs, "connect settle").await;

    if let Some(reason) = SkipReason::from_outcome(outcome) {
        info!(endpoint = %endpoint, ?outcome, "skipping endpoint");
        return Ok((NO_ADDRESS.to_string(), Verdict::Skipped(reason)));
    }
    pause(pacing.post_connect_secs, "post-connect").await;

    let external_ip = match lookup.external_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "external address lookup failed");
            NO_ADDRESS.to_string()
        }
    };
    info!(endpoint = %endpoint, %external_ip, "external address");

    let verdict = match check.check().await {
        Ok(v) => v,
        Err(e) => {
            error!(endpoint = %endpoint, error = %e, "service check failed");
            Verdict::Skipped(SkipReason::Error(format!("{:#}", e)))
        }
    };
    Ok((external_ip, verdict))
}

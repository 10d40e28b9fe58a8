//! Campaign loop tests against scripted providers and probes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use streamcheck::probes::{AddressLookup, ServiceCheck, SkipReason, StreamingService, Verdict};
use streamcheck::report::server_list;
use streamcheck::runner::pacing::Pacing;
use streamcheck::runner::{collect_endpoints, run_campaign, CampaignPlan};
use streamcheck::vpn::{
    ConnectOutcome, Endpoint, NordServer, ProviderKind, ProviderMeta, Region, VpnProvider,
};
use tempfile::TempDir;

fn nord(n: u32) -> Endpoint {
    Endpoint::NordVpn(NordServer {
        id: n.to_string(),
        name: format!("United Kingdom #{}", n),
        station: format!("185.16.206.{}", n),
        hostname: format!("uk{}.nordvpn.com", n),
        status: "online".into(),
    })
}

/// Scripted provider: per-host connect outcomes, a call log.
struct FakeProvider {
    endpoints: Vec<Endpoint>,
    outcomes: HashMap<String, Result<ConnectOutcome, String>>,
    disconnect_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            outcomes: HashMap::new(),
            disconnect_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_outcome(mut self, label: &str, outcome: Result<ConnectOutcome, String>) -> Self {
        self.outcomes.insert(label.to_string(), outcome);
        self
    }

    fn failing_disconnect(mut self, msg: &str) -> Self {
        self.disconnect_error = Some(msg.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VpnProvider for FakeProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            kind: ProviderKind::NordVpn,
            display_name: "NordVPN",
            file_tag: "NordVPN",
            cli: "nordvpn",
            install_hint: "",
            key_headers: &["Server"],
            pacing: Pacing::immediate(),
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn list_endpoints(&self, _region: Region, _city: Option<&str>) -> Result<Vec<Endpoint>> {
        self.calls.lock().unwrap().push("list".into());
        Ok(self.endpoints.clone())
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("connect {}", endpoint.label()));
        match self.outcomes.get(endpoint.label()) {
            Some(Ok(outcome)) => Ok(*outcome),
            Some(Err(msg)) => Err(anyhow!(msg.clone())),
            None => Ok(ConnectOutcome::Connected),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.calls.lock().unwrap().push("disconnect".into());
        match &self.disconnect_error {
            Some(msg) => Err(anyhow!(msg.clone())),
            None => Ok(()),
        }
    }
}

struct FakeLookup {
    address: Option<&'static str>,
}

#[async_trait::async_trait]
impl AddressLookup for FakeLookup {
    async fn external_ip(&self) -> Result<String> {
        self.address
            .map(str::to_string)
            .ok_or_else(|| anyhow!("echo service unreachable"))
    }
}

/// Returns queued verdicts in order, then `Available`.
struct FakeCheck {
    queue: Mutex<VecDeque<Result<Verdict, String>>>,
    calls: Mutex<usize>,
}

impl FakeCheck {
    fn new(queue: Vec<Result<Verdict, String>>) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ServiceCheck for FakeCheck {
    fn service(&self) -> StreamingService {
        StreamingService::BbcIplayer
    }

    async fn check(&self) -> Result<Verdict> {
        *self.calls.lock().unwrap() += 1;
        match self.queue.lock().unwrap().pop_front() {
            Some(Ok(v)) => Ok(v),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(Verdict::Available),
        }
    }
}

fn plan(dir: &TempDir) -> CampaignPlan {
    CampaignPlan {
        region: Region::Uk,
        city: None,
        server_list_path: dir.path().join("NordVPN_UK_20250301.txt"),
        results_path: dir.path().join("BBCiPlayer_Results_NordVPN_UK_20250301.txt"),
        from_list: None,
        limit: None,
        pacing: Pacing::immediate(),
        echo_rows: false,
    }
}

fn result_lines(plan: &CampaignPlan) -> Vec<String> {
    std::fs::read_to_string(&plan.results_path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_campaign_writes_one_row_per_endpoint() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1), nord(2), nord(3)]);
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![Ok(Verdict::Available), Ok(Verdict::Blocked)]);

    let summary = run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(
        result_lines(&plan),
        vec![
            "Server\tExternal IP\tResult",
            "uk1\t203.0.113.9\tAvailable",
            "uk2\t203.0.113.9\tBlocked",
            "uk3\t203.0.113.9\tAvailable",
        ]
    );
    assert_eq!(summary.endpoints, 3);
    assert_eq!(summary.available, 2);
    assert_eq!(summary.blocked, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.service, "BBC iPlayer");
    assert!(summary.finished_at >= summary.started_at);

    // The server list is saved before testing starts.
    let saved = server_list::read(&plan.server_list_path, ProviderKind::NordVpn, Region::Uk).unwrap();
    assert_eq!(saved, vec![nord(1), nord(2), nord(3)]);
}

#[tokio::test]
async fn test_every_connect_is_followed_by_disconnect() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1), nord(2)])
        .with_outcome("uk1", Ok(ConnectOutcome::DedicatedIpRequired));
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![]);

    run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(
        provider.calls(),
        vec!["list", "connect uk1", "disconnect", "connect uk2", "disconnect"]
    );
}

#[tokio::test]
async fn test_disconnect_failure_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider =
        FakeProvider::new(vec![nord(1), nord(2)]).failing_disconnect("nordvpn daemon not running");
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![Ok(Verdict::Blocked), Ok(Verdict::Available)]);

    let summary = run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(
        provider.calls(),
        vec!["list", "connect uk1", "disconnect", "connect uk2", "disconnect"]
    );
    assert_eq!(
        result_lines(&plan)[1..],
        ["uk1\t203.0.113.9\tBlocked", "uk2\t203.0.113.9\tAvailable"]
    );
    assert_eq!(summary.endpoints, 2);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_connect_outcomes_become_skips() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1), nord(2), nord(3), nord(4)])
        .with_outcome("uk1", Ok(ConnectOutcome::DedicatedIpRequired))
        .with_outcome("uk2", Ok(ConnectOutcome::Failed))
        .with_outcome("uk3", Ok(ConnectOutcome::Unavailable));
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![Ok(Verdict::Blocked)]);

    let summary = run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(
        result_lines(&plan)[1..],
        [
            "uk1\tn/a\tSkipped (Dedicated IP required)",
            "uk2\tn/a\tSkipped (VPN connection failed)",
            "uk3\tn/a\tSkipped (Server unavailable or unsupported)",
            "uk4\t203.0.113.9\tBlocked",
        ]
    );
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.blocked, 1);
    // Skipped endpoints are never checked.
    assert_eq!(check.calls(), 1);
}

#[tokio::test]
async fn test_connect_error_is_recorded_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1), nord(2)])
        .with_outcome("uk1", Err("nordvpn not logged in".into()));
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![]);

    run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    let lines = result_lines(&plan);
    assert_eq!(lines[1], "uk1\tn/a\tSkipped (Error: nordvpn not logged in)");
    assert_eq!(lines[2], "uk2\t203.0.113.9\tAvailable");
    assert_eq!(provider.calls().iter().filter(|c| *c == "disconnect").count(), 2);
}

#[tokio::test]
async fn test_check_error_keeps_address() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1)]);
    let lookup = FakeLookup {
        address: Some("198.51.100.4"),
    };
    let check = FakeCheck::new(vec![Err("browser crashed".into())]);

    let summary = run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(
        result_lines(&plan)[1],
        "uk1\t198.51.100.4\tSkipped (Error: browser crashed)"
    );
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_lookup_failure_records_placeholder_and_still_checks() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![nord(1)]);
    let lookup = FakeLookup { address: None };
    let check = FakeCheck::new(vec![Ok(Verdict::Blocked)]);

    run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(result_lines(&plan)[1], "uk1\tn/a\tBlocked");
    assert_eq!(check.calls(), 1);
}

#[tokio::test]
async fn test_limit_truncates_endpoints() {
    let dir = TempDir::new().unwrap();
    let mut plan = plan(&dir);
    plan.limit = Some(2);
    let provider = FakeProvider::new(vec![nord(1), nord(2), nord(3)]);

    let endpoints = collect_endpoints(&provider, &plan).await.unwrap();
    assert_eq!(endpoints, vec![nord(1), nord(2)]);
}

#[tokio::test]
async fn test_saved_list_bypasses_provider_listing() {
    let dir = TempDir::new().unwrap();
    let saved = dir.path().join("saved.txt");
    server_list::write(&saved, &[nord(7), nord(8)]).unwrap();

    let mut plan = plan(&dir);
    plan.from_list = Some(saved);
    let provider = FakeProvider::new(vec![nord(1)]);
    let lookup = FakeLookup {
        address: Some("203.0.113.9"),
    };
    let check = FakeCheck::new(vec![]);

    let summary = run_campaign(&provider, &lookup, &check, &plan).await.unwrap();

    assert_eq!(summary.endpoints, 2);
    assert!(!provider.calls().contains(&"list".to_string()));
    let lines = result_lines(&plan);
    assert!(lines[1].starts_with("uk7\t"));
    assert!(lines[2].starts_with("uk8\t"));
}

#[tokio::test]
async fn test_saved_list_honours_city() {
    let dir = TempDir::new().unwrap();
    let saved = dir.path().join("saved.txt");
    std::fs::write(
        &saved,
        "1\tUnited Kingdom London #1\t192.0.2.1\tuk1.nordvpn.com\tonline\n\
         2\tUnited Kingdom Manchester #2\t192.0.2.2\tuk2.nordvpn.com\tonline\n",
    )
    .unwrap();

    let mut plan = plan(&dir);
    plan.from_list = Some(saved);
    plan.city = Some("manchester".into());
    let provider = FakeProvider::new(vec![]);

    let endpoints = collect_endpoints(&provider, &plan).await.unwrap();
    let labels: Vec<_> = endpoints.iter().map(|e| e.label().to_string()).collect();
    assert_eq!(labels, vec!["uk2"]);
}

#[tokio::test]
async fn test_no_endpoints_is_an_error() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    let provider = FakeProvider::new(vec![]);
    let lookup = FakeLookup { address: None };
    let check = FakeCheck::new(vec![]);

    let err = run_campaign(&provider, &lookup, &check, &plan)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no NordVPN endpoints"));
    assert!(!plan.results_path.exists());
}

#[tokio::test]
async fn test_skip_reason_display_sanitized() {
    let verdict = Verdict::Skipped(SkipReason::Error("line one\nline\ttwo".into()));
    assert_eq!(verdict.to_string(), "Skipped (Error: line one line two)");
}

//! Page-source check through a headless Chromium-family browser.
//!
//! The geo-block notice on some sites is rendered client-side, so a plain
//! HTTP fetch never sees it.

use super::{ServiceCheck, StreamingService, Verdict};
use crate::config::IplayerConfig;
use anyhow::{anyhow, Context, Result};
use std::process::Command;
use std::time::Duration;
use tracing::info;

/// Browsers tried, in order, when none is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

pub struct PageCheck {
    service: StreamingService,
    browser: String,
    url: String,
    blocked_phrase: String,
    page_load: Duration,
}

impl PageCheck {
    pub fn new(
        service: StreamingService,
        browser: String,
        url: &str,
        blocked_phrase: &str,
        page_load: Duration,
    ) -> Self {
        Self {
            service,
            browser,
            url: url.to_string(),
            blocked_phrase: blocked_phrase.to_string(),
            page_load,
        }
    }

    pub fn from_config(service: StreamingService, cfg: &IplayerConfig) -> Result<Self> {
        let browser = match &cfg.browser {
            Some(b) => b.clone(),
            None => detect_browser().ok_or_else(|| {
                anyhow!(
                    "no headless browser found (tried {}); set bbc_iplayer.browser",
                    BROWSER_CANDIDATES.join(", ")
                )
            })?,
        };
        Ok(Self::new(
            service,
            browser,
            &cfg.url,
            &cfg.blocked_phrase,
            Duration::from_secs(cfg.page_load_secs),
        ))
    }

    fn browser_args(&self) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            format!("--virtual-time-budget={}", self.page_load.as_millis()),
            "--dump-dom".to_string(),
            self.url.clone(),
        ]
    }
}

/// First candidate browser that answers `--version`.
pub fn detect_browser() -> Option<String> {
    BROWSER_CANDIDATES
        .iter()
        .find(|b| {
            Command::new(b)
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
        .map(|b| b.to_string())
}

/// Whether `source` contains `phrase`, treating curly and straight
/// apostrophes as equal.
pub fn contains_phrase(source: &str, phrase: &str) -> bool {
    let normalize = |s: &str| s.replace(['\u{2019}', '\u{2018}'], "'").replace("&#x27;", "'").replace("&#39;", "'");
    normalize(source).contains(&normalize(phrase))
}

#[async_trait::async_trait]
impl ServiceCheck for PageCheck {
    fn service(&self) -> StreamingService {
        self.service
    }

    async fn check(&self) -> Result<Verdict> {
        let output = tokio::process::Command::new(&self.browser)
            .args(self.browser_args())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to launch '{}'", self.browser))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.browser,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let source = String::from_utf8_lossy(&output.stdout);
        let verdict = Verdict::from_blocked(contains_phrase(&source, &self.blocked_phrase));
        info!(service = %self.service, bytes = source.len(), %verdict, "page check");
        Ok(verdict)
    }
}

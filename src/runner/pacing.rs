//! Fixed sleeps that let a VPN tunnel settle between steps.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sleep lengths, in whole seconds, around each endpoint test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// After every connect attempt, whatever its outcome.
    pub connect_settle_secs: u64,
    /// After a successful connect, before the address lookup.
    pub post_connect_secs: u64,
    /// After every disconnect.
    pub disconnect_settle_secs: u64,
    /// Between two endpoints.
    pub between_endpoints_secs: u64,
}

impl Pacing {
    pub const fn new(
        connect_settle_secs: u64,
        post_connect_secs: u64,
        disconnect_settle_secs: u64,
        between_endpoints_secs: u64,
    ) -> Self {
        Self {
            connect_settle_secs,
            post_connect_secs,
            disconnect_settle_secs,
            between_endpoints_secs,
        }
    }

    /// No sleeps at all. Used by tests and dry runs.
    pub const fn immediate() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn with_overrides(self, overrides: &PacingOverrides) -> Self {
        Self {
            connect_settle_secs: overrides
                .connect_settle_secs
                .unwrap_or(self.connect_settle_secs),
            post_connect_secs: overrides.post_connect_secs.unwrap_or(self.post_connect_secs),
            disconnect_settle_secs: overrides
                .disconnect_settle_secs
                .unwrap_or(self.disconnect_settle_secs),
            between_endpoints_secs: overrides
                .between_endpoints_secs
                .unwrap_or(self.between_endpoints_secs),
        }
    }

    /// Worst-case sleep time spent on one endpoint.
    pub fn per_endpoint(&self) -> Duration {
        Duration::from_secs(
            self.connect_settle_secs
                + self.post_connect_secs
                + self.disconnect_settle_secs
                + self.between_endpoints_secs,
        )
    }
}

/// `[pacing]` config section. Unset fields keep the provider's default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingOverrides {
    pub connect_settle_secs: Option<u64>,
    pub post_connect_secs: Option<u64>,
    pub disconnect_settle_secs: Option<u64>,
    pub between_endpoints_secs: Option<u64>,
}

/// Sleep for `secs` seconds; zero returns immediately.
pub async fn pause(secs: u64, reason: &str) {
    if secs == 0 {
        return;
    }
    debug!(secs, reason, "waiting");
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

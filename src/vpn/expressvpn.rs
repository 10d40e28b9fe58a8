//! ExpressVPN: `expressvpn list all` + connect by location name.

use anyhow::Result;
use tracing::{debug, info};

use super::{
    classify_connect_output, run_tool, ConnectOutcome, Endpoint, ExpressLocation, ProviderKind,
    ProviderMeta, Region, VpnError, VpnProvider,
};
use crate::runner::pacing::Pacing;

const CLI: &str = "expressvpn";

fn location_prefix(region: Region) -> &'static str {
    match region {
        Region::Us => "USA -",
        Region::Uk => "UK -",
    }
}

/// Split a line on runs of two or more whitespace characters.
///
/// Single spaces stay inside a column, so `UK - East London` is one cell.
/// A trailing run of padding leaves an empty last cell, which is how a
/// blank RECOMMENDED column shows up.
pub fn split_columns(line: &str) -> Vec<&str> {
    let line = line.trim_start();
    let mut columns = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !c.is_whitespace() {
            continue;
        }
        let mut run = 1;
        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            run += 1;
            end = next_idx + next.len_utf8();
            chars.next();
        }
        if run >= 2 {
            columns.push(&line[start..idx]);
            start = end;
        }
    }
    columns.push(&line[start..]);
    columns
}

/// Parse `expressvpn list all` output, keeping locations of `region`.
///
/// ```text
/// ukto  United Kingdom (GB)         UK - Tottenham                 Y
/// ukel                              UK - East London               Y
/// ```
///
/// Four columns are code, country, location, recommended; three columns
/// omit the country. Anything else (headers, separators) is skipped.
pub fn parse_server_list(output: &str, region: Region, city: Option<&str>) -> Vec<Endpoint> {
    let prefix = location_prefix(region);
    let city = city.map(str::to_lowercase);

    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (code, country, location) = match split_columns(line).as_slice() {
                [code, country, location, _] => (*code, *country, *location),
                [code, location, _] => (*code, "", *location),
                _ => {
                    debug!(line, "skipping unrecognised expressvpn row");
                    return None;
                }
            };
            let location = location.trim();
            if !location.starts_with(prefix) {
                return None;
            }
            if let Some(c) = city.as_deref() {
                if !location.to_lowercase().contains(c) {
                    return None;
                }
            }
            Some(Endpoint::ExpressVpn(ExpressLocation {
                code: code.trim().to_string(),
                country: country.trim().to_string(),
                location: location.to_string(),
            }))
        })
        .collect()
}

pub struct ExpressVpnProvider;

#[async_trait::async_trait]
impl VpnProvider for ExpressVpnProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            kind: ProviderKind::ExpressVpn,
            display_name: "ExpressVPN",
            file_tag: "ExpressVPN",
            cli: CLI,
            install_hint: "Install the ExpressVPN Linux app and run 'expressvpn activate'",
            key_headers: &["Location", "Server Code"],
            pacing: Pacing::new(8, 5, 3, 0),
        }
    }

    async fn list_endpoints(&self, region: Region, city: Option<&str>) -> Result<Vec<Endpoint>> {
        info!(%region, "listing ExpressVPN locations");
        let out = run_tool(CLI, &["list", "all"]).await?.require_success(CLI)?;
        Ok(parse_server_list(&out.stdout, region, city))
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectOutcome> {
        let Endpoint::ExpressVpn(loc) = endpoint else {
            return Err(VpnError::ForeignEndpoint {
                provider: "ExpressVPN",
                endpoint_kind: "non-ExpressVPN",
            }
            .into());
        };

        info!(code = %loc.code, location = %loc.location, "connecting");
        let out = run_tool(CLI, &["connect", &loc.location]).await?;
        Ok(classify_connect_output(&out.stdout, out.success))
    }

    async fn disconnect(&self) -> Result<()> {
        run_tool(CLI, &["disconnect"]).await?.require_success(CLI)?;
        info!("disconnected");
        Ok(())
    }
}

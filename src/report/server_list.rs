//! Server-list files, in the layout each provider's endpoints were
//! originally saved in:
//!
//! * NordVPN: `id\tname\tstation\thostname\tstatus`
//! * ExpressVPN: `code\tcountry\tlocation`
//! * CyberGhost: `City:` followed by indented instance names

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::vpn::cyberghost::country_code;
use crate::vpn::{
    CyberGhostInstance, Endpoint, ExpressLocation, NordServer, ProviderKind, Region,
};

/// Render endpoints in their provider's server-list layout.
pub fn render(endpoints: &[Endpoint]) -> String {
    let mut out = String::new();
    let mut current_city: Option<&str> = None;

    for endpoint in endpoints {
        match endpoint {
            Endpoint::NordVpn(s) => {
                out.push_str(&format!(
                    "{}\t{}\t{}\t{}\t{}\n",
                    s.id, s.name, s.station, s.hostname, s.status
                ));
            }
            Endpoint::ExpressVpn(l) => {
                out.push_str(&format!("{}\t{}\t{}\n", l.code, l.country, l.location));
            }
            Endpoint::CyberGhost(i) => {
                if current_city != Some(i.city.as_str()) {
                    out.push_str(&format!("{}:\n", i.city));
                    current_city = Some(i.city.as_str());
                }
                out.push_str(&format!("  {}\n", i.instance));
            }
        }
    }
    out
}

/// Parse a server-list file written by [`render`] (or by hand).
///
/// Malformed rows are skipped with a warning; blank lines are ignored.
pub fn parse(kind: ProviderKind, region: Region, text: &str) -> Vec<Endpoint> {
    match kind {
        ProviderKind::NordVpn => parse_nordvpn(text),
        ProviderKind::ExpressVpn => parse_expressvpn(text),
        ProviderKind::CyberGhost => parse_cyberghost(text, country_code(region)),
    }
}

fn parse_nordvpn(text: &str) -> Vec<Endpoint> {
    // Only strip line endings: a trailing empty status is still a field.
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 5 {
                warn!(%line, "row has too few fields");
                return None;
            }
            Some(Endpoint::NordVpn(NordServer {
                id: parts[0].to_string(),
                name: parts[1].to_string(),
                station: parts[2].to_string(),
                hostname: parts[3].to_string(),
                status: parts[4].to_string(),
            }))
        })
        .collect()
}

fn parse_expressvpn(text: &str) -> Vec<Endpoint> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(3, '\t').collect();
            let [code, country, location] = parts.as_slice() else {
                warn!(%line, "row has too few fields");
                return None;
            };
            Some(Endpoint::ExpressVpn(ExpressLocation {
                code: code.trim().to_string(),
                country: country.trim().to_string(),
                location: location.trim().to_string(),
            }))
        })
        .collect()
}

fn parse_cyberghost(text: &str, cc: &str) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    let mut city: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with(char::is_whitespace);
        let line = line.trim();

        if !indented {
            if let Some(name) = line.strip_suffix(':') {
                city = Some(name.trim().to_string());
                continue;
            }
        }
        match &city {
            Some(c) => endpoints.push(Endpoint::CyberGhost(CyberGhostInstance {
                country_code: cc.to_string(),
                city: c.clone(),
                instance: line.to_string(),
            })),
            None => warn!(%line, "instance listed before any city"),
        }
    }
    endpoints
}

/// Write the server list to `path`, replacing any previous file.
pub fn write(path: &Path, endpoints: &[Endpoint]) -> Result<()> {
    std::fs::write(path, render(endpoints))
        .with_context(|| format!("failed to write server list: {}", path.display()))?;
    info!(path = %path.display(), endpoints = endpoints.len(), "server list saved");
    Ok(())
}

/// Read endpoints back from a saved server list.
pub fn read(path: &Path, kind: ProviderKind, region: Region) -> Result<Vec<Endpoint>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read server list: {}", path.display()))?;
    Ok(parse(kind, region, &text))
}

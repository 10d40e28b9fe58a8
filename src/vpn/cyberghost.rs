//! CyberGhost: `cyberghostvpn` table output, enumerated city by city.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{info, warn};

use super::{
    classify_connect_output, run_tool, ConnectOutcome, CyberGhostInstance, Endpoint,
    ProviderKind, ProviderMeta, Region, VpnError, VpnProvider,
};
use crate::config::CyberGhostConfig;
use crate::runner::pacing::Pacing;

const CLI: &str = "cyberghostvpn";

/// Country code the CLI expects. CyberGhost uses ISO `gb`, not `uk`.
pub fn country_code(region: Region) -> &'static str {
    match region {
        Region::Us => "us",
        Region::Uk => "gb",
    }
}

/// Cells of the `| a | b | c |` table rows in `output`, trimmed.
/// Cell 0 is the empty text before the first pipe.
fn table_rows<'a>(output: &'a str) -> impl Iterator<Item = Vec<&'a str>> + 'a {
    output
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with('|'))
        .map(|line| line.split('|').map(str::trim).collect())
}

/// Cities from `cyberghostvpn --country-code <cc>`, de-duplicated and sorted.
///
/// ```text
/// +-----+------------+----------+------+
/// | No. |    City    | Instance | Load |
/// +-----+------------+----------+------+
/// |  1  | Berkshire  |    81    | 37%  |
/// |  2  | London     |   315    | 37%  |
/// ```
pub fn parse_cities(output: &str) -> Vec<String> {
    let cities: BTreeSet<String> = table_rows(output)
        .filter_map(|cells| cells.get(2).map(|c| c.to_string()))
        .filter(|city| !city.is_empty() && !city.eq_ignore_ascii_case("city"))
        .collect();
    cities.into_iter().collect()
}

/// Instance names from `cyberghostvpn --country-code <cc> --city <city>`.
pub fn parse_instances(output: &str) -> Vec<String> {
    table_rows(output)
        .filter_map(|cells| cells.get(3).map(|c| c.to_string()))
        .filter(|instance| is_instance_name(instance))
        .collect()
}

/// `london-s315-i01` style names, or a bare server number.
pub fn is_instance_name(s: &str) -> bool {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    s.match_indices("-s").any(|(idx, _)| {
        let rest = &s[idx + 2..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        match rest[digits..].strip_prefix("-i") {
            Some(tail) => tail.bytes().next().is_some_and(|b| b.is_ascii_digit()),
            None => false,
        }
    })
}

pub struct CyberGhostProvider {
    use_sudo: bool,
}

impl CyberGhostProvider {
    pub fn new(cfg: &CyberGhostConfig) -> Self {
        Self {
            use_sudo: cfg.use_sudo,
        }
    }

    /// Run the CLI, through `sudo` when configured. Listing does not need root.
    async fn run_privileged(&self, args: &[&str]) -> Result<super::ToolOutput, VpnError> {
        if self.use_sudo {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(CLI);
            full.extend_from_slice(args);
            run_tool("sudo", &full).await
        } else {
            run_tool(CLI, args).await
        }
    }

    async fn list_cities(&self, cc: &str) -> Result<Vec<String>> {
        let out = run_tool(CLI, &["--country-code", cc])
            .await?
            .require_success(CLI)?;
        Ok(parse_cities(&out.stdout))
    }

    async fn list_instances(&self, cc: &str, city: &str) -> Result<Vec<String>> {
        let city_arg = city.to_lowercase();
        let out = run_tool(CLI, &["--country-code", cc, "--city", &city_arg])
            .await?
            .require_success(CLI)?;
        Ok(parse_instances(&out.stdout))
    }
}

#[async_trait::async_trait]
impl VpnProvider for CyberGhostProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            kind: ProviderKind::CyberGhost,
            display_name: "CyberGhost",
            file_tag: "CyberGhost",
            cli: CLI,
            install_hint: "Install the CyberGhost Linux CLI and run 'cyberghostvpn --setup'",
            key_headers: &["Instance"],
            pacing: Pacing::new(10, 10, 6, 5),
        }
    }

    async fn list_endpoints(&self, region: Region, city: Option<&str>) -> Result<Vec<Endpoint>> {
        let cc = country_code(region);
        let cities = match city {
            Some(c) => vec![c.to_string()],
            None => self.list_cities(cc).await?,
        };
        info!(%region, cities = cities.len(), "listing CyberGhost instances");

        let mut endpoints = Vec::new();
        for city in cities {
            let instances = self.list_instances(cc, &city).await?;
            if instances.is_empty() {
                warn!(%city, "no instances listed");
            }
            info!(%city, instances = instances.len(), "processed city");
            endpoints.extend(instances.into_iter().map(|instance| {
                Endpoint::CyberGhost(CyberGhostInstance {
                    country_code: cc.to_string(),
                    city: city.clone(),
                    instance,
                })
            }));
        }
        Ok(endpoints)
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectOutcome> {
        let Endpoint::CyberGhost(inst) = endpoint else {
            return Err(VpnError::ForeignEndpoint {
                provider: "CyberGhost",
                endpoint_kind: "non-CyberGhost",
            }
            .into());
        };

        info!(instance = %inst.instance, city = %inst.city, "connecting");
        let city = inst.city.to_lowercase();
        let out = self
            .run_privileged(&[
                "--country-code",
                &inst.country_code,
                "--city",
                &city,
                "--server",
                &inst.instance,
                "--connect",
            ])
            .await?;
        Ok(classify_connect_output(&out.stdout, out.success))
    }

    async fn disconnect(&self) -> Result<()> {
        self.run_privileged(&["--disconnect"])
            .await?
            .require_success(CLI)?;
        info!("disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITY_TABLE: &str = "\
+-----+------------+----------+------+
| No. |    City    | Instance | Load |
+-----+------------+----------+------+
|  1  | Manchester |   185    | 38%  |
|  2  | London     |   315    | 37%  |
|  3  | Berkshire  |    81    | 37%  |
|  4  | London     |    12    | 11%  |
+-----+------------+----------+------+
";

    const INSTANCE_TABLE: &str = "\
+-----+------------+-----------------------+------+
| No. |    City    |       Instance        | Load |
+-----+------------+-----------------------+------+
|  1  | London     | london-s315-i01       | 37%  |
|  2  | London     | london-s315-i02       | 35%  |
|  3  | London     | london-s315           | 35%  |
+-----+------------+-----------------------+------+
";

    #[test]
    fn test_parse_cities_sorted_and_unique() {
        assert_eq!(
            parse_cities(CITY_TABLE),
            vec!["Berkshire", "London", "Manchester"]
        );
    }

    #[test]
    fn test_parse_instances() {
        assert_eq!(
            parse_instances(INSTANCE_TABLE),
            vec!["london-s315-i01", "london-s315-i02"]
        );
    }

    #[test]
    fn test_instance_name_shapes() {
        assert!(is_instance_name("newyork-s403-i12"));
        assert!(is_instance_name("315"));
        assert!(is_instance_name("los-angeles-s17-i3-extra"));
        assert!(!is_instance_name("Instance"));
        assert!(!is_instance_name("london-s-i01"));
        assert!(!is_instance_name("london-s315-i"));
        assert!(!is_instance_name(""));
    }

    #[test]
    fn test_country_codes() {
        assert_eq!(country_code(Region::Uk), "gb");
        assert_eq!(country_code(Region::Us), "us");
    }

    #[test]
    fn test_empty_output_yields_nothing() {
        assert!(parse_cities("").is_empty());
        assert!(parse_instances("No servers found.").is_empty());
    }
}

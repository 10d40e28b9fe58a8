use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use streamcheck::config::{Config, LogFormat, LoggingConfig};
use streamcheck::probes::external_ip::IpEchoLookup;
use streamcheck::probes::{AddressLookup, StreamingService};
use streamcheck::report::{self, server_list, FileNames};
use streamcheck::runner::{self, CampaignPlan};
use streamcheck::vpn::{self, ProviderKind, Region};

#[derive(Parser)]
#[command(
    name = "streamcheck",
    about = "Geo-block checks for streaming services across VPN provider endpoints",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Falls back to $STREAMCHECK_CONFIG, then ./streamcheck.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test every endpoint of a provider against a streaming service
    Run {
        /// VPN provider to drive
        #[arg(long, value_enum)]
        provider: ProviderKind,

        /// Streaming service to check
        #[arg(long, value_enum)]
        service: StreamingService,

        /// Endpoint country (defaults to the service's home country)
        #[arg(long, value_enum, ignore_case = true)]
        region: Option<Region>,

        /// Only test endpoints in this city
        #[arg(long)]
        city: Option<String>,

        /// Where to save the server list
        #[arg(long)]
        server_list: Option<PathBuf>,

        /// Where to write the results
        #[arg(long)]
        results: Option<PathBuf>,

        /// Test the endpoints of a previously saved server list
        #[arg(long)]
        from_list: Option<PathBuf>,

        /// Stop after this many endpoints
        #[arg(long)]
        limit: Option<usize>,

        /// Prompt for file names on stdin
        #[arg(long)]
        interactive: bool,

        /// JSON summary for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Enumerate a provider's endpoints and save the server list
    ListServers {
        #[arg(long, value_enum)]
        provider: ProviderKind,

        #[arg(long, value_enum, ignore_case = true, default_value = "us")]
        region: Region,

        #[arg(long)]
        city: Option<String>,

        /// Output file (defaults to the dated server-list name)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check a service once through the current connection
    Check {
        #[arg(long, value_enum)]
        service: StreamingService,

        #[arg(long)]
        json: bool,
    },

    /// List supported VPN providers and whether their CLI is installed
    Providers {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cfg.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = Config::resolve(cli.config.as_deref())?;
    init_logging(&config.logging);
    tracing::info!(%source, "configuration loaded");

    match cli.command {
        Commands::Run {
            provider,
            service,
            region,
            city,
            server_list,
            results,
            from_list,
            limit,
            interactive,
            json,
        } => {
            let provider = vpn::provider_for(provider, &config)?;
            let meta = provider.meta();
            if !provider.is_available() {
                bail!(
                    "{} CLI '{}' not found on PATH. {}",
                    meta.display_name,
                    meta.cli,
                    meta.install_hint
                );
            }

            let region = region.unwrap_or_else(|| service.home_region());
            let names = FileNames::defaults(
                meta.file_tag,
                service.file_tag(),
                region.tag(),
                city.as_deref(),
                today(),
            );
            let mut server_list_path = server_list.unwrap_or(names.server_list);
            let mut results_path = results.unwrap_or(names.results);

            if interactive {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut output = std::io::stdout();
                server_list_path =
                    report::prompt_path(&mut input, &mut output, "server list", &server_list_path)?;
                results_path =
                    report::prompt_path(&mut input, &mut output, "results", &results_path)?;
            }

            let lookup = IpEchoLookup::new(&config.probes)?;
            let check = service.build_check(&config)?;
            let plan = CampaignPlan {
                region,
                city,
                server_list_path,
                results_path,
                from_list,
                limit,
                pacing: config.pacing_for(meta.pacing),
                echo_rows: !json,
            };

            tracing::info!(provider = %meta.kind, %service, %region, "starting run");
            let summary =
                runner::run_campaign(provider.as_ref(), &lookup, check.as_ref(), &plan).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n=== streamcheck: {} via {} ({}) ===", summary.service, summary.provider, summary.region);
                println!("{:<12} : {}", "Endpoints", summary.endpoints);
                println!("{:<12} : {}", "Available", summary.available);
                println!("{:<12} : {}", "Blocked", summary.blocked);
                println!("{:<12} : {}", "Skipped", summary.skipped);
                println!("{:<12} : {}", "Server list", summary.server_list_path.display());
                println!("{:<12} : {}", "Results", summary.results_path.display());
                println!();
            }
        }
        Commands::ListServers {
            provider,
            region,
            city,
            output,
        } => {
            let provider = vpn::provider_for(provider, &config)?;
            let meta = provider.meta();
            let endpoints = provider.list_endpoints(region, city.as_deref()).await?;
            if endpoints.is_empty() {
                bail!("no {} endpoints found for region {}", meta.display_name, region);
            }

            // The service part of the default name is irrelevant here.
            let path = output.unwrap_or_else(|| {
                FileNames::defaults(meta.file_tag, "", region.tag(), city.as_deref(), today())
                    .server_list
            });
            server_list::write(&path, &endpoints)?;
            println!("{} endpoint(s) saved to '{}'", endpoints.len(), path.display());
        }
        Commands::Check { service, json } => {
            let lookup = IpEchoLookup::new(&config.probes)?;
            let check = service.build_check(&config)?;

            let external_ip = match lookup.external_ip().await {
                Ok(ip) => ip,
                Err(e) => {
                    tracing::warn!(error = %e, "external address lookup failed");
                    report::NO_ADDRESS.to_string()
                }
            };
            let verdict = check.check().await?;

            if json {
                let out = serde_json::json!({
                    "service": service,
                    "external_ip": external_ip,
                    "verdict": verdict.to_string(),
                    "checked_at": chrono::Utc::now(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}\t{}\t{}", service, external_ip, verdict);
            }
        }
        Commands::Providers { json } => {
            let providers = vpn::get_all_providers(&config)?;
            if json {
                let list: Vec<_> = providers
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "meta": p.meta(),
                            "available": p.is_available(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                println!("{:<12} | {:<14} | {:<9} | Install", "Provider", "CLI", "Available");
                println!("{:-<12}-|-{:-<14}-|-{:-<9}-|-{:-<40}", "", "", "", "");
                for p in &providers {
                    let meta = p.meta();
                    let available = if p.is_available() { "yes" } else { "no" };
                    println!(
                        "{:<12} | {:<14} | {:<9} | {}",
                        meta.display_name, meta.cli, available, meta.install_hint
                    );
                }
            }
        }
    }

    Ok(())
}

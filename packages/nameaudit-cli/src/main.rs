//! Nameaudit CLI - report appliance devices whose names fail a naming convention
//!
//! This binary can:
//! - Search an appliance for devices whose name does not match a regex
//! - Write the matches to a CSV report
//! - Store API keys per appliance in ~/.extrahop

mod prompt;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nameaudit_core::appliance::{self, config};
use nameaudit_core::report::{self, ReportMetadata, ReportWriter};
use nameaudit_core::{auth, ClientOptions, CredentialStore, MatchOperator, ProbeMode, SearchParams};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "nameaudit")]
#[command(version)]
#[command(about = "Find appliance devices whose names fail a naming convention")]
#[command(long_about = "
nameaudit queries an ExtraHop appliance for devices whose name does not
match a naming-convention regex and writes them to a CSV report.

Quick start:
  1. Save a key:     nameaudit save-key -H 192.168.0.16 -a <apikey>
  2. Run a report:   nameaudit report -H 192.168.0.16 -r '^ASUS' -d 7
  3. Next page:      nameaudit report -H 192.168.0.16 -r '^ASUS' -O 100 -l 100
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for non-compliant device names and write a CSV report
    Report(ReportArgs),

    /// Save an API key for an appliance to the credential file
    SaveKey {
        /// IP or hostname of the appliance
        #[arg(short = 'H', long)]
        host: String,

        /// API key obtained from the appliance
        #[arg(short = 'a', long)]
        apikey: String,
    },

    /// Show configuration paths and settings
    Config,
}

#[derive(Args)]
pub struct ReportArgs {
    /// IP or hostname of the appliance
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// API key obtained from the appliance (looked up in ~/.extrahop if omitted)
    #[arg(short = 'a', long)]
    apikey: Option<String>,

    /// Name of the file to save the results to, without the .csv extension
    #[arg(short = 'o', long, default_value = "non_compliant_device_names")]
    outputfile: String,

    /// Number of days of lookback history to search [default: 7]
    #[arg(short = 'd', long)]
    days: Option<u32>,

    /// RegEx pattern device names are checked against [default: ^VMware]
    #[arg(short = 'r', long)]
    regex: Option<String>,

    /// Limit the number of results per page [default: 100]
    #[arg(short = 'l', long)]
    limit: Option<u32>,

    /// Offset to search from, for paging with --limit [default: 0]
    #[arg(short = 'O', long)]
    offset: Option<u32>,

    /// '!=' reports names that do not match the regex, '=' those that do [default: !=]
    #[arg(long, value_parser = parse_operator)]
    operator: Option<MatchOperator>,

    /// Accept self-signed or otherwise invalid TLS certificates
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Per-request timeout in seconds [default: 10]
    #[arg(long)]
    timeout: Option<u64>,

    /// Probe with the older extrahop/version endpoint
    #[arg(long, conflicts_with = "no_probe")]
    legacy_probe: bool,

    /// Skip the platform/version probe
    #[arg(long)]
    no_probe: bool,
}

fn parse_operator(s: &str) -> Result<MatchOperator, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("nameaudit={},nameaudit_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Report(args) => cmd_report(&cli, args).await,
        Commands::SaveKey { host, apikey } => cmd_save_key(&cli, host, apikey),
        Commands::Config => cmd_config(&cli),
    }
}

async fn cmd_report(cli: &Cli, args: &ReportArgs) -> Result<()> {
    let settings = appliance::load_settings();

    let host = args
        .host
        .clone()
        .or(settings.host.clone())
        .filter(|h| !h.trim().is_empty())
        .context(
            "No appliance specified. Pass -H/--host, set NAMEAUDIT_HOST, or add host to the config file",
        )?;

    let store = CredentialStore::open_default().context("credential resolution failed")?;
    let api_key = match auth::resolve_api_key(&store, &host, args.apikey.as_deref())
        .context("credential resolution failed")?
    {
        Some((key, source)) => {
            tracing::debug!("Using API key for {} ({:?})", host, source);
            key
        }
        None => prompt::prompt_for_api_key(&store, &host)
            .context("credential resolution failed")?,
    };

    let params = SearchParams {
        regex: args.regex.clone().unwrap_or(settings.search.regex),
        lookback_days: args.days.unwrap_or(settings.search.lookback_days),
        limit: args.limit.unwrap_or(settings.search.limit),
        offset: args.offset.unwrap_or(settings.search.offset),
        operator: args.operator.unwrap_or(settings.search.operator),
    };
    let options = ClientOptions {
        timeout: args.timeout.map(Duration::from_secs).unwrap_or(settings.timeout),
        accept_invalid_certs: args.insecure || settings.accept_invalid_certs,
        key_file: store.path().to_path_buf(),
    };
    let probe = if args.no_probe {
        ProbeMode::Skip
    } else if args.legacy_probe {
        ProbeMode::Legacy
    } else {
        ProbeMode::Platform
    };

    tracing::info!(
        "Searching {} for device names {} '{}' active in the last {} days (limit {}, offset {})",
        host,
        params.operator,
        params.regex,
        params.lookback_days,
        params.limit,
        params.offset
    );

    let report =
        report::run_report(&store, &host, Some(&api_key), &options, &params, probe).await?;

    let path = PathBuf::from(format!("{}.csv", args.outputfile));
    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    let metadata = ReportMetadata::now(&host, params.lookback_days);
    let mut writer = ReportWriter::new(BufWriter::new(file), &metadata)
        .with_context(|| format!("Failed to write {:?}", path))?;
    let count = writer
        .write_all(report.records)
        .with_context(|| format!("Failed to write {:?}", path))?;
    writer
        .finish()
        .with_context(|| format!("Failed to write {:?}", path))?;

    match cli.format {
        OutputFormat::Text => {
            println!(
                "Wrote a total of {} device detail lines to {}",
                count,
                path.display()
            );
            if count as u32 == params.limit {
                println!(
                    "The page is full; run again with --offset {} for more",
                    params.next_page().offset
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": host,
                    "appliance": report.appliance.to_string(),
                    "output_file": path.display().to_string(),
                    "records": count,
                    "limit": params.limit,
                    "offset": params.offset,
                    "next_offset": params.next_page().offset,
                })
            );
        }
    }

    Ok(())
}

fn cmd_save_key(cli: &Cli, host: &str, apikey: &str) -> Result<()> {
    let host = host.trim();
    let apikey = apikey.trim();
    if host.is_empty() || apikey.is_empty() {
        anyhow::bail!("Both a host and an API key are required");
    }

    let store = CredentialStore::open_default()?;
    store.save(host, apikey)?;

    match cli.format {
        OutputFormat::Text => println!("Saved key for {} to {}", host, store.path().display()),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "status": "saved",
                    "host": host,
                    "key_file": store.path().display().to_string(),
                })
            );
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let settings = appliance::load_settings();
    let config_path = config::get_config_file_path_string();
    let key_file = auth::default_key_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| format!("~/{}", auth::KEY_FILE_NAME));
    let stored_hosts: Vec<String> = CredentialStore::open_default()
        .and_then(|s| s.entries())
        .map(|entries| entries.into_iter().map(|c| c.host).collect())
        .unwrap_or_default();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Credential file:  {}", key_file);
            println!(
                "Stored hosts:     {}",
                if stored_hosts.is_empty() {
                    "-".to_string()
                } else {
                    stored_hosts.join(", ")
                }
            );
            println!(
                "Appliance host:   {} (from {})",
                settings.host.as_deref().unwrap_or("-"),
                settings.host_source
            );
            println!("Timeout:          {}s", settings.timeout.as_secs());
            println!("Insecure TLS:     {}", settings.accept_invalid_certs);
            println!(
                "Search:           name {} '{}' over {} days, limit {}, offset {}",
                settings.search.operator,
                settings.search.regex,
                settings.search.lookback_days,
                settings.search.limit,
                settings.search.offset
            );
            println!();
            println!("Environment variables:");
            println!("  NAMEAUDIT_HOST   - Appliance host");
            println!("  NAMEAUDIT_CONFIG - Override config file location");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "credential_file": key_file,
                    "stored_hosts": stored_hosts,
                    "host": settings.host,
                    "host_source": settings.host_source.to_string(),
                    "timeout_secs": settings.timeout.as_secs(),
                    "accept_invalid_certs": settings.accept_invalid_certs,
                    "search": {
                        "regex": settings.search.regex,
                        "days": settings.search.lookback_days,
                        "limit": settings.search.limit,
                        "offset": settings.search.offset,
                        "operator": settings.search.operator.as_str(),
                    },
                })
            );
        }
    }

    Ok(())
}

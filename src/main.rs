//! `tunegrab` CLI - Resolve playable stream URLs from the command line

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tunegrab::relay::HttpRelayProber;
use tunegrab::{
    AttemptRecord, HealthChecker, MediaId, ReachabilityProbe, RelayFinder, RelayPool,
    RelayRegistry, ResolveError, Resolver, ResolverConfig, UrlValidator,
};

#[derive(Parser)]
#[command(name = "tunegrab")]
#[command(about = "Bounded-time audio stream URL resolver")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a media id or URL to a playable stream URL
    Resolve {
        /// Media id or watch URL
        media: String,

        /// Global resolution budget in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Netscape-format cookie file
        #[arg(long)]
        cookies: Option<PathBuf>,

        /// Relay registry endpoint
        #[arg(long)]
        registry: Option<String>,

        /// Static relay address (repeatable)
        #[arg(long = "relay")]
        relays: Vec<String>,

        /// Emit the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discover and rank relays without resolving anything
    Relays {
        /// Relay registry endpoint
        #[arg(long)]
        registry: Option<String>,

        /// Static relay address (repeatable)
        #[arg(long = "relay")]
        relays: Vec<String>,

        /// Discovery budget in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Probe a URL the way the validation gate does
    Probe {
        /// URL to probe
        url: String,

        /// Probe timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => ResolverConfig::from_file(path)?,
        None => ResolverConfig::default(),
    };

    match cli.command {
        Commands::Resolve {
            media,
            timeout,
            cookies,
            registry,
            relays,
            json,
        } => {
            if let Some(path) = cookies {
                config.credential_file = Some(path);
            }
            if registry.is_some() {
                config.registry_url = registry;
            }
            if !relays.is_empty() {
                config.static_relays = relays;
            }
            cmd_resolve(config, &media, Duration::from_secs(timeout), json).await?;
        }
        Commands::Relays {
            registry,
            relays,
            timeout,
        } => {
            if registry.is_some() {
                config.registry_url = registry;
            }
            if !relays.is_empty() {
                config.static_relays = relays;
            }
            cmd_relays(config, Duration::from_secs(timeout)).await?;
        }
        Commands::Probe { url, timeout } => {
            cmd_probe(&url, Duration::from_secs(timeout)).await?;
        }
    }

    Ok(())
}

async fn cmd_resolve(
    config: ResolverConfig,
    media: &str,
    timeout: Duration,
    json: bool,
) -> Result<()> {
    let media = MediaId::parse(media)?;
    let resolver = Resolver::new(config)?;

    if !json {
        println!("🎵 Resolving: {media}");
    }

    let (result, trail) = resolver.resolve_with_report(media, timeout).await;

    match result {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\n✅ Resolved via {} in {:.2?}", result.strategy, result.elapsed);
                println!("   Title: {}", result.title);
                println!("   Author: {}", result.author);
                if result.duration_seconds > 0 {
                    println!(
                        "   Duration: {}:{:02}",
                        result.duration_seconds / 60,
                        result.duration_seconds % 60
                    );
                }
                if let Some(ref mime) = result.mime_type {
                    println!("   Type: {mime}");
                }
                println!("\n{}", result.url);
            }
            Ok(())
        }
        Err(err) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure_report(&err, &trail))?);
            } else {
                println!("\n❌ {err}");
                if !trail.is_empty() {
                    println!("\nAttempt trail:");
                    for record in &trail {
                        let kind = record
                            .kind
                            .map_or_else(|| "ok".to_string(), |k| k.to_string());
                        match &record.relay {
                            Some(relay) => println!(
                                "   {} via {relay}: {kind} ({:.2?})",
                                record.strategy, record.elapsed
                            ),
                            None => println!(
                                "   {}: {kind} ({:.2?})",
                                record.strategy, record.elapsed
                            ),
                        }
                    }
                }
            }
            Err(err.into())
        }
    }
}

/// Structured failure body for `--json` mode: final classification,
/// human message, and the attempt trail.
fn failure_report(err: &ResolveError, trail: &[AttemptRecord]) -> serde_json::Value {
    let attempts: Vec<serde_json::Value> = trail
        .iter()
        .map(|record| {
            serde_json::json!({
                "strategy": record.strategy,
                "kind": record.kind.map(tunegrab::ErrorKind::as_str),
                "elapsed_ms": u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX),
                "relay": record.relay,
            })
        })
        .collect();

    serde_json::json!({
        "error": err.last_kind().as_str(),
        "message": err.to_string(),
        "attempts": attempts,
    })
}

async fn cmd_relays(config: ResolverConfig, budget: Duration) -> Result<()> {
    let registry = RelayRegistry::new(config.registry_url.clone(), config.static_relays.clone())?;
    let checker = HealthChecker::new(Arc::new(HttpRelayProber::new()?))
        .with_worker_cap(config.probe_worker_cap)
        .with_good_enough(config.good_enough_relays);
    let pool = RelayPool::new(
        registry,
        checker,
        config.registry_timeout,
        config.probe_timeout,
        config.relay_overall_timeout,
    );

    println!("🔎 Discovering relays ({budget:.0?} budget)...");
    let ranked = pool.ranked(budget).await;

    if ranked.is_empty() {
        println!("❌ No alive relays found");
        return Ok(());
    }

    println!("\n📊 {} alive relay(s), fastest first:", ranked.len());
    for relay in &ranked {
        let latency = relay
            .latency
            .map_or_else(|| "?".to_string(), |l| format!("{l:.2?}"));
        println!("   {} ({:?}) {latency}", relay.address, relay.origin);
    }

    Ok(())
}

async fn cmd_probe(url: &str, timeout: Duration) -> Result<()> {
    let probe = ReachabilityProbe::new()?;
    println!("🔎 Probing: {url}");

    if probe.validate(url, timeout).await {
        println!("✅ Reachable");
    } else {
        println!("❌ Not reachable within {timeout:.0?}");
        std::process::exit(1);
    }

    Ok(())
}

//! CDN Replica
//!
//! One binary, three roles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          cdn-replica                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │     dns      │    │     http     │    │     warm     │       │
//! │  │  (steering)  │    │  (serving)   │    │  (pre-fill)  │       │
//! │  └──────────────┘    └──────┬───────┘    └──────┬───────┘       │
//! │                             └─── cache dir ─────┘               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdn_replica::adapters::{HttpOriginClient, MaxMindLocator, OriginConfig, DEFAULT_ORIGIN_URL};
use cdn_replica::cache::{
    read_manifest, CacheConfig, CacheEngine, EvictionMode, GzipCompressor,
    DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_MEMORY_BYTES,
};
use cdn_replica::dns::{DnsConfig, DnsServer, DEFAULT_CDN_NAME, DEFAULT_TTL_SECS};
use cdn_replica::error::Result;
use cdn_replica::geo::{load_replicas, ReplicaSelector};
use cdn_replica::http::{HttpConfig, HttpServer};
use cdn_replica::warm::{warm_cache, WarmConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CDN Replica - popularity-driven edge cache and DNS steering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve articles over HTTP from the tiered cache
    Http(HttpArgs),
    /// Answer DNS queries with the closest replica
    Dns(DnsArgs),
    /// Pre-fill the cache directory from the manifest
    Warm(WarmArgs),
}

#[derive(ClapArgs, Debug)]
struct HttpArgs {
    /// Port to listen on
    #[arg(short, long, env = "HTTP_PORT", default_value = "8080")]
    port: u16,

    /// Origin server, `host:port` or URL
    #[arg(short, long, env = "ORIGIN", default_value = DEFAULT_ORIGIN_URL)]
    origin: String,

    /// Origin request timeout in seconds
    #[arg(long, env = "ORIGIN_TIMEOUT_SECONDS", default_value = "30")]
    origin_timeout_seconds: u64,

    /// Cache directory
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// Popularity manifest (CSV with `article` and `views` columns)
    #[arg(long, env = "MANIFEST", default_value = "pageviews.csv")]
    manifest: PathBuf,

    /// Memory tier budget in bytes
    #[arg(long, env = "MAX_MEMORY_BYTES", default_value_t = DEFAULT_MAX_MEMORY_BYTES)]
    max_memory_bytes: u64,

    /// Disk tier budget in bytes
    #[arg(long, env = "MAX_DISK_BYTES", default_value_t = DEFAULT_MAX_DISK_BYTES)]
    max_disk_bytes: u64,

    /// What to do with evicted articles (discard, demote)
    #[arg(long, env = "EVICTION_MODE", default_value = "discard")]
    eviction_mode: EvictionMode,

    /// Re-index an eviction victim when no swap was possible
    #[arg(long, env = "RESTORE_ORPHANED_VICTIMS")]
    restore_orphaned_victims: bool,

    /// Serve articles missing from the manifest
    #[arg(long, env = "ADMIT_UNKNOWN")]
    admit_unknown: bool,

    /// Keep disk copies of articles loaded into memory at startup
    #[arg(long, env = "RETAIN_DISK_COPIES")]
    retain_disk_copies: bool,
}

#[derive(ClapArgs, Debug)]
struct DnsArgs {
    /// Port to listen on
    #[arg(short, long, env = "DNS_PORT", default_value = "53")]
    port: u16,

    /// CDN name to answer for
    #[arg(short, long, env = "CDN_NAME", default_value = DEFAULT_CDN_NAME)]
    name: String,

    /// Replica list (YAML)
    #[arg(long, env = "REPLICAS", default_value = "replicas.yaml")]
    replicas: PathBuf,

    /// MaxMind GeoLite2-City database
    #[arg(long, env = "GEOIP_DB", default_value = "GeoLite2-City.mmdb")]
    geoip_db: PathBuf,

    /// TTL of answers in seconds
    #[arg(long, env = "DNS_TTL", default_value_t = DEFAULT_TTL_SECS)]
    ttl: u32,
}

#[derive(ClapArgs, Debug)]
struct WarmArgs {
    /// Origin server, `host:port` or URL
    #[arg(short, long, env = "ORIGIN", default_value = DEFAULT_ORIGIN_URL)]
    origin: String,

    /// Cache directory
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// Popularity manifest
    #[arg(long, env = "MANIFEST", default_value = "pageviews.csv")]
    manifest: PathBuf,

    /// Disk budget in bytes
    #[arg(long, env = "MAX_DISK_BYTES", default_value_t = DEFAULT_MAX_DISK_BYTES)]
    max_disk_bytes: u64,

    /// Concurrent origin fetches
    #[arg(long, env = "WARM_CONCURRENCY", default_value = "8")]
    concurrency: usize,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let result = match args.command {
        Command::Http(http) => run_http(http).await,
        Command::Dns(dns) => run_dns(dns).await,
        Command::Warm(warm) => run_warm(warm).await,
    };

    if let Err(e) = &result {
        error!("Fatal: {}", e);
    }
    result
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        trigger.cancel();
    });
    token
}

async fn run_http(args: HttpArgs) -> Result<()> {
    info!("Starting CDN replica HTTP server");
    info!("  Origin: {}", args.origin);
    info!("  Cache dir: {}", args.cache_dir.display());
    info!("  Manifest: {}", args.manifest.display());
    info!(
        "  Budgets: {} bytes memory, {} bytes disk",
        args.max_memory_bytes, args.max_disk_bytes
    );
    info!("  Eviction mode: {}", args.eviction_mode);

    let manifest = read_manifest(&args.manifest)?;
    info!("Loaded {} manifest rows", manifest.len());

    let origin_config = OriginConfig {
        timeout: Duration::from_secs(args.origin_timeout_seconds),
        ..OriginConfig::from_origin(&args.origin)
    };
    let origin = HttpOriginClient::new(origin_config)?;

    let cache_config = CacheConfig {
        cache_dir: args.cache_dir,
        max_memory_bytes: args.max_memory_bytes,
        max_disk_bytes: args.max_disk_bytes,
        eviction_mode: args.eviction_mode,
        restore_orphaned_victims: args.restore_orphaned_victims,
        admit_unknown: args.admit_unknown,
        retain_disk_copies: args.retain_disk_copies,
    };
    let engine = CacheEngine::build(
        cache_config,
        manifest,
        Arc::new(origin),
        Arc::new(GzipCompressor::new()),
    )
    .await?;

    let config = HttpConfig {
        bind_addr: SocketAddr::from(([0, 0, 0, 0], args.port)),
    };
    HttpServer::new(config, Arc::new(engine))
        .run(shutdown_token())
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn run_dns(args: DnsArgs) -> Result<()> {
    info!("Starting CDN DNS server for {}", args.name);

    let locator = Arc::new(MaxMindLocator::open(&args.geoip_db)?);
    let table = load_replicas(&args.replicas, locator.as_ref())?;
    for replica in table.iter() {
        info!(
            "  Replica {} at {} {}",
            replica.name, replica.address, replica.location
        );
    }
    let selector = ReplicaSelector::new(table, locator)?;

    let config = DnsConfig {
        bind_addr: SocketAddr::from(([0, 0, 0, 0], args.port)),
        name: args.name,
        ttl: args.ttl,
    };
    DnsServer::new(config, Arc::new(selector))
        .run(shutdown_token())
        .await?;

    info!("DNS server shutdown complete");
    Ok(())
}

async fn run_warm(args: WarmArgs) -> Result<()> {
    info!("Warming {} from {}", args.cache_dir.display(), args.origin);

    let manifest = read_manifest(&args.manifest)?;
    let origin = HttpOriginClient::new(OriginConfig::from_origin(&args.origin))?;
    let config = WarmConfig {
        cache_dir: args.cache_dir,
        max_disk_bytes: args.max_disk_bytes,
        concurrency: args.concurrency,
    };

    let report = warm_cache(
        &config,
        manifest,
        Arc::new(origin),
        Arc::new(GzipCompressor::new()),
    )
    .await?;
    info!("Warm outcome: {:?}", report.outcome);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

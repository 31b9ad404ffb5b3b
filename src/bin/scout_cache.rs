//! scout-cache: inspect and edit the configured scrape cache.
//!
//! Usage:
//!   scout-cache [--config <file>] get <key>
//!   scout-cache [--config <file>] set <key> <json> [--ttl <secs>]
//!   scout-cache [--config <file>] del <key>
//!   scout-cache [--config <file>] exists <key>
//!   scout-cache [--config <file>] key <operation> [<args-json>]
//!   scout-cache [--config <file>] stats

use anyhow::{anyhow, bail, Context};
use scout::cache::{CacheConfig, CacheKey, CacheManager, NullBackend};
use scout::{CallArgs, ScoutConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(mut args: Vec<String>) -> anyhow::Result<()> {
    let config_path = take_option(&mut args, "--config").map(PathBuf::from);
    let Some(command) = args.first().cloned() else {
        print_usage();
        bail!("missing command");
    };
    let rest = &args[1..];

    match command.as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("scout-cache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "key" => cmd_key(rest),
        "get" | "set" | "del" | "exists" | "stats" => {
            let config =
                ScoutConfig::load(config_path.as_deref()).context("loading configuration")?;
            let cache = open_cache(&config)?;
            match command.as_str() {
                "get" => cmd_get(&cache, rest).await,
                "set" => cmd_set(&cache, rest).await,
                "del" => cmd_del(&cache, rest).await,
                "exists" => cmd_exists(&cache, rest).await,
                _ => cmd_stats(&cache, &config).await,
            }
        }
        other => {
            print_usage();
            Err(anyhow!("unknown command: {other}"))
        }
    }
}

fn print_usage() {
    println!(
        r#"scout-cache: inspect the scrape cache

USAGE:
    scout-cache [--config <file>] <COMMAND> [ARGS]

COMMANDS:
    get <key>                       Print the cached JSON value
    set <key> <json> [--ttl <secs>] Store a JSON value
    del <key>                       Remove a key
    exists <key>                    Print whether a live entry exists
    key <operation> [<args-json>]   Print the key derived for a call
    stats                           Show backend and entry count
    version                         Show version information
    help                            Show this help message

ENVIRONMENT:
    SCOUT_CACHE_BACKEND             memory | redis | none
    SCOUT_REDIS_URL                 Full redis URL (overrides host/port/db)
    RUST_LOG                        Log filter, e.g. scout=debug"#
    );
}

/// Remove `--flag <value>` from `args`, returning the value.
fn take_option(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    if i + 1 >= args.len() {
        args.remove(i);
        return None;
    }
    let value = args.remove(i + 1);
    args.remove(i);
    Some(value)
}

fn open_cache(config: &ScoutConfig) -> anyhow::Result<Arc<CacheManager>> {
    let cache = config.cache.build().context("building cache backend")?;
    Ok(cache.unwrap_or_else(|| {
        Arc::new(CacheManager::new(CacheConfig::default(), Box::new(NullBackend)))
    }))
}

fn key_arg(rest: &[String]) -> anyhow::Result<CacheKey> {
    rest.first()
        .map(|k| CacheKey::new(k.as_str()))
        .ok_or_else(|| anyhow!("missing <key>"))
}

async fn cmd_get(cache: &CacheManager, rest: &[String]) -> anyhow::Result<()> {
    let key = key_arg(rest)?;
    match cache.get::<serde_json::Value>(&key).await {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => bail!("no entry for {key}"),
    }
}

async fn cmd_set(cache: &CacheManager, rest: &[String]) -> anyhow::Result<()> {
    let mut rest = rest.to_vec();
    let ttl = take_option(&mut rest, "--ttl")
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| anyhow!("invalid --ttl '{s}'"))
        })
        .transpose()?;
    let key = key_arg(&rest)?;
    let raw = rest.get(1).ok_or_else(|| anyhow!("missing <json>"))?;
    let value: serde_json::Value = serde_json::from_str(raw).context("value is not valid JSON")?;
    cache.set(&key, &value, ttl).await;
    if cache.stats().errors > 0 || !cache.exists(&key).await {
        bail!("cache rejected the write (see log)");
    }
    println!("OK");
    Ok(())
}

async fn cmd_del(cache: &CacheManager, rest: &[String]) -> anyhow::Result<()> {
    let key = key_arg(rest)?;
    cache.delete(&key).await;
    println!("OK");
    Ok(())
}

async fn cmd_exists(cache: &CacheManager, rest: &[String]) -> anyhow::Result<()> {
    let key = key_arg(rest)?;
    println!("{}", cache.exists(&key).await);
    Ok(())
}

async fn cmd_stats(cache: &CacheManager, config: &ScoutConfig) -> anyhow::Result<()> {
    println!("backend:        {}", cache.backend_name());
    match cache.len().await {
        Some(n) => println!("entries:        {n}"),
        None => println!("entries:        unknown (backend unreachable)"),
    }
    println!("identifier ttl: {:?}", config.ttl.identifier);
    println!("collection ttl: {:?}", config.ttl.collection);
    Ok(())
}

fn cmd_key(rest: &[String]) -> anyhow::Result<()> {
    let operation = rest.first().ok_or_else(|| anyhow!("missing <operation>"))?;
    let args: CallArgs = match rest.get(1) {
        Some(raw) => serde_json::from_str(raw)
            .context("args must look like {\"positional\": [...], \"named\": {...}}")?,
        None => CallArgs::new(),
    };
    println!("{}", CacheKey::derive(operation, &args));
    Ok(())
}

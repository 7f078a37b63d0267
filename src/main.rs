//! Connpool CLI

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use connpool::simulated::SimulatedFactory;
use connpool::{ConnectionPool, PoolConfig};

const DEFAULT_WORKERS: usize = 16;
const DEFAULT_ITERATIONS: usize = 1_000;
const HOLD_TIME: Duration = Duration::from_micros(200);
const CONNECT_LATENCY: Duration = Duration::from_millis(2);

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Connpool v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: connpool <command> <config.toml> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  check <config>                          Validate a pool configuration");
        eprintln!("  soak  <config> [workers] [iterations]   Run workers on a simulated backend");
        process::exit(1);
    }

    let command = &args[1];
    let config_path = Path::new(&args[2]);

    let result = match command.as_str() {
        "check" => check(config_path),
        "soak" => {
            let workers = parse_arg(args.get(3), DEFAULT_WORKERS);
            let iterations = parse_arg(args.get(4), DEFAULT_ITERATIONS);
            match (workers, iterations) {
                (Ok(workers), Ok(iterations)) => soak(config_path, workers, iterations).await,
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'connpool' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn parse_arg(arg: Option<&String>, default: usize) -> anyhow::Result<usize> {
    match arg {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid number: {value}")),
        None => Ok(default),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = PoolConfig::from_file(path)
        .with_context(|| format!("Loading {}", path.display()))?;

    println!("Configuration OK: {}", path.display());
    println!("  min_open:        {}", config.min_open);
    println!("  max_open:        {}", config.max_open);
    println!("  max_lifetime:    {:?} (not enforced)", config.max_lifetime());
    println!("  acquire_timeout: {:?}", config.acquire_timeout());
    Ok(())
}

async fn soak(path: &Path, workers: usize, iterations: usize) -> anyhow::Result<()> {
    let config = PoolConfig::from_file(path)
        .with_context(|| format!("Loading {}", path.display()))?;

    let factory = Arc::new(SimulatedFactory::new().with_latency(CONNECT_LATENCY));
    let pool = Arc::new(ConnectionPool::new(config, Arc::clone(&factory)).await?);

    info!("Starting soak: {} workers x {} iterations", workers, iterations);
    let started = Instant::now();

    let mut handles: Vec<_> = (0..workers)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let mut failures = 0usize;
                for _ in 0..iterations {
                    match pool.acquire().await {
                        Ok(conn) => {
                            tokio::time::sleep(HOLD_TIME).await;
                            if let Err(e) = pool.release(conn).await {
                                warn!("Release failed: {}", e);
                                failures += 1;
                            }
                        }
                        Err(e) if e.is_closed() => break,
                        Err(e) => {
                            warn!("Acquire failed: {}", e);
                            failures += 1;
                        }
                    }
                }
                failures
            })
        })
        .collect();

    // `None` when interrupted before every worker finished
    let failures: Option<usize> = tokio::select! {
        results = join_all(handles.iter_mut()) => {
            Some(results.into_iter().map(|r| r.unwrap_or(1)).sum())
        }
        _ = tokio::signal::ctrl_c() => None,
    };

    if failures.is_none() {
        warn!("Interrupted, stopping workers");
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            // cancelled workers drop their connections without releasing them
            let _ = handle.await;
        }
    }

    let elapsed = started.elapsed();
    let status = pool.status();
    let metrics = pool.metrics();

    pool.shutdown().await?;

    match failures {
        Some(failures) => {
            println!("Soak finished in {elapsed:.2?}");
            println!("  failures:        {failures}");
        }
        None => println!("Soak interrupted after {elapsed:.2?}"),
    }
    println!("  open at end:     {} ({} idle)", status.num_open, status.idle);
    println!("  created:         {}", metrics.created());
    println!("  destroyed:       {}", metrics.destroyed());
    println!("  recycled:        {}", metrics.recycled());
    println!("  timeouts:        {}", metrics.timeouts());
    println!("  live after stop: {}", factory.live_count());
    Ok(())
}

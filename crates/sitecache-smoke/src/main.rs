//! Sitecache Smoke Harness
//!
//! Runs one worker version against the live site: install, activate, then a
//! scripted list of requests through the fetch handler. Prints a JSON summary
//! on stdout and exits non-zero when install fails.

use serde_json::json;
use sitecache_common::{init_logging, LogConfig, LogFormat, SystemClock};
use sitecache_net::{Destination, HttpFetcher, LoaderConfig, Request};
use sitecache_sw::{
    CacheStore, FetchOutcome, Host, MemoryCacheStore, SiteConfig, SiteWorker, SwError,
};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use url::Url;

/// Timing collector for tracking operation durations.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();

        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            let max_ms = durations
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .fold(f64::NEG_INFINITY, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (total_ms / count as f64 * 100.0).round() / 100.0,
                    "max_ms": (max_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

/// One request to push through the fetch handler.
struct Probe {
    path: String,
    destination: Destination,
}

impl Probe {
    fn page(path: String) -> Self {
        Self {
            path,
            destination: Destination::Document,
        }
    }

    /// `kind:path`, e.g. `script:/assets/app.js`; a bare path is a page.
    fn parse(arg: &str) -> Self {
        match arg.split_once(':') {
            Some((kind, path)) if path.starts_with('/') => Self {
                path: path.to_string(),
                destination: Destination::parse(kind),
            },
            _ => Self::page(arg.to_string()),
        }
    }

    fn request(&self, config: &SiteConfig) -> Result<Request, SwError> {
        let url = config.resolve(&self.path)?;
        Ok(match self.destination {
            Destination::Document => Request::navigate(url),
            destination => Request::get(url).destination(destination),
        })
    }
}

/// Parse command line arguments
struct Args {
    config: Option<String>,
    origin: Option<String>,
    probes: Vec<Probe>,
    log_format: Option<LogFormat>,
    verbose: bool,
    sync: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut origin = None;
        let mut probes = Vec::new();
        let mut log_format = None;
        let mut verbose = false;
        let mut sync = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config = args.next(),
                "--origin" => origin = args.next(),
                "--fetch" => {
                    if let Some(val) = args.next() {
                        probes.push(Probe::parse(&val));
                    }
                }
                "--log-format" => {
                    log_format = args.next().and_then(|v| LogFormat::parse(&v));
                }
                "--verbose" => verbose = true,
                "--sync" => sync = true,
                other => eprintln!("Warning: ignoring unknown argument {other}"),
            }
        }

        Self {
            config,
            origin,
            probes,
            log_format,
            verbose,
            sync,
        }
    }

    fn load_config(&self) -> Result<SiteConfig, SwError> {
        if let Some(ref path) = self.config {
            return SiteConfig::load(path);
        }
        let origin = self.origin.as_deref().unwrap_or("http://localhost:8080");
        let config = SiteConfig::new(Url::parse(origin)?);
        config.validate()?;
        Ok(config)
    }
}

fn source_name(outcome: &FetchOutcome) -> &'static str {
    match outcome {
        FetchOutcome::Passthrough => "passthrough",
        FetchOutcome::NoResponse => "none",
        FetchOutcome::Respond { source, .. } => match source {
            sitecache_sw::ResponseSource::Network => "network",
            sitecache_sw::ResponseSource::Cache => "cache",
            sitecache_sw::ResponseSource::Synthesized => "synthesized",
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_env()
    };
    if let Some(format) = args.log_format {
        log_config.format = format;
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("Warning: logging disabled: {e}");
    }

    match run(args).await {
        Ok(result) => {
            let passed = result["status"] == "pass";
            println!("{result}");
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "Smoke run aborted");
            println!("{}", json!({ "status": "fail", "reason": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<serde_json::Value, SwError> {
    let start = Instant::now();
    let mut perf = PerfTiming::default();

    let config = args.load_config()?;
    info!(origin = %config.origin, versions = ?config.versions, "Starting Sitecache smoke harness");

    let store = MemoryCacheStore::new();
    let fetcher = HttpFetcher::new(LoaderConfig::default())?;
    let (host, mut events) = Host::new(
        Arc::new(store.clone()),
        Arc::new(fetcher),
        Arc::new(SystemClock),
    );
    let worker = SiteWorker::new(config, host)?;

    let t = Instant::now();
    if let Err(e) = worker.install().wait().await {
        return Ok(json!({
            "status": "fail",
            "reason": "install_failed",
            "error": e.to_string(),
            "elapsed_ms": start.elapsed().as_millis(),
        }));
    }
    perf.record("install", t.elapsed());

    let t = Instant::now();
    let activation = worker.activate().wait().await?;
    perf.record("activate", t.elapsed());

    let mut probes = args.probes;
    if probes.is_empty() {
        probes = worker
            .config()
            .sync_pages
            .iter()
            .cloned()
            .map(Probe::page)
            .collect();
    }

    let mut requests = Vec::new();
    for probe in &probes {
        let request = probe.request(worker.config())?;
        let t = Instant::now();
        let result = worker.handle_fetch(request).wait().await;
        perf.record("fetch", t.elapsed());

        match result {
            Ok(reply) => {
                requests.push(json!({
                    "path": probe.path,
                    "strategy": reply.strategy.map(|s| format!("{s:?}")),
                    "source": source_name(&reply.outcome),
                    "status": reply.outcome.response().map(|r| r.status.as_u16()),
                }));
                reply.writes.settle().await;
            }
            Err(e) => {
                warn!(path = %probe.path, error = %e, "Fetch handler failed");
                requests.push(json!({ "path": probe.path, "error": e.to_string() }));
            }
        }
    }

    let sync = if args.sync {
        let t = Instant::now();
        let report = match worker.handle_sync(sitecache_sw::SYNC_CONTENT_TAG) {
            Some(handle) => Some(handle.wait().await?),
            None => None,
        };
        perf.record("sync", t.elapsed());
        report.map(|r| json!({ "synced": r.synced.len(), "failed": r.failed.len() }))
    } else {
        None
    };

    let mut caches = serde_json::Map::new();
    for name in store.keys().await? {
        let entries = match store.get(&name).await {
            Some(cache) => cache.len().await,
            None => 0,
        };
        caches.insert(name, json!(entries));
    }

    let mut event_count = 0;
    while events.try_recv().is_ok() {
        event_count += 1;
    }

    Ok(json!({
        "status": "pass",
        "elapsed_ms": start.elapsed().as_millis(),
        "deleted_caches": activation.deleted,
        "claimed_clients": activation.claimed.len(),
        "lifecycle_events": event_count,
        "requests": requests,
        "sync": sync,
        "caches": caches,
        "perf": perf.summary(),
    }))
}

//! news-relay binary: load config, wire the relay, run leader-gated cycles until Ctrl-C.

use news_relay::bootstrap::{build_elector, build_relay, loop_options};
use news_relay::metrics::install_prometheus;
use news_relay::{run_leader_loop, RelayConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise info for this crate, warn elsewhere.
/// `RELAY_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_relay=info,warn"));
    let json = std::env::var("RELAY_LOG_JSON").ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load()?;
    if let Some(addr) = cfg.metrics_addr.as_deref() {
        if let Err(e) = install_prometheus(addr) {
            warn!(error = %e, addr, "metrics exporter not started");
        }
    }
    if cfg.feeds.is_empty() {
        warn!("no feeds configured; cycles will collect nothing");
    }

    let mut relay = build_relay(&cfg)?;
    let mut elector = build_elector(&cfg);
    let opts = loop_options(&cfg);
    info!(
        owner = elector.owner(),
        one_shot = opts.one_shot,
        poll_secs = opts.poll_interval.as_secs(),
        "news relay starting"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };
    run_leader_loop(&mut relay, &mut elector, &opts, shutdown).await;
    info!("news relay stopped");
    Ok(())
}

// ===============================
// src/main.rs
// ===============================
//
// mmbot: single-venue, single-symbol spot market-making engine.
//
// Pipeline: market-data ingress -> order book -> top-of-book bus -> quoting
// strategy -> order manager -> venue, with fills flowing back through the
// ledger into the risk supervisor. One optional CLI argument: the path to a
// key=value configuration document (process env overrides it).
//
// Exit codes: 0 on clean shutdown, 1 on fatal initialization error.
// First interrupt shuts down gracefully; a second one forces exit.
//
mod book;
mod cache;
mod config;
mod domain;
mod engine;
mod error;
mod feed;
mod gateway;
mod ledger;
mod metrics;
mod orders;
mod quoter;
mod recorder;
mod risk;
mod strategy;
mod venue;

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::engine::Engine;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args().nth(1);

    let cfg = match config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("mmbot: {e}");
            return ExitCode::from(1);
        }
    };

    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.system.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(cfg.system.metrics_port));

    info!(
        mode = cfg.mode.as_str(),
        symbol = %cfg.symbol.symbol,
        base = %cfg.symbol.base_asset,
        quote = %cfg.symbol.quote_asset,
        tick_size = %cfg.strategy.tick_size,
        order_qty = %cfg.strategy.order_qty,
        num_levels = cfg.strategy.num_levels,
        position_limit = %cfg.risk.position_limit,
        metrics_port = cfg.system.metrics_port,
        "startup config"
    );

    match Engine::new(cfg).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "engine terminated with a fatal error");
            ExitCode::from(1)
        }
    }
}

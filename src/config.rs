// ===============================
// src/config.rs
// ===============================
//
// Configuration comes from a key=value document (optional CLI path) with a
// process-env overlay on top. Precedence: env > file > default.
//
// Example document:
//   TRADING_SYMBOL=ETH-USD
//   ORDER_SIZE=0.001
//   MAX_POSITION=0.05
//   MODE=paper
//
use std::env;
use std::path::Path;

use dotenvy::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;

/// Venue / execution mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeMode {
    /// Simulated fills, no credentials required.
    Paper,
    /// Real orders against the venue sandbox.
    Testnet,
    /// Real orders against the live venue.
    Live,
}

impl TradeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Some(TradeMode::Paper),
            "testnet" | "sandbox" => Some(TradeMode::Testnet),
            "live" | "mainnet" => Some(TradeMode::Live),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Paper => "paper",
            TradeMode::Testnet => "testnet",
            TradeMode::Live => "live",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SymbolConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

#[derive(Clone, Debug)]
pub struct StrategyConfig {
    pub tick_size: Decimal,
    pub base_offset_ticks: Decimal,
    pub min_spread_ticks: Decimal,
    pub order_qty: Decimal,
    pub inventory_neutral_band: Decimal,
    pub num_levels: u32,
    pub max_position: Decimal,
    pub order_refresh_ms: u64,
    pub order_timeout_s: u64,
    pub cancel_grace_ms: u64,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    /// Sanity band around the last mid, as a fraction (0.05 = +/-5%).
    pub price_band_pct: Decimal,
}

#[derive(Clone, Debug)]
pub struct RiskLimits {
    pub position_limit: Decimal,
    /// Negative number: trading halts when realized daily PnL falls to it.
    pub daily_loss_limit: Decimal,
    /// Positive number: max tolerated drop from peak PnL.
    pub drawdown_limit: Decimal,
    pub order_rate_limit: u32,
    pub circuit_breaker_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct SystemConfig {
    pub ws_url: String,
    pub rest_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub metrics_port: u16,
    pub heartbeat_timeout_s: u64,
    pub max_reconnect_attempts: u32,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub cache_path: Option<String>,
    pub trades_log: String,
    pub pnl_log: String,
    pub summary_log: String,
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: TradeMode,
    pub symbol: SymbolConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskLimits,
    pub system: SystemConfig,
}

/// Load the config document (if a path is given), overlay process env, and
/// fill defaults. An explicit path that cannot be read is fatal.
pub fn load(path: Option<&str>) -> Result<Config, EngineError> {
    let _ = dotenv();

    if let Some(p) = path {
        load_document(p)?;
    }

    let mode = get("MODE")
        .as_deref()
        .and_then(TradeMode::parse)
        .unwrap_or(TradeMode::Paper);

    let symbol = SymbolConfig {
        symbol: get("TRADING_SYMBOL").unwrap_or_else(|| "ETH-USD".to_string()),
        base_asset: get("BASE_ASSET").unwrap_or_else(|| "ETH".to_string()),
        quote_asset: get("QUOTE_ASSET").unwrap_or_else(|| "USD".to_string()),
    };

    let strategy = StrategyConfig {
        tick_size: get_decimal("TICK_SIZE", dec!(0.01)),
        base_offset_ticks: get_decimal("BASE_OFFSET_TICKS", dec!(0.25)),
        min_spread_ticks: get_decimal("MIN_SPREAD_TICKS", dec!(0.5)),
        order_qty: get_decimal("ORDER_SIZE", dec!(0.001)),
        inventory_neutral_band: get_decimal("INVENTORY_NEUTRAL_BAND", dec!(0.01)),
        num_levels: get_parse("NUM_LEVELS", 3u32),
        max_position: get_decimal("MAX_POSITION", dec!(0.05)),
        order_refresh_ms: get_parse("ORDER_REFRESH_INTERVAL_MS", 200u64),
        order_timeout_s: get_parse("ORDER_TIMEOUT_S", 1u64),
        cancel_grace_ms: get_parse("CANCEL_GRACE_MS", 500u64),
        min_qty: get_decimal("MIN_QTY", dec!(0.001)),
        max_qty: get_decimal("MAX_QTY", dec!(10)),
        price_band_pct: get_decimal("PRICE_BAND_PCT", dec!(0.05)),
    };

    let risk = RiskLimits {
        position_limit: get_decimal("POSITION_LIMIT", dec!(0.05)),
        daily_loss_limit: -get_decimal("MAX_DAILY_LOSS_LIMIT", dec!(100)).abs(),
        drawdown_limit: get_decimal("MAX_DRAWDOWN_LIMIT", dec!(50)).abs(),
        order_rate_limit: get_parse("ORDER_RATE_LIMIT", 50u32),
        circuit_breaker_enabled: get("CIRCUIT_BREAKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true),
    };

    let system = SystemConfig {
        ws_url: get("VENUE_WS_URL").unwrap_or_else(|| default_ws_url(mode).to_string()),
        rest_url: get("VENUE_REST_URL").unwrap_or_else(|| default_rest_url(mode).to_string()),
        api_key: get("VENUE_API_KEY"),
        api_secret: get("VENUE_API_SECRET"),
        metrics_port: get_parse("METRICS_PORT", 9898u16),
        heartbeat_timeout_s: get_parse("HEARTBEAT_TIMEOUT_S", 60u64),
        max_reconnect_attempts: get_parse("MAX_RECONNECT_ATTEMPTS", 10u32),
        request_timeout_ms: get_parse("REQUEST_TIMEOUT_MS", 5000u64),
        max_retries: get_parse("MAX_RETRIES", 3u32),
        cache_path: get("ORDER_CACHE_PATH"),
        trades_log: get("TRADES_LOG").unwrap_or_else(|| "logs/trades.jsonl".to_string()),
        pnl_log: get("PNL_LOG").unwrap_or_else(|| "logs/pnl.jsonl".to_string()),
        summary_log: get("SUMMARY_LOG").unwrap_or_else(|| "logs/session_summary.jsonl".to_string()),
        log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
    };

    if mode != TradeMode::Paper && (system.api_key.is_none() || system.api_secret.is_none()) {
        return Err(EngineError::Fatal(
            "VENUE_API_KEY / VENUE_API_SECRET required outside paper mode".to_string(),
        ));
    }

    Ok(Config {
        mode,
        symbol,
        strategy,
        risk,
        system,
    })
}

/// Read a key=value document into the process environment so the env overlay
/// keeps precedence. Lines starting with '#' and blank lines are skipped.
fn load_document(path: &str) -> Result<(), EngineError> {
    if !Path::new(path).exists() {
        return Err(EngineError::Fatal(format!("config file not found: {path}")));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Fatal(format!("config file {path}: {e}")))?;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let key = k.trim();
            if env::var(key).is_err() {
                env::set_var(key, v.trim());
            }
        }
    }
    Ok(())
}

fn get(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_decimal(key: &str, default: Decimal) -> Decimal {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_ws_url(mode: TradeMode) -> &'static str {
    match mode {
        TradeMode::Paper | TradeMode::Testnet => "wss://ws-feed-sandbox.example-venue.com",
        TradeMode::Live => "wss://ws-feed.example-venue.com",
    }
}

fn default_rest_url(mode: TradeMode) -> &'static str {
    match mode {
        TradeMode::Paper | TradeMode::Testnet => "https://api-sandbox.example-venue.com",
        TradeMode::Live => "https://api.example-venue.com",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn document_fills_unset_keys_only() {
        let dir = std::env::temp_dir();
        let path = dir.join("mmbot_config_test.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "MMBOT_TEST_DOC_KEY=from_file").unwrap();
        writeln!(f, "MMBOT_TEST_ENV_KEY=from_file").unwrap();

        env::set_var("MMBOT_TEST_ENV_KEY", "from_env");
        env::remove_var("MMBOT_TEST_DOC_KEY");

        load_document(path.to_str().unwrap()).unwrap();
        assert_eq!(env::var("MMBOT_TEST_DOC_KEY").unwrap(), "from_file");
        assert_eq!(env::var("MMBOT_TEST_ENV_KEY").unwrap(), "from_env");

        env::remove_var("MMBOT_TEST_DOC_KEY");
        env::remove_var("MMBOT_TEST_ENV_KEY");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_document_is_fatal() {
        let err = load(Some("/nonexistent/mmbot.conf")).unwrap_err();
        assert!(matches!(err, EngineError::Fatal(_)));
    }

    #[test]
    fn loss_limit_is_normalized_negative() {
        env::set_var("MAX_DAILY_LOSS_LIMIT", "3.0");
        let cfg = load(None).unwrap();
        assert_eq!(cfg.risk.daily_loss_limit, dec!(-3.0));
        env::remove_var("MAX_DAILY_LOSS_LIMIT");
    }
}

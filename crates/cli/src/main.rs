//! ta-report: technical-signal report for a single instrument
//!
//! Usage:
//!   ta-report analyze --symbol BTCUSDT         Fetch weekly Binance bars and print a report
//!   ta-report file --input bars.json --json    Analyse bars from a JSON file
//!   ta-report serve --port 3002                Serve the JSON analysis API

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::{Args, Parser, Subcommand};
use engine::{analyze, AnalysisConfig, Bar, EngineError, Series, TechnicalReport};
use market_data::{
    BarSource, BinanceClient, BinanceSource, JsonFileSource, DEFAULT_BARS, DEFAULT_INTERVAL,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

/// Overrides the Binance REST base URL (mirrors, local proxies)
const BINANCE_URL_ENV: &str = "TA_REPORT_BINANCE_URL";

/// Upper bound on bars requested through the HTTP API
const MAX_API_BARS: usize = 5000;

#[derive(Parser)]
#[command(name = "ta-report")]
#[command(about = "Support/resistance, RSI, MACD and trend report for one instrument", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars from Binance and analyse them
    Analyze {
        /// Trading pair, e.g. BTCUSDT
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        /// Kline interval
        #[arg(long, default_value = DEFAULT_INTERVAL)]
        interval: String,
        /// Number of most recent bars to analyse
        #[arg(long, default_value_t = DEFAULT_BARS)]
        bars: usize,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Analyse a JSON array of bars from disk
    File {
        /// Path to the bar file
        #[arg(short, long)]
        input: PathBuf,
        /// Label shown in the report header
        #[arg(long)]
        symbol: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Launch the analysis web API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

/// Tunables shared by every subcommand
#[derive(Args, Debug, Clone)]
struct AnalysisArgs {
    /// Relative band within which a close retouches a level
    #[arg(long, default_value_t = 0.01)]
    level_tolerance: f64,
    /// Minimum retouches for a price to count as a level
    #[arg(long, default_value_t = 3)]
    min_retouch: usize,
    /// Relative distance at which price is "near" a level
    #[arg(long, default_value_t = 0.02)]
    proximity: f64,
    /// Cluster width as a fraction of the current price
    #[arg(long, default_value_t = 0.05)]
    interval_pct: f64,
    /// Clusters kept per side
    #[arg(long, default_value_t = 3)]
    max_intervals: usize,
    /// Trend SMA window
    #[arg(long, default_value_t = 50)]
    sma_window: usize,
}

impl AnalysisArgs {
    fn to_config(&self) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.levels.tolerance = self.level_tolerance;
        config.levels.min_retouch = self.min_retouch;
        config.classifiers.proximity_tolerance = self.proximity;
        config.clusters.interval_pct = self.interval_pct;
        config.clusters.max_intervals = self.max_intervals;
        config.indicators.sma_window = Some(self.sma_window);
        config
    }
}

#[derive(Clone)]
struct AppState {
    binance: Arc<BinanceClient>,
    config: Arc<AnalysisConfig>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("info,engine=debug,market_data=debug,ta_report=debug")
    } else {
        EnvFilter::new("warn,engine=info,market_data=info,ta_report=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn binance_client() -> BinanceClient {
    match std::env::var(BINANCE_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => {
            info!(url = %url, "Using Binance base URL from {}", BINANCE_URL_ENV);
            BinanceClient::with_base_url(url.trim())
        }
        _ => BinanceClient::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Analyze {
            symbol,
            interval,
            bars,
            json,
            analysis,
        } => {
            let source = BinanceSource::new(binance_client(), &symbol, &interval, bars);
            let label = symbol.to_uppercase();
            cmd_report(&source, Some(label), &analysis.to_config(), json).await?;
        }
        Commands::File {
            input,
            symbol,
            json,
            analysis,
        } => {
            let source = JsonFileSource::new(input);
            cmd_report(&source, symbol, &analysis.to_config(), json).await?;
        }
        Commands::Serve {
            host,
            port,
            analysis,
        } => {
            cmd_serve(&host, port, analysis.to_config()).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Report commands
// ============================================================================

async fn cmd_report(
    source: &dyn BarSource,
    symbol: Option<String>,
    config: &AnalysisConfig,
    json: bool,
) -> anyhow::Result<()> {
    let series = source.fetch().await?;
    info!(source = %source.describe(), bars = series.len(), "Bars loaded");

    let mut report = analyze(&series, config)?;
    if let Some(symbol) = symbol {
        report = report.with_symbol(symbol);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}\n", report);
    }
    Ok(())
}

// ============================================================================
// Serve command: Axum web server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/analysis", get(api_analyze_symbol).post(api_analyze_bars))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

async fn cmd_serve(host: &str, port: u16, config: AnalysisConfig) -> anyhow::Result<()> {
    info!("ta-report v{} starting...", APP_VERSION);

    let binance = binance_client();
    let upstream = binance.base_url().to_string();
    let state = AppState {
        binance: Arc::new(binance),
        config: Arc::new(config),
    };
    let app = build_router(state);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== ta-report v{} ===", APP_VERSION);
    println!("Technical Analysis API");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/analysis            - Analyse Binance bars (?symbol=&interval=&limit=)");
    println!("  POST /api/analysis            - Analyse a JSON array of bars");
    println!("\n  Binance: {}", upstream);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

/// JSON error body with a matching status code
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn upstream(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: format!("Failed to fetch bars: {:#}", err),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::InvalidSeries(_) | EngineError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::InsufficientData { .. } | EngineError::EmptyLevels => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ta-report",
        "version": APP_VERSION,
    }))
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    #[serde(default = "default_symbol")]
    symbol: String,
    interval: Option<String>,
    limit: Option<usize>,
}

/// GET /api/analysis?symbol=BTCUSDT&interval=1w&limit=260
async fn api_analyze_symbol(
    State(state): State<AppState>,
    Query(params): Query<AnalysisQuery>,
) -> Result<Json<TechnicalReport>, ApiError> {
    let interval = params
        .interval
        .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
    let limit = params.limit.unwrap_or(DEFAULT_BARS).clamp(1, MAX_API_BARS);

    let source = BinanceSource::new(
        state.binance.as_ref().clone(),
        &params.symbol,
        &interval,
        limit,
    );
    let series = source.fetch().await.map_err(|e| {
        error!("Bar fetch error for {}: {:#}", source.describe(), e);
        ApiError::upstream(e)
    })?;

    let report = analyze(&series, &state.config)?.with_symbol(params.symbol.to_uppercase());
    Ok(Json(report))
}

/// POST /api/analysis with a JSON array of bars
async fn api_analyze_bars(
    State(state): State<AppState>,
    Json(bars): Json<Vec<Bar>>,
) -> Result<Json<TechnicalReport>, ApiError> {
    let series = Series::new(bars).map_err(|e| {
        warn!("Rejected posted bars: {}", e);
        ApiError::from(e)
    })?;
    let report = analyze(&series, &state.config)?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use clap::CommandFactory;

    fn test_state() -> AppState {
        AppState {
            binance: Arc::new(BinanceClient::with_base_url("http://127.0.0.1:9")),
            config: Arc::new(AnalysisConfig::default()),
        }
    }

    fn weekly_bars(closes: &[f64]) -> Vec<Bar> {
        let start = DateTime::<Utc>::from_timestamp(1_577_836_800, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::weeks(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_args_match_default_config() {
        let cli = Cli::try_parse_from(["ta-report", "file", "--input", "bars.json"]).unwrap();
        let Commands::File { analysis, json, .. } = cli.command else {
            panic!("expected file command");
        };
        assert!(!json);
        assert_eq!(analysis.to_config(), AnalysisConfig::default());
    }

    #[test]
    fn test_analysis_flags_override_config() {
        let cli = Cli::try_parse_from([
            "ta-report",
            "analyze",
            "--symbol",
            "ethusdt",
            "--min-retouch",
            "4",
            "--proximity",
            "0.03",
            "--sma-window",
            "20",
        ])
        .unwrap();
        let Commands::Analyze {
            symbol,
            interval,
            bars,
            analysis,
            ..
        } = cli.command
        else {
            panic!("expected analyze command");
        };
        assert_eq!(symbol, "ethusdt");
        assert_eq!(interval, DEFAULT_INTERVAL);
        assert_eq!(bars, DEFAULT_BARS);

        let config = analysis.to_config();
        assert_eq!(config.levels.min_retouch, 4);
        assert_eq!(config.classifiers.proximity_tolerance, 0.03);
        assert_eq!(config.indicators.sma_window, Some(20));
    }

    #[test]
    fn test_engine_errors_map_to_status() {
        let err = ApiError::from(EngineError::InsufficientData {
            required: 50,
            actual: 10,
        });
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.contains("50"));

        let err = ApiError::from(EngineError::InvalidSeries("bad".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_bars_returns_report() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let Json(report) = api_analyze_bars(State(test_state()), Json(weekly_bars(&closes)))
            .await
            .unwrap();
        assert_eq!(report.bars, 60);
        assert_eq!(report.current_price, 159.0);
        assert_eq!(report.signals.len(), 4);
    }

    #[tokio::test]
    async fn test_post_short_history_is_unprocessable() {
        let err = api_analyze_bars(State(test_state()), Json(weekly_bars(&[100.0; 10])))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_post_unordered_bars_is_bad_request() {
        let mut bars = weekly_bars(&[100.0; 60]);
        bars.swap(3, 4);
        let err = api_analyze_bars(State(test_state()), Json(bars))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = api_health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "ta-report");
    }
}

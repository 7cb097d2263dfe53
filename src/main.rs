use clap::{Parser, Subcommand};
use matchbook::feed::{self, FeedConfig};
use matchbook::fix::{self, SessionSettings};
use matchbook::market_maker::{self, MakerConfig};
use matchbook::state::AppState;
use matchbook::symbol::Symbol;
use matchbook::utils::shutdown_token;
use matchbook::{api, errors::EngineError};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "matchbook")]
#[command(
    version = "0.1",
    about = "Multi-symbol price-time-priority matching engine with an HTTP/WS gateway"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gateway with in-process market makers
    Server {
        #[arg(long, default_value_t = 18080)]
        port: u16,
        /// Symbols quoted by the background market makers
        #[arg(long, value_delimiter = ',', default_value = "AAPL,MSFT")]
        maker_symbols: Vec<String>,
        #[arg(long, default_value_t = 3000)]
        maker_pace_ms: u64,
    },
    /// Server plus a synthetic order feed, for local demos
    Simulate {
        #[arg(long, default_value_t = 18080)]
        port: u16,
        /// 0 runs until ctrl-c
        #[arg(long, default_value_t = 0)]
        secs: u64,
    },
    /// Drive randomized orders against an already-running gateway
    Feed {
        #[arg(long, default_value = "http://127.0.0.1:18080")]
        api_base: String,
        #[arg(long, value_delimiter = ',', default_value = "AAPL,MSFT")]
        symbols: Vec<String>,
        #[arg(long, default_value_t = 5.0)]
        rate_hz: f64,
        #[arg(long)]
        secs: Option<u64>,
    },
    /// Bridge FIX 4.4 NewOrderSingle flow into the gateway
    Fix {
        /// quickfix-style session settings file
        settings: PathBuf,
        #[arg(long, default_value = "http://127.0.0.1:18080")]
        api_base: String,
    },
}

fn parse_symbols(raw: &[String]) -> Result<Vec<Symbol>, EngineError> {
    raw.iter().map(|s| s.parse()).collect()
}

async fn serve(port: u16, state: AppState, token: CancellationToken) -> anyhow::Result<()> {
    let app = api::router(state);
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("HTTP/WS gateway listening on 0.0.0.0:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}

async fn wait_for_server(api_base: &str, symbol: &Symbol) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    loop {
        match client
            .get(format!("{api_base}/order_count?symbol={symbol}"))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => break,
            _ => tokio::time::sleep(Duration::from_millis(25)).await,
        };
    }
    Ok(())
}

/// Seed each book with a resting bid @98 and ask @102 so the first feed
/// orders have something to cross.
async fn seed_books(api_base: &str, symbols: &[Symbol]) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    for symbol in symbols {
        for (side, price) in [("B", 98.0), ("S", 102.0)] {
            client
                .post(format!("{api_base}/add_order"))
                .json(&json!({
                    "symbol": symbol,
                    "id": u64::from(rand::random::<u32>()),
                    "price": price,
                    "quantity": 10,
                    "side": side,
                }))
                .send()
                .await?
                .error_for_status()?;
            tracing::info!(symbol = %symbol, side, price, "seeded resting order");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let token = shutdown_token();
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            maker_symbols,
            maker_pace_ms,
        } => {
            let state = AppState::new();
            let mut tasks = tokio::task::JoinSet::new();
            for symbol in parse_symbols(&maker_symbols)? {
                let mut cfg = MakerConfig::for_symbol(symbol);
                cfg.pace = Duration::from_millis(maker_pace_ms);
                tasks.spawn(market_maker::run_market_maker(
                    state.books.clone(),
                    cfg,
                    token.clone(),
                ));
            }
            serve(port, state, token.clone()).await?;
            token.cancel();
            while tasks.join_next().await.is_some() {}
        }
        Commands::Simulate { port, secs } => {
            let state = AppState::new();
            let symbols = parse_symbols(&["AAPL".to_string(), "MSFT".to_string()])?;
            let mut tasks = tokio::task::JoinSet::new();

            for symbol in &symbols {
                tasks.spawn(market_maker::run_market_maker(
                    state.books.clone(),
                    MakerConfig::for_symbol(symbol.clone()),
                    token.clone(),
                ));
            }

            let server_state = state.clone();
            let server_token = token.clone();
            tasks.spawn(async move {
                if let Err(e) = serve(port, server_state, server_token).await {
                    tracing::error!("server exited: {e:?}");
                }
            });

            let base = format!("http://127.0.0.1:{port}");
            wait_for_server(&base, &symbols[0]).await?;
            seed_books(&base, &symbols).await?;

            for symbol in &symbols {
                tasks.spawn(feed::watch_live_count(
                    base.clone(),
                    symbol.clone(),
                    token.clone(),
                ));
            }

            let run = feed::run_feed(
                FeedConfig {
                    api_base: base,
                    symbols,
                    run_secs: if secs == 0 { None } else { Some(secs) },
                    rate_hz: 5.0,
                    noise_sigma: 0.5,
                    mean_qty: 4.0,
                },
                token.clone(),
            )
            .await;
            token.cancel();
            while tasks.join_next().await.is_some() {}
            run?;
        }
        Commands::Feed {
            api_base,
            symbols,
            rate_hz,
            secs,
        } => {
            let symbols = parse_symbols(&symbols)?;
            let mut tasks = tokio::task::JoinSet::new();
            for symbol in &symbols {
                tasks.spawn(feed::watch_live_count(
                    api_base.clone(),
                    symbol.clone(),
                    token.clone(),
                ));
            }
            let run = feed::run_feed(
                FeedConfig {
                    api_base,
                    symbols,
                    run_secs: secs,
                    rate_hz,
                    noise_sigma: 0.5,
                    mean_qty: 4.0,
                },
                token.clone(),
            )
            .await;
            token.cancel();
            while tasks.join_next().await.is_some() {}
            run?;
        }
        Commands::Fix { settings, api_base } => {
            let settings = SessionSettings::from_file(&settings)?;
            fix::run_fix_bridge(settings, &api_base, token).await?;
        }
    }
    Ok(())
}

//! Synthetic order feed driven against a running gateway over HTTP, plus a
//! WebSocket watcher for the live order count stream.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMsg};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::symbol::Symbol;

#[derive(Clone)]
pub struct FeedConfig {
    pub api_base: String,
    pub symbols: Vec<Symbol>,
    /// `None` runs until cancelled.
    pub run_secs: Option<u64>,
    /// Poisson order rate, per second.
    pub rate_hz: f64,
    /// N(0, sigma) drift applied to each symbol's mid per tick.
    pub noise_sigma: f64,
    /// Average order size (unit-exponential times this).
    pub mean_qty: f64,
}

#[derive(Deserialize)]
struct AddAck {
    status: String,
    order_id: u64,
}

/// Noisy limit-order loop: every exponential inter-arrival, quote one random
/// symbol a tick away from its drifting mid and POST it to `/add_order`.
/// Rejections (random ids do collide) are logged and skipped.
pub async fn run_feed(cfg: FeedConfig, token: CancellationToken) -> anyhow::Result<()> {
    anyhow::ensure!(!cfg.symbols.is_empty(), "feed needs at least one symbol");
    let client: Client = ClientBuilder::new()
        .timeout(Duration::from_secs(5))
        .build()?;

    let ia = Exp::new(cfg.rate_hz).expect("rate_hz must be > 0");
    let drift = Normal::new(0.0, cfg.noise_sigma).expect("noise_sigma >= 0");
    let size = Exp1;

    let mut mids: HashMap<Symbol, f64> =
        cfg.symbols.iter().map(|s| (s.clone(), 100.0)).collect();
    let spread = 1.0_f64;
    let mut sent: u64 = 0;
    let start = Instant::now();

    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }

        let wait_secs: f64 = ia.sample(&mut rand::rng());
        tokio::select! {
            _ = token.cancelled() => {
                info!("received shutdown; exiting feed loop");
                break;
            }
            _ = sleep(Duration::from_secs_f64(wait_secs)) => {}
        }

        let (symbol, price, side, qty) = {
            let mut rng = rand::rng();
            let symbol = cfg.symbols[rng.random_range(0..cfg.symbols.len())].clone();
            let mid = mids
                .get_mut(&symbol)
                .expect("every configured symbol has a mid");
            *mid = (*mid + drift.sample(&mut rng)).max(2.0);

            let (price, side) = if rng.random_bool(0.5) {
                (*mid - spread, "B")
            } else {
                (*mid + spread, "S")
            };
            let unit: f64 = size.sample(&mut rng);
            let qty = (unit * cfg.mean_qty).max(1.0).round() as u32;
            (symbol, price.max(1.0), side, qty)
        };
        let id: u64 = rand::rng().random_range(50_000..150_000);

        match client
            .post(format!("{}/add_order", cfg.api_base))
            .json(&json!({
                "symbol": symbol,
                "id": id,
                "price": price,
                "quantity": qty,
                "side": side,
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if let Err(e) = resp.error_for_status_ref() {
                    warn!(error = %e, "order post returned non-success");
                    continue;
                }
                match resp.json::<AddAck>().await {
                    Ok(ack) => {
                        sent += 1;
                        info!(
                            elapsed = format_args!("{:.1}s", start.elapsed().as_secs_f64()),
                            symbol = %symbol,
                            side,
                            qty,
                            price = format_args!("{:.2}", price),
                            order_id = ack.order_id,
                            status = %ack.status,
                            sent,
                            "feed tick"
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to parse add_order ack"),
                }
            }
            Err(e) => {
                warn!(error = %e, "HTTP request failed");
                continue;
            }
        }
    }

    info!(sent, "feed done");
    Ok(())
}

/// Subscribes to `/ws`, announces `symbol`, and logs every live count line
/// the gateway pushes until cancelled.
pub async fn watch_live_count(api_base: String, symbol: Symbol, token: CancellationToken) {
    let ws_url = format!(
        "ws://{host}/ws",
        host = api_base.trim_start_matches("http://")
    );
    let ws_stream = loop {
        if token.is_cancelled() {
            return;
        }
        match connect_async(&ws_url).await {
            Ok((stream, _)) => {
                info!(symbol = %symbol, "live count watcher connected");
                break stream;
            }
            Err(e) => {
                warn!("watcher ws connect failed: {e}; retrying...");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };

    let (mut write, mut read) = ws_stream.split();
    if let Err(e) = write.send(WsMsg::Text(symbol.to_string().into())).await {
        warn!("watcher failed to send symbol: {e}");
        return;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(WsMsg::Text(line))) => info!(feed = %line, "live count"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("watcher ws error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    orders::{OrderType, Side},
    store::BookStore,
    symbol::Symbol,
};

// # Market Maker
//
// A stateless background task that keeps one instrument liquid: every pace
// tick it posts a fresh random bid and a fresh random ask straight into the
// command surface. It holds no view of the book and never cancels its own
// quotes; resting orders pile up as naturally stale liquidity for the feed
// and benchmark traffic to cross.

#[derive(Clone)]
pub struct MakerConfig {
    pub symbol: Symbol,
    /// Delay between quote pairs.
    pub pace: Duration,
    /// Quotes land in `[base_price, base_price + 10.0)`.
    pub base_price: f64,
    /// Quote sizes are uniform in `1..=qty_max`.
    pub qty_max: u32,
}

impl MakerConfig {
    pub fn for_symbol(symbol: Symbol) -> Self {
        Self {
            symbol,
            pace: Duration::from_secs(3),
            base_price: 100.0,
            qty_max: 50,
        }
    }
}

/// Order ids must be unique per book; a v4 uuid folded to 64 bits never
/// collides with the feed's small numeric ranges.
fn synthetic_id() -> u64 {
    Uuid::new_v4().as_u128() as u64
}

/// Posts one random bid/ask pair per tick until cancelled.
pub async fn run_market_maker(books: Arc<BookStore>, cfg: MakerConfig, token: CancellationToken) {
    info!(symbol = %cfg.symbol, pace_ms = cfg.pace.as_millis() as u64, "market maker starting");
    let mut interval = time::interval(cfg.pace);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(symbol = %cfg.symbol, "market maker shutting down");
                break;
            }
            _ = interval.tick() => {
                let mut rng = rand::rng();
                let bid_price = cfg.base_price + f64::from(rng.random_range(0..100)) / 10.0;
                let ask_price = cfg.base_price + f64::from(rng.random_range(0..100)) / 10.0;
                let bid_qty = rng.random_range(1..=cfg.qty_max);
                let ask_qty = rng.random_range(1..=cfg.qty_max);

                if let Err(e) = books.add(
                    &cfg.symbol, synthetic_id(), bid_price, bid_qty, Side::Buy, OrderType::Limit,
                ) {
                    warn!(symbol = %cfg.symbol, reason = %e, "maker bid rejected");
                }
                if let Err(e) = books.add(
                    &cfg.symbol, synthetic_id(), ask_price, ask_qty, Side::Sell, OrderType::Limit,
                ) {
                    warn!(symbol = %cfg.symbol, reason = %e, "maker ask rejected");
                }
                debug!(symbol = %cfg.symbol, bid_price, ask_price, "posted two-sided quotes");
            }
        }
    }
}

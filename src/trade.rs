use serde::Serialize;

use crate::{orders::Side, symbol::Symbol};

/// A trade represents a matched transaction between two orders.
///
/// - `price` comes from the maker (the resting order).
/// - `side` records the aggressor (the incoming order).
/// - `ts_seq` is the taker's admission sequence, so every fill produced by
///   one `add` call carries the same value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: u32,
    pub side: Side,
    pub taker_id: u64,
    pub maker_id: u64,
    pub ts_seq: u64,
}

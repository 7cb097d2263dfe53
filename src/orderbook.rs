use crate::{
    errors::EngineError,
    orders::{Order, OrderType, Side},
    symbol::Symbol,
    trade::Trade,
};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Most entries a book snapshot will carry.
pub const SNAPSHOT_LIMIT: usize = 200;

/// Most trades a tape read will return (the newest ones win).
pub const TRADE_TAIL_LIMIT: usize = 2000;

type Ladder = BTreeMap<OrderedFloat<f64>, VecDeque<Order>>;

/// One resting order as the snapshot wire format sees it.
#[derive(Debug, Clone, Serialize)]
pub struct BookRow {
    pub price: f64,
    pub quantity: u32,
    pub side: Side,
}

/// An [`OrderBook`] keeps the active orders of one instrument in two
/// price-indexed ladders:
/// - `bids` (buy orders), matched from the highest price down,
/// - `asks` (sell orders), matched from the lowest price up.
///
/// Each price level is a FIFO [`VecDeque`], so priority is price first, then
/// admission order. A side table maps order id to `(side, price)` for O(1)
/// cancel lookup, and every fill is appended to the in-memory trade tape.
///
/// Prices compare as raw IEEE-754 doubles, no tick rounding; NaN and
/// infinities are rejected at admission so the ladder ordering stays total.
pub struct OrderBook {
    symbol: Symbol,
    bids: Ladder,
    asks: Ladder,
    index: HashMap<u64, (Side, f64)>,
    trades: Vec<Trade>,
    next_seq: u64,
    next_trade_id: u64,
}

/// Internal enum to unify forward (`IterMut`) and reverse (`Rev<IterMut>`)
/// ladder iteration: asks are walked ascending, bids descending.
enum EitherIter<'a> {
    Fwd(std::collections::btree_map::IterMut<'a, OrderedFloat<f64>, VecDeque<Order>>),
    Rev(std::iter::Rev<std::collections::btree_map::IterMut<'a, OrderedFloat<f64>, VecDeque<Order>>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = (&'a OrderedFloat<f64>, &'a mut VecDeque<Order>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(iter) => iter.next(),
            EitherIter::Rev(iter) => iter.next(),
        }
    }
}

/// Crosses `incoming` against the opposite ladder while its price condition
/// holds and quantity remains, filling `min(incoming, maker)` per step.
///
/// Fully consumed makers are popped from the queue front and erased from
/// `index`; levels emptied along the way are pruned after the walk. Trades
/// print at the maker's resting price and are appended to `tape` in match
/// order.
fn cross_incoming(
    incoming: &mut Order,
    opposite: &mut Ladder,
    reversed: bool,
    index: &mut HashMap<u64, (Side, f64)>,
    tape: &mut Vec<Trade>,
    next_trade_id: &mut u64,
) {
    let mut exhausted = Vec::new();

    let iter = if reversed {
        EitherIter::Rev(opposite.iter_mut().rev())
    } else {
        EitherIter::Fwd(opposite.iter_mut())
    };

    'ladder: for (&price, queue) in iter {
        if !incoming.crosses(price.into_inner()) {
            break;
        }
        while let Some(maker) = queue.front_mut() {
            let fill = incoming.quantity.min(maker.quantity);

            tape.push(Trade {
                trade_id: *next_trade_id,
                symbol: incoming.symbol.clone(),
                price: maker.price,
                quantity: fill,
                side: incoming.side,
                taker_id: incoming.id,
                maker_id: maker.id,
                ts_seq: incoming.seq,
            });
            *next_trade_id += 1;

            incoming.quantity -= fill;
            maker.quantity -= fill;

            if maker.quantity == 0 {
                index.remove(&maker.id);
                queue.pop_front();
            }
            if queue.is_empty() {
                exhausted.push(price);
            }
            if incoming.quantity == 0 {
                break 'ladder;
            }
        }
    }

    for price in exhausted {
        opposite.remove(&price);
    }
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Ladder::new(),
            asks: Ladder::new(),
            index: HashMap::new(),
            trades: Vec::new(),
            next_seq: 1,
            next_trade_id: 1,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Admit an order: validate, cross against the opposite side, then rest
    /// any limit residual. Market residual is discarded. Returns the fills
    /// this call produced (they are also on the tape).
    pub fn execute(
        &mut self,
        id: u64,
        price: f64,
        quantity: u32,
        side: Side,
        order_type: OrderType,
    ) -> Result<Vec<Trade>, EngineError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::BadPrice);
        }
        if quantity == 0 {
            return Err(EngineError::BadQty);
        }
        if self.index.contains_key(&id) {
            return Err(EngineError::DuplicateId(id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let mut incoming = Order {
            id,
            symbol: self.symbol.clone(),
            price,
            quantity,
            side,
            order_type,
            seq,
        };

        let tape_mark = self.trades.len();
        match side {
            Side::Buy => cross_incoming(
                &mut incoming,
                &mut self.asks,
                false,
                &mut self.index,
                &mut self.trades,
                &mut self.next_trade_id,
            ),
            Side::Sell => cross_incoming(
                &mut incoming,
                &mut self.bids,
                true,
                &mut self.index,
                &mut self.trades,
                &mut self.next_trade_id,
            ),
        }

        if incoming.order_type == OrderType::Limit && incoming.quantity > 0 {
            debug!(id, price, qty = incoming.quantity, "resting limit residual");
            self.rest(incoming);
        }

        Ok(self.trades[tape_mark..].to_vec())
    }

    fn rest(&mut self, order: Order) {
        self.index.insert(order.id, (order.side, order.price));
        let ladder = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        ladder
            .entry(OrderedFloat(order.price))
            .or_default()
            .push_back(order);
    }

    /// Removes a resting order and its index entry, pruning the level if it
    /// empties. The level queue is scanned linearly; levels are short.
    fn take(&mut self, id: u64) -> Option<Order> {
        let (side, price) = self.index.get(&id).copied()?;
        let ladder = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let key = OrderedFloat(price);
        let queue = ladder.get_mut(&key)?;
        let pos = queue.iter().position(|o| o.id == id)?;
        let order = queue.remove(pos);
        if queue.is_empty() {
            ladder.remove(&key);
        }
        self.index.remove(&id);
        order
    }

    pub fn cancel(&mut self, id: u64) -> bool {
        self.take(id).is_some()
    }

    /// Same price and no quantity increase updates in place and keeps the
    /// order's time priority. Any other change removes the order and
    /// re-admits it with a fresh sequence through the matching path, so a
    /// modify that crosses the book trades rather than leaving it crossed.
    pub fn modify(
        &mut self,
        id: u64,
        new_price: f64,
        new_quantity: u32,
    ) -> Result<bool, EngineError> {
        if !new_price.is_finite() || new_price <= 0.0 {
            return Err(EngineError::BadPrice);
        }
        if new_quantity == 0 {
            return Err(EngineError::BadQty);
        }
        let Some(&(side, price)) = self.index.get(&id) else {
            return Ok(false);
        };

        if new_price == price {
            let ladder = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            if let Some(queue) = ladder.get_mut(&OrderedFloat(price)) {
                if let Some(slot) = queue.iter_mut().find(|o| o.id == id) {
                    if new_quantity <= slot.quantity {
                        slot.quantity = new_quantity;
                        return Ok(true);
                    }
                }
            }
        }

        let Some(old) = self.take(id) else {
            return Ok(false);
        };
        self.execute(id, new_price, new_quantity, side, old.order_type)?;
        Ok(true)
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn total_resting_quantity(&self) -> u64 {
        self.bids
            .values()
            .chain(self.asks.values())
            .flatten()
            .map(|o| u64::from(o.quantity))
            .sum()
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|p| p.into_inner())
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|p| p.into_inner())
    }

    /// Bids high-to-low then asks low-to-high, FIFO within each level,
    /// truncated at [`SNAPSHOT_LIMIT`] entries.
    pub fn snapshot(&self) -> Vec<BookRow> {
        let mut rows = Vec::new();
        for queue in self.bids.values().rev() {
            for order in queue {
                if rows.len() == SNAPSHOT_LIMIT {
                    return rows;
                }
                rows.push(BookRow {
                    price: order.price,
                    quantity: order.quantity,
                    side: order.side,
                });
            }
        }
        for queue in self.asks.values() {
            for order in queue {
                if rows.len() == SNAPSHOT_LIMIT {
                    return rows;
                }
                rows.push(BookRow {
                    price: order.price,
                    quantity: order.quantity,
                    side: order.side,
                });
            }
        }
        rows
    }

    /// Tail of the tape in insertion order, oldest first.
    pub fn recent_trades(&self) -> Vec<Trade> {
        let skip = self.trades.len().saturating_sub(TRADE_TAIL_LIMIT);
        self.trades[skip..].to_vec()
    }
}

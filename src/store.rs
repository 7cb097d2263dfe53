use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{
    errors::EngineError,
    orderbook::{BookRow, OrderBook},
    orders::{OrderType, Side},
    symbol::Symbol,
    trade::Trade,
};

/// Process-wide symbol-to-book registry and the synchronous command surface.
///
/// The registry lock covers only the lookup/insert of a book handle; every
/// operation then runs under that book's own lock for its full duration.
/// Lock order is strictly registry then book, and no operation ever holds
/// two book locks. Books are created lazily on first reference and never
/// destroyed.
///
/// A poisoned lock means a caller panicked mid-mutation and the book can no
/// longer be trusted, so acquisition panics rather than serving it.
pub struct BookStore {
    books: Mutex<HashMap<Symbol, Arc<Mutex<OrderBook>>>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }

    fn book(&self, symbol: &Symbol) -> Arc<Mutex<OrderBook>> {
        let mut books = self.books.lock().expect("book registry lock poisoned");
        books
            .entry(symbol.clone())
            .or_insert_with(|| {
                debug!(symbol = %symbol, "creating order book");
                Arc::new(Mutex::new(OrderBook::new(symbol.clone())))
            })
            .clone()
    }

    /// Number of books the registry currently holds.
    pub fn book_count(&self) -> usize {
        self.books.lock().expect("book registry lock poisoned").len()
    }

    /// Admit an order into `symbol`'s book, crossing it against resting
    /// liquidity. Returns the fills this call produced.
    pub fn add(
        &self,
        symbol: &Symbol,
        id: u64,
        price: f64,
        quantity: u32,
        side: Side,
        order_type: OrderType,
    ) -> Result<Vec<Trade>, EngineError> {
        let book = self.book(symbol);
        let mut book = book.lock().expect("order book lock poisoned");
        book.execute(id, price, quantity, side, order_type)
    }

    /// `true` if the order was resting and has been removed.
    pub fn cancel(&self, symbol: &Symbol, id: u64) -> bool {
        let book = self.book(symbol);
        let mut book = book.lock().expect("order book lock poisoned");
        book.cancel(id)
    }

    /// `Ok(false)` when no such order rests in the book.
    pub fn modify(
        &self,
        symbol: &Symbol,
        id: u64,
        new_price: f64,
        new_quantity: u32,
    ) -> Result<bool, EngineError> {
        let book = self.book(symbol);
        let mut book = book.lock().expect("order book lock poisoned");
        book.modify(id, new_price, new_quantity)
    }

    pub fn order_count(&self, symbol: &Symbol) -> usize {
        let book = self.book(symbol);
        let book = book.lock().expect("order book lock poisoned");
        book.order_count()
    }

    pub fn snapshot(&self, symbol: &Symbol) -> Vec<BookRow> {
        let book = self.book(symbol);
        let book = book.lock().expect("order book lock poisoned");
        book.snapshot()
    }

    pub fn trades(&self, symbol: &Symbol) -> Vec<Trade> {
        let book = self.book(symbol);
        let book = book.lock().expect("order book lock poisoned");
        book.recent_trades()
    }

    /// Sum of all resting quantities in `symbol`'s book.
    pub fn total_resting_quantity(&self, symbol: &Symbol) -> u64 {
        let book = self.book(symbol);
        let book = book.lock().expect("order book lock poisoned");
        book.total_resting_quantity()
    }
}

impl Default for BookStore {
    fn default() -> Self {
        Self::new()
    }
}

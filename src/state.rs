use crate::store::BookStore;
use std::sync::Arc;

/// Shared handle the HTTP layer clones into every handler.
#[derive(Clone)]
pub struct AppState {
    pub books: Arc<BookStore>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            books: Arc::new(BookStore::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}

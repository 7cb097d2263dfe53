use thiserror::Error;

/// Admission-time rejections from the matching core.
///
/// A rejected command leaves the book untouched. "Order not found" is not an
/// error: `cancel`/`modify` report it through their return value instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid symbol `{0}`: expected 1-8 ASCII characters")]
    BadSymbol(String),

    #[error("side must be 'B' or 'S'")]
    BadSide,

    #[error("price must be a positive finite number")]
    BadPrice,

    #[error("quantity must be > 0")]
    BadQty,

    #[error("order id {0} already rests in this book")]
    DuplicateId(u64),
}

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{errors::EngineError, symbol::Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,  // bid
    Sell, // ask
}

impl Side {
    /// Single-byte wire code.
    pub fn code(self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
        }
    }

    pub fn from_code(c: char) -> Result<Self, EngineError> {
        match c {
            'B' => Ok(Side::Buy),
            'S' => Ok(Side::Sell),
            _ => Err(EngineError::BadSide),
        }
    }
}

impl Serialize for Side {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(match self {
            Side::Buy => "B",
            Side::Sell => "S",
        })
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Side::from_code(c).map_err(de::Error::custom),
            _ => Err(de::Error::custom(EngineError::BadSide)),
        }
    }
}

/// Wire-encoded as `0` (limit) or `1` (market); limit when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

impl Serialize for OrderType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(match self {
            OrderType::Limit => 0,
            OrderType::Market => 1,
        })
    }
}

impl<'de> Deserialize<'de> for OrderType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(OrderType::Limit),
            1 => Ok(OrderType::Market),
            other => Err(de::Error::custom(format!(
                "order_type must be 0 (limit) or 1 (market), got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: u32,
    pub side: Side,
    pub order_type: OrderType,
    /// Per-book admission sequence; the FIFO tie-break within a price level.
    pub seq: u64,
}

impl Order {
    /// Whether a resting level at `level_price` is acceptable to this order.
    /// Equality at the limit edge is a match.
    pub fn crosses(&self, level_price: f64) -> bool {
        match self.order_type {
            OrderType::Market => true,
            OrderType::Limit => match self.side {
                Side::Buy => level_price <= self.price,
                Side::Sell => level_price >= self.price,
            },
        }
    }
}

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Fixed-width field size of the legacy wire format.
pub const SYMBOL_WIDTH: usize = 8;

/// Instrument identifier: 1-8 ASCII characters, stored trimmed.
///
/// Legacy inputs arrive right-padded with spaces to [`SYMBOL_WIDTH`]; the
/// padding is stripped on construction so equality and hashing always compare
/// the trimmed bytes. [`Symbol::padded`] reproduces the fixed-width form for
/// consumers that still expect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim_matches(' ');
        if trimmed.is_empty()
            || trimmed.len() > SYMBOL_WIDTH
            || !trimmed.bytes().all(|b| b.is_ascii_graphic())
        {
            return Err(EngineError::BadSymbol(raw.to_string()));
        }
        Ok(Symbol(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 8-byte space-padded form.
    pub fn padded(&self) -> [u8; SYMBOL_WIDTH] {
        let mut out = [b' '; SYMBOL_WIDTH];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Symbol::new(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_input_equals_trimmed() {
        let wide = Symbol::new("AAPL    ").unwrap();
        let tight = Symbol::new("AAPL").unwrap();
        assert_eq!(wide, tight);
        assert_eq!(wide.as_str(), "AAPL");
    }

    #[test]
    fn padded_output_is_fixed_width() {
        let s = Symbol::new("MSFT").unwrap();
        assert_eq!(&s.padded(), b"MSFT    ");
    }

    #[test]
    fn full_width_symbol_round_trips() {
        let s = Symbol::new("BRKHATHA").unwrap();
        assert_eq!(&s.padded(), b"BRKHATHA");
    }

    #[test]
    fn rejects_empty_oversized_and_non_ascii() {
        assert!(matches!(Symbol::new(""), Err(EngineError::BadSymbol(_))));
        assert!(matches!(Symbol::new("    "), Err(EngineError::BadSymbol(_))));
        assert!(matches!(
            Symbol::new("TOOLONGSYM"),
            Err(EngineError::BadSymbol(_))
        ));
        assert!(matches!(Symbol::new("AA PL"), Err(EngineError::BadSymbol(_))));
        assert!(matches!(Symbol::new("AÄPL"), Err(EngineError::BadSymbol(_))));
    }

    #[test]
    fn serde_round_trip() {
        let s: Symbol = serde_json::from_str("\"AAPL  \"").unwrap();
        assert_eq!(s.as_str(), "AAPL");
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"AAPL\"");
    }
}

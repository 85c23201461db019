//! Curated ticker list loaded from a JSON file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SymbolListError;
use crate::Symbol;

/// One entry of the curated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedSymbol {
    pub symbol: Symbol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Accepts both `"AAPL"` and `{"symbol": "AAPL", "name": "Apple Inc."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Plain(String),
    Named {
        symbol: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Reads and validates the symbol list at `path`.
///
/// The file is a JSON array; entries may be bare tickers or objects with a
/// `symbol` and optional `name`. Every ticker is validated like a request
/// symbol.
pub fn load_symbol_list(path: &Path) -> Result<Vec<ListedSymbol>, SymbolListError> {
    let contents = fs::read_to_string(path).map_err(|source| SymbolListError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<RawEntry> =
        serde_json::from_str(&contents).map_err(|source| SymbolListError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let (raw, name) = match entry {
                RawEntry::Plain(symbol) => (symbol, None),
                RawEntry::Named { symbol, name } => (symbol, name),
            };
            let symbol =
                Symbol::parse(&raw).map_err(|source| SymbolListError::Entry { index, source })?;
            Ok(ListedSymbol { symbol, name })
        })
        .collect()
}

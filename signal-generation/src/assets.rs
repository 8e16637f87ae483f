// Asset Resolution
// Attributes free text (posts, forum calls) to the tokens tracked in a cycle

use common::TokenMetrics;
use regex::{Regex, RegexBuilder};
use tracing::warn;

struct TrackedAsset {
    address: String,
    matcher: Option<Regex>,
}

/// The tracked universe of one cycle, keyed by token address
pub struct AssetIndex {
    assets: Vec<TrackedAsset>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self { assets: Vec::new() }
    }

    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a TokenMetrics>) -> Self {
        let mut index = Self::new();
        for m in metrics {
            index.track(&m.address, m.symbol.as_deref());
        }
        index
    }

    /// Add a token; repeated addresses are ignored
    pub fn track(&mut self, address: &str, symbol: Option<&str>) {
        if address.is_empty() || self.assets.iter().any(|a| a.address == address) {
            return;
        }
        let matcher = symbol
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| symbol_matcher(s, address));
        self.assets.push(TrackedAsset {
            address: address.to_string(),
            matcher,
        });
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.address.as_str())
    }

    /// Every tracked address the text mentions, in tracking order
    pub fn resolve(&self, text: &str) -> Vec<&str> {
        self.assets
            .iter()
            .filter(|asset| {
                text.contains(&asset.address) || asset.matcher.as_ref().is_some_and(|m| m.is_match(text))
            })
            .map(|asset| asset.address.as_str())
            .collect()
    }
}

impl Default for AssetIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// `$SYM` cashtag or `SYM` as a whole word, case-insensitive
fn symbol_matcher(symbol: &str, address: &str) -> Option<Regex> {
    let pattern = format!(r"(?:\${0}\b|\b{0}\b)", regex::escape(symbol));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Cannot match symbol {} for {}: {}", symbol, address, e);
            None
        }
    }
}

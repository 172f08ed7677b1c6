//! Price sources for mining templates

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("No quote for asset {0}")]
    MissingAsset(String),

    #[error("Zero quote for asset {0}")]
    ZeroQuote(String),

    #[error("Price source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the price snapshot a template commits to.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// One fixed-point quote per entry of `assets`, in that order.
    async fn prices(&self, height: u64, assets: &[&str]) -> Result<Vec<u64>, PriceError>;
}

/// Serves configured quotes, falling back to a default for unlisted assets.
#[derive(Clone, Debug, Default)]
pub struct FixedPriceSource {
    quotes: BTreeMap<String, u64>,
    default: Option<u64>,
}

impl FixedPriceSource {
    pub fn new(quotes: BTreeMap<String, u64>, default: Option<u64>) -> Self {
        Self { quotes, default }
    }

    /// Quotes `price` for every asset.
    pub fn uniform(price: u64) -> Self {
        Self::new(BTreeMap::new(), Some(price))
    }

    pub fn with_quote(mut self, asset: &str, price: u64) -> Self {
        self.quotes.insert(asset.to_string(), price);
        self
    }

    fn quote(&self, asset: &str) -> Result<u64, PriceError> {
        let price = self
            .quotes
            .get(asset)
            .copied()
            .or(self.default)
            .ok_or_else(|| PriceError::MissingAsset(asset.to_string()))?;
        if price == 0 {
            return Err(PriceError::ZeroQuote(asset.to_string()));
        }
        Ok(price)
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn prices(&self, _height: u64, assets: &[&str]) -> Result<Vec<u64>, PriceError> {
        assets.iter().map(|asset| self.quote(asset)).collect()
    }
}

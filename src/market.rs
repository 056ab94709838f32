//! Market and asset reference data.
//!
//! Markets are owned by an external registry. The settlement core only reads
//! them: leverage bounds, minimum size, maintenance fraction, tradability and
//! the oracle time-to-live used for staleness checks.

use crate::types::{AssetId, Leverage, MarketId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Static market configuration (immutable after creation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Human-readable name (e.g., "BTC-USDC")
    pub name: String,
    /// Asset positions in this market are collateralized in
    pub collateral: AssetId,
    pub min_leverage: Leverage,
    pub max_leverage: Leverage,
    /// Minimum order quantity
    pub min_order_size: Decimal,
    /// Decimal places kept on quantities (deleverage amounts round down to this)
    pub size_decimals: u32,
    pub maintenance_margin_fraction: Decimal,
    pub tradable: bool,
    /// Oracle prices older than this are stale
    pub price_ttl_ms: i64,
    /// Minimum spacing between two funding settlements
    pub funding_interval_ms: i64,
}

impl MarketConfig {
    pub fn btc_usdc() -> Self {
        Self {
            id: MarketId(1),
            name: "BTC-USDC".to_string(),
            collateral: AssetId(1),
            min_leverage: Leverage::one(),
            max_leverage: Leverage::new_unchecked(dec!(10)),
            min_order_size: dec!(0.0001),
            size_decimals: 8,
            maintenance_margin_fraction: dec!(0.075),
            tradable: true,
            price_ttl_ms: 60_000,
            funding_interval_ms: 8 * 3_600_000,
        }
    }

    pub fn eth_usdc() -> Self {
        Self {
            id: MarketId(2),
            name: "ETH-USDC".to_string(),
            min_order_size: dec!(0.001),
            ..Self::btc_usdc()
        }
    }

    pub fn validate_size(&self, size: Decimal) -> Result<(), MarketError> {
        if size < self.min_order_size {
            return Err(MarketError::OrderTooSmall {
                size,
                minimum: self.min_order_size,
            });
        }
        Ok(())
    }

    pub fn validate_leverage(&self, leverage: Decimal) -> Result<(), MarketError> {
        if leverage < self.min_leverage.value() || leverage > self.max_leverage.value() {
            return Err(MarketError::LeverageOutOfBounds {
                leverage,
                min: self.min_leverage.value(),
                max: self.max_leverage.value(),
            });
        }
        Ok(())
    }

    pub fn ensure_tradable(&self) -> Result<(), MarketError> {
        if !self.tradable {
            return Err(MarketError::NotTradable(self.id));
        }
        Ok(())
    }
}

/// Collateral / base asset metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: AssetId,
    pub symbol: String,
    pub is_collateral: bool,
}

impl AssetConfig {
    pub fn usdc() -> Self {
        Self {
            id: AssetId(1),
            symbol: "USDC".to_string(),
            is_collateral: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("Order size {size} below minimum {minimum}")]
    OrderTooSmall { size: Decimal, minimum: Decimal },

    #[error("Leverage {leverage} outside [{min}, {max}]")]
    LeverageOutOfBounds {
        leverage: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Market {0:?} is not tradable")]
    NotTradable(MarketId),

    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Asset {0:?} is not a collateral asset")]
    NotCollateral(AssetId),
}

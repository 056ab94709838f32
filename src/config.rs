// 7.0 config.rs: all reference data in one place. markets, assets, fees, designated callers, rounding.
// 7.1 the config is a plain value passed into every engine call. there is no global registry.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::market::{AssetConfig, MarketConfig, MarketError};
use crate::order::OrderSide;
use crate::types::{AccountId, AssetId, Bps, MarketId};

/** 7.2: fee settings. maker/taker in bps. 100 bps = 1% */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    // Maker fee in basis points
    pub maker_fee_bps: i32,
    // Taker fee in basis points
    pub taker_fee_bps: i32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            maker_fee_bps: 2, // 0.02%
            taker_fee_bps: 5, // 0.05%
        }
    }
}

impl FeeConfig {
    pub fn rate(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Maker => Bps::new(self.maker_fee_bps).as_fraction(),
            OrderSide::Taker => Bps::new(self.taker_fee_bps).as_fraction(),
        }
    }
}

// Callers allowed to mark positions, settle funding and move the emergency fund
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorities {
    pub liquidators: BTreeSet<AccountId>,
    pub funding_operators: BTreeSet<AccountId>,
    #[serde(default)]
    pub fund_admins: BTreeSet<AccountId>,
}

// 7.3: fees round down, every other settlement amount uses banker's rounding
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rounding {
    pub settlement_decimals: u32,
}

impl Default for Rounding {
    fn default() -> Self {
        Self {
            settlement_decimals: 8,
        }
    }
}

impl Rounding {
    pub fn fee(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.settlement_decimals, RoundingStrategy::ToZero)
    }

    // pro-rata shares round down and the remainder lands on one leg
    pub fn share(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.settlement_decimals, RoundingStrategy::ToZero)
    }

    pub fn amount(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.settlement_decimals, RoundingStrategy::MidpointNearestEven)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub markets: Vec<MarketConfig>,
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub authorities: Authorities,
    #[serde(default)]
    pub rounding: Rounding,
    #[serde(skip)]
    market_index: HashMap<MarketId, usize>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::new(
            vec![MarketConfig::btc_usdc(), MarketConfig::eth_usdc()],
            vec![AssetConfig::usdc()],
            FeeConfig::default(),
            Authorities::default(),
        )
    }
}

impl ExchangeConfig {
    pub fn new(
        markets: Vec<MarketConfig>,
        assets: Vec<AssetConfig>,
        fees: FeeConfig,
        authorities: Authorities,
    ) -> Self {
        let mut config = Self {
            markets,
            assets,
            fees,
            authorities,
            rounding: Rounding::default(),
            market_index: HashMap::new(),
        };
        config.reindex();
        config
    }

    // Preset for local testing: zero fees, one account holding every authority
    pub fn testnet(operator: AccountId) -> Self {
        let mut config = Self::default();
        config.fees.maker_fee_bps = 0;
        config.fees.taker_fee_bps = 0;
        config.authorities.liquidators.insert(operator);
        config.authorities.funding_operators.insert(operator);
        config.authorities.fund_admins.insert(operator);
        config
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.reindex();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&raw)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn reindex(&mut self) {
        self.market_index = self
            .markets
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market_index.len() != self.markets.len() {
            return Err(ConfigError::DuplicateMarket);
        }
        for market in &self.markets {
            let asset = self
                .asset(market.collateral)
                .ok_or(ConfigError::UnknownCollateral(market.id))?;
            if !asset.is_collateral {
                return Err(ConfigError::Market(MarketError::NotCollateral(asset.id)));
            }
            if market.min_leverage > market.max_leverage {
                return Err(ConfigError::InvalidLeverageBounds(market.id));
            }
            if market.maintenance_margin_fraction <= Decimal::ZERO
                || market.maintenance_margin_fraction >= Decimal::ONE
            {
                return Err(ConfigError::InvalidMaintenanceFraction(market.id));
            }
        }
        Ok(())
    }

    pub fn market(&self, market_id: MarketId) -> Result<&MarketConfig, MarketError> {
        self.market_index
            .get(&market_id)
            .and_then(|i| self.markets.get(*i))
            .ok_or(MarketError::MarketNotFound(market_id))
    }

    pub fn market_mut(&mut self, market_id: MarketId) -> Result<&mut MarketConfig, MarketError> {
        let index = *self
            .market_index
            .get(&market_id)
            .ok_or(MarketError::MarketNotFound(market_id))?;
        self.markets
            .get_mut(index)
            .ok_or(MarketError::MarketNotFound(market_id))
    }

    pub fn asset(&self, asset_id: AssetId) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.id == asset_id)
    }

    pub fn collateral_of(&self, market_id: MarketId) -> Result<AssetId, MarketError> {
        self.market(market_id).map(|m| m.collateral)
    }

    pub fn is_liquidator(&self, caller: AccountId) -> bool {
        self.authorities.liquidators.contains(&caller)
    }

    pub fn is_funding_operator(&self, caller: AccountId) -> bool {
        self.authorities.funding_operators.contains(&caller)
    }

    pub fn is_fund_admin(&self, caller: AccountId) -> bool {
        self.authorities.fund_admins.contains(&caller)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Config read error: {0}")]
    Io(String),

    #[error("Duplicate market id in config")]
    DuplicateMarket,

    #[error("Market {0:?} references an unknown collateral asset")]
    UnknownCollateral(MarketId),

    #[error("Market {0:?} has min leverage above max leverage")]
    InvalidLeverageBounds(MarketId),

    #[error("Market {0:?} maintenance fraction must be in (0, 1)")]
    InvalidMaintenanceFraction(MarketId),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

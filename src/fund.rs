//! Shared fund ledgers.
//!
//! Six named ledgers, each mapping a collateral asset to a balance. Funds are
//! the only state shared across accounts. They move only through `fund` and
//! `defund`, always next to the account mutation that justifies the move.

use crate::types::{AssetId, Quote, WireError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FundKind {
    /// Borrowable notional lent to leveraged positions
    Liquidity,
    /// Maker and taker fees
    Fee,
    /// Notional locked by open positions
    Holding,
    /// Absorbs liquidation and close deficits
    Insurance,
    /// Clearing account for periodic funding payments
    Funding,
    /// Admin reserve used to top up or drain holding, liquidity and insurance
    Emergency,
}

impl FundKind {
    pub const ALL: [FundKind; 6] = [
        FundKind::Liquidity,
        FundKind::Fee,
        FundKind::Holding,
        FundKind::Insurance,
        FundKind::Funding,
        FundKind::Emergency,
    ];

    pub fn wire(&self) -> u8 {
        match self {
            FundKind::Liquidity => 1,
            FundKind::Fee => 2,
            FundKind::Holding => 3,
            FundKind::Insurance => 4,
            FundKind::Funding => 5,
            FundKind::Emergency => 6,
        }
    }
}

impl TryFrom<u8> for FundKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FundKind::Liquidity),
            2 => Ok(FundKind::Fee),
            3 => Ok(FundKind::Holding),
            4 => Ok(FundKind::Insurance),
            5 => Ok(FundKind::Funding),
            6 => Ok(FundKind::Emergency),
            _ => Err(WireError { kind: "fund kind", value }),
        }
    }
}

impl fmt::Display for FundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FundKind::Liquidity => "liquidity",
            FundKind::Fee => "fee",
            FundKind::Holding => "holding",
            FundKind::Insurance => "insurance",
            FundKind::Funding => "funding",
            FundKind::Emergency => "emergency",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundLedger {
    balances: BTreeMap<FundKind, BTreeMap<AssetId, Quote>>,
}

impl FundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, kind: FundKind, asset: AssetId) -> Quote {
        self.balances
            .get(&kind)
            .and_then(|per_asset| per_asset.get(&asset))
            .copied()
            .unwrap_or_default()
    }

    pub fn fund(&mut self, kind: FundKind, asset: AssetId, amount: Quote) -> Result<Quote, FundError> {
        if amount.is_negative() {
            return Err(FundError::NegativeAmount { kind, amount });
        }
        let entry = self
            .balances
            .entry(kind)
            .or_default()
            .entry(asset)
            .or_default();
        *entry = entry.add(amount);
        Ok(*entry)
    }

    // never lets a ledger go below zero
    pub fn defund(&mut self, kind: FundKind, asset: AssetId, amount: Quote) -> Result<Quote, FundError> {
        if amount.is_negative() {
            return Err(FundError::NegativeAmount { kind, amount });
        }
        let available = self.balance(kind, asset);
        if available < amount {
            return Err(FundError::Insufficient {
                kind,
                asset,
                requested: amount,
                available,
            });
        }
        let remaining = available.sub(amount);
        self.balances.entry(kind).or_default().insert(asset, remaining);
        Ok(remaining)
    }

    /// Moves `amount` between two ledgers. Returns the new `(from, to)` balances.
    pub fn transfer(&mut self, from: FundKind, to: FundKind, asset: AssetId, amount: Quote) -> Result<(Quote, Quote), FundError> {
        if from == to {
            return Err(FundError::TransferNotAllowed { from, to });
        }
        let from_balance = self.defund(from, asset, amount)?;
        let to_balance = self.fund(to, asset, amount)?;
        Ok((from_balance, to_balance))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FundError {
    #[error("{kind} fund for asset {asset:?} holds {available}, cannot release {requested}")]
    Insufficient {
        kind: FundKind,
        asset: AssetId,
        requested: Quote,
        available: Quote,
    },

    #[error("Negative amount {amount} moved through {kind} fund")]
    NegativeAmount { kind: FundKind, amount: Quote },

    #[error("Cannot move collateral from the {from} fund to the {to} fund")]
    TransferNotAllowed { from: FundKind, to: FundKind },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USDC: AssetId = AssetId(1);

    #[test]
    fn fund_and_defund() {
        let mut ledger = FundLedger::new();
        ledger.fund(FundKind::Liquidity, USDC, Quote::new(dec!(1000))).unwrap();
        let left = ledger.defund(FundKind::Liquidity, USDC, Quote::new(dec!(400))).unwrap();
        assert_eq!(left.value(), dec!(600));
        assert_eq!(ledger.balance(FundKind::Liquidity, USDC).value(), dec!(600));
        assert!(ledger.balance(FundKind::Fee, USDC).is_zero());
    }

    #[test]
    fn defund_cannot_overdraw() {
        let mut ledger = FundLedger::new();
        ledger.fund(FundKind::Insurance, USDC, Quote::new(dec!(10))).unwrap();
        let err = ledger
            .defund(FundKind::Insurance, USDC, Quote::new(dec!(10.5)))
            .unwrap_err();
        assert!(matches!(err, FundError::Insufficient { kind: FundKind::Insurance, .. }));
        assert_eq!(ledger.balance(FundKind::Insurance, USDC).value(), dec!(10));
    }

    #[test]
    fn rejects_negative_moves() {
        let mut ledger = FundLedger::new();
        assert!(ledger.fund(FundKind::Fee, USDC, Quote::new(dec!(-1))).is_err());
    }

    #[test]
    fn wire_values() {
        for kind in FundKind::ALL {
            assert_eq!(FundKind::try_from(kind.wire()), Ok(kind));
        }
        assert_eq!(FundKind::Holding.wire(), 3);
        assert_eq!(FundKind::Emergency.wire(), 6);
        assert!(FundKind::try_from(7u8).is_err());
        assert!(FundKind::try_from(0u8).is_err());
    }

    #[test]
    fn transfer_moves_between_ledgers() {
        let mut ledger = FundLedger::new();
        ledger.fund(FundKind::Emergency, USDC, Quote::new(dec!(10))).unwrap();
        let (emergency, holding) = ledger
            .transfer(FundKind::Emergency, FundKind::Holding, USDC, Quote::new(dec!(3)))
            .unwrap();
        assert_eq!(emergency.value(), dec!(7));
        assert_eq!(holding.value(), dec!(3));

        let err = ledger
            .transfer(FundKind::Holding, FundKind::Emergency, USDC, Quote::new(dec!(4)))
            .unwrap_err();
        assert!(matches!(err, FundError::Insufficient { kind: FundKind::Holding, .. }));
        assert_eq!(ledger.balance(FundKind::Holding, USDC).value(), dec!(3));
        assert_eq!(ledger.balance(FundKind::Emergency, USDC).value(), dec!(7));

        assert_eq!(
            ledger.transfer(FundKind::Fee, FundKind::Fee, USDC, Quote::zero()),
            Err(FundError::TransferNotAllowed {
                from: FundKind::Fee,
                to: FundKind::Fee,
            })
        );
    }
}

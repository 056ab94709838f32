//! Emergency fund administration.
//!
//! The emergency fund is the one ledger that fund admins move by hand. They pay
//! collateral into it, take it out again, and shuttle it to or from the
//! holding, liquidity and insurance funds when those run short or carry a
//! surplus. Every move is a paired transfer, so nothing is minted.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, FundReleasedEvent, FundSeededEvent, FundTransferredEvent};
use crate::fund::{FundError, FundKind};
use crate::types::{AccountId, AssetId, Quote};
use tracing::info;

// ledgers the emergency fund may top up or drain
const COUNTERPARTIES: [FundKind; 3] = [FundKind::Holding, FundKind::Liquidity, FundKind::Insurance];

impl Engine {
    pub fn fund_emergency(&mut self, caller: AccountId, asset: AssetId, amount: Quote) -> Result<Quote, EngineError> {
        self.ensure_fund_admin(caller)?;
        self.ensure_collateral(asset)?;
        let new_balance = self.funds.fund(FundKind::Emergency, asset, amount)?;

        info!(caller = caller.0, asset = asset.0, %amount, balance = %new_balance, "emergency fund topped up");
        self.emit_event(EventPayload::FundSeeded(FundSeededEvent {
            fund: FundKind::Emergency,
            asset,
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }

    pub fn defund_emergency(&mut self, caller: AccountId, asset: AssetId, amount: Quote) -> Result<Quote, EngineError> {
        self.ensure_fund_admin(caller)?;
        self.ensure_collateral(asset)?;
        let new_balance = self.funds.defund(FundKind::Emergency, asset, amount)?;

        info!(caller = caller.0, asset = asset.0, %amount, balance = %new_balance, "emergency fund drawn down");
        self.emit_event(EventPayload::FundReleased(FundReleasedEvent {
            fund: FundKind::Emergency,
            asset,
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }

    /// Tops up `to` out of the emergency fund. Returns the new balance of `to`.
    pub fn transfer_from_emergency(
        &mut self,
        caller: AccountId,
        to: FundKind,
        asset: AssetId,
        amount: Quote,
    ) -> Result<Quote, EngineError> {
        let (_, to_balance) = self.emergency_transfer(caller, FundKind::Emergency, to, asset, amount)?;
        Ok(to_balance)
    }

    /// Drains `from` back into the emergency fund. Returns the new balance of `from`.
    pub fn transfer_to_emergency(
        &mut self,
        caller: AccountId,
        from: FundKind,
        asset: AssetId,
        amount: Quote,
    ) -> Result<Quote, EngineError> {
        let (from_balance, _) = self.emergency_transfer(caller, from, FundKind::Emergency, asset, amount)?;
        Ok(from_balance)
    }

    fn emergency_transfer(
        &mut self,
        caller: AccountId,
        from: FundKind,
        to: FundKind,
        asset: AssetId,
        amount: Quote,
    ) -> Result<(Quote, Quote), EngineError> {
        self.ensure_fund_admin(caller)?;
        self.ensure_collateral(asset)?;
        let other = if from == FundKind::Emergency { to } else { from };
        if !COUNTERPARTIES.contains(&other) {
            return Err(FundError::TransferNotAllowed { from, to }.into());
        }
        let (from_balance, to_balance) = self.funds.transfer(from, to, asset, amount)?;

        info!(
            caller = caller.0,
            %from,
            %to,
            asset = asset.0,
            %amount,
            "emergency transfer"
        );
        self.emit_event(EventPayload::FundTransferred(FundTransferredEvent {
            from,
            to,
            asset,
            amount,
            from_balance,
            to_balance,
        }));
        Ok((from_balance, to_balance))
    }

    fn ensure_fund_admin(&self, caller: AccountId) -> Result<(), EngineError> {
        if self.exchange.is_fund_admin(caller) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                caller,
                action: "move the emergency fund",
            })
        }
    }
}

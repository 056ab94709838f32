//! Liquidation marking.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, PositionMarkedEvent};
use crate::liquidation::{decide_mark, MarkOutcome};
use crate::margin::{evaluate, PendingReservation};
use crate::types::{AccountId, AssetId};
use tracing::info;

impl Engine {
    /// Marks the worst position of an undercollateralized account for a
    /// forced close. Only designated liquidators may call this.
    pub fn mark_under_collateralized(
        &mut self,
        caller: AccountId,
        account_id: AccountId,
        asset: AssetId,
    ) -> Result<MarkOutcome, EngineError> {
        if !self.exchange.is_liquidator(caller) {
            return Err(EngineError::Unauthorized {
                caller,
                action: "mark positions",
            });
        }
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        if let Some(mark) = account.mark(asset) {
            return Ok(MarkOutcome::AlreadyMarked(mark.clone()));
        }

        let snapshot = evaluate(
            account,
            asset,
            self.current_time,
            &self.prices,
            &self.exchange,
            PendingReservation::none(),
        )?;
        let outcome = decide_mark(snapshot, &self.exchange, self.current_time)?;

        if let MarkOutcome::Marked(mark) = &outcome {
            let account = self
                .accounts
                .get_mut(&account_id)
                .ok_or(EngineError::AccountNotFound(account_id))?;
            account.set_mark(asset, mark.clone());

            info!(
                account = account_id.0,
                market = mark.market_id.0,
                direction = %mark.direction,
                amount = %mark.amount_to_be_sold,
                price = %mark.price,
                "position marked"
            );
            self.emit_event(EventPayload::PositionMarked(PositionMarkedEvent {
                account_id,
                asset,
                market_id: mark.market_id,
                direction: mark.direction,
                amount_to_be_sold: mark.amount_to_be_sold,
                remaining: mark.remaining,
                price: mark.price,
                marked_by: caller,
            }));
        }
        Ok(outcome)
    }

    /// Accounts whose margin under `asset` is at or below maintenance right now.
    pub fn liquidatable_accounts(&self, asset: AssetId) -> Vec<AccountId> {
        self.accounts
            .values()
            .filter(|account| {
                evaluate(
                    account,
                    asset,
                    self.current_time,
                    &self.prices,
                    &self.exchange,
                    PendingReservation::none(),
                )
                .is_ok_and(|snapshot| snapshot.liquidatable)
            })
            .map(|account| account.id)
            .collect()
    }
}

// 8.0 engine/core.rs: main engine. holds accounts, fund ledgers, the price cache and batch history.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::{Account, AccountError};
use crate::config::ExchangeConfig;
use crate::events::{DepositEvent, Event, EventId, EventPayload, FundSeededEvent, WithdrawalEvent};
use crate::fund::{FundKind, FundLedger};
use crate::funding::FundingSchedule;
use crate::margin::{evaluate, MarginSnapshot, PendingReservation};
use crate::market::MarketError;
use crate::order::BatchStatus;
use crate::price_feed::{PriceCache, PriceUpdate};
use crate::types::{AccountId, AssetId, BatchId, MarketId, Price, Quote, Timestamp};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) exchange: ExchangeConfig,
    pub(super) accounts: BTreeMap<AccountId, Account>,
    pub(super) funds: FundLedger,
    pub(super) prices: PriceCache,
    pub(super) batches: HashMap<BatchId, BatchStatus>,
    pub(super) funding: FundingSchedule,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(config: EngineConfig, exchange: ExchangeConfig) -> Self {
        let current_time = config.start_time;
        Self {
            config,
            exchange,
            accounts: BTreeMap::new(),
            funds: FundLedger::new(),
            prices: PriceCache::new(),
            batches: HashMap::new(),
            funding: FundingSchedule::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time,
        }
    }

    pub fn exchange(&self) -> &ExchangeConfig {
        &self.exchange
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    pub fn register_account(&mut self, account_id: AccountId) -> Result<(), EngineError> {
        if self.accounts.contains_key(&account_id) {
            return Err(AccountError::AlreadyRegistered(account_id).into());
        }
        self.accounts
            .insert(account_id, Account::new(account_id, self.current_time));
        Ok(())
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&Account> {
        self.accounts.get(&account_id)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &Account)> {
        self.accounts.iter()
    }

    pub fn deposit(&mut self, account_id: AccountId, asset: AssetId, amount: Quote) -> Result<Quote, EngineError> {
        self.ensure_collateral(asset)?;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let new_balance = account.deposit(asset, amount)?;

        self.emit_event(EventPayload::Deposit(DepositEvent {
            account_id,
            asset,
            amount,
            new_balance,
        }));

        Ok(new_balance)
    }

    // limited to available margin. a degraded margin query leaves nothing available
    pub fn withdraw(&mut self, account_id: AccountId, asset: AssetId, amount: Quote) -> Result<Quote, EngineError> {
        self.ensure_collateral(asset)?;
        let available = self.margin_query(account_id, asset)?.available;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let new_balance = account.withdraw(asset, amount, available)?;

        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            account_id,
            asset,
            amount,
            new_balance,
        }));

        Ok(new_balance)
    }

    /// Caches an oracle price stamped with the engine clock.
    pub fn update_price(&mut self, market_id: MarketId, price: Price) -> Result<(), EngineError> {
        self.exchange.market(market_id)?;
        self.prices
            .submit(market_id, PriceUpdate::new(price, self.current_time))?;
        Ok(())
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    pub fn seed_fund(&mut self, kind: FundKind, asset: AssetId, amount: Quote) -> Result<Quote, EngineError> {
        self.ensure_collateral(asset)?;
        let new_balance = self.funds.fund(kind, asset, amount)?;

        self.emit_event(EventPayload::FundSeeded(FundSeededEvent {
            fund: kind,
            asset,
            amount,
            new_balance,
        }));

        Ok(new_balance)
    }

    pub fn fund_balance(&self, kind: FundKind, asset: AssetId) -> Quote {
        self.funds.balance(kind, asset)
    }

    pub fn funds(&self) -> &FundLedger {
        &self.funds
    }

    pub fn batch_status(&self, batch_id: BatchId) -> Option<BatchStatus> {
        self.batches.get(&batch_id).copied()
    }

    /// Cross-margin view of one account and collateral at the current time.
    pub fn margin_query(&self, account_id: AccountId, asset: AssetId) -> Result<MarginSnapshot, EngineError> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let snapshot = evaluate(
            account,
            asset,
            self.current_time,
            &self.prices,
            &self.exchange,
            PendingReservation::none(),
        )?;
        if snapshot.degraded {
            warn!(account = account_id.0, asset = asset.0, "margin query degraded by stale prices");
        }
        Ok(snapshot)
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn ensure_collateral(&self, asset: AssetId) -> Result<(), MarketError> {
        match self.exchange.asset(asset) {
            Some(config) if config.is_collateral => Ok(()),
            _ => Err(MarketError::NotCollateral(asset)),
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        debug!(id = event.id.0, kind = event.payload.name(), "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}

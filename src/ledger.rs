//! Unit of work over account books.
//!
//! A book is one account plus its positions. [`UnitOfWork::transact`] hands
//! the caller a [`Transaction`] holding a staged copy of that book while the
//! account's lock is held. When the closure returns `Ok` the staged book and
//! its audit events replace the stored state in one step. Any error, a failed
//! commit check or an overrun of the transaction timeout discards the copy,
//! so nothing partial is ever visible.
//!
//! Locks are per account: different accounts never contend.

use crate::account::TradingAccount;
use crate::config::LedgerConfig;
use crate::events::{AuditEvent, AuditId, AuditLogEntry};
use crate::position::Position;
use crate::symbol::SymbolRiskParams;
use crate::types::{AccountId, MarginMode, PositionId, SymbolId, Timestamp};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Account {0:?} already exists")]
    DuplicateAccount(AccountId),

    #[error("Position {0:?} already exists")]
    DuplicatePosition(PositionId),

    #[error("Timed out waiting for the lock on account {0:?}")]
    LockTimeout(AccountId),

    #[error("Transaction on account {account_id:?} ran {elapsed_ms}ms and was rolled back")]
    TransactionTimeout { account_id: AccountId, elapsed_ms: u128 },

    #[error("Commit rejected: {0}")]
    ConstraintViolation(String),
}

/// Where a position lives. Fixed for the lifetime of the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionLocator {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub symbol: SymbolId,
}

/// Identifies one transaction: the account it is scoped to, the request it
/// belongs to and the time its audit entries carry.
#[derive(Debug, Clone, Copy)]
pub struct TxScope {
    pub account_id: AccountId,
    pub correlation_id: Uuid,
    pub now: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBook {
    pub account: TradingAccount,
    pub positions: BTreeMap<PositionId, Position>,
}

impl AccountBook {
    pub fn new(account: TradingAccount) -> Self {
        Self {
            account,
            positions: BTreeMap::new(),
        }
    }
}

/// Staged view of one account book.
#[derive(Debug)]
pub struct Transaction {
    scope: TxScope,
    book: AccountBook,
    events: Vec<AuditEvent>,
}

impl Transaction {
    fn new(scope: TxScope, book: AccountBook) -> Self {
        Self {
            scope,
            book,
            events: Vec::new(),
        }
    }

    pub fn scope(&self) -> &TxScope {
        &self.scope
    }

    pub fn now(&self) -> Timestamp {
        self.scope.now
    }

    pub fn account(&self) -> &TradingAccount {
        &self.book.account
    }

    pub fn account_mut(&mut self) -> &mut TradingAccount {
        &mut self.book.account
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.book.positions.get(&id)
    }

    pub fn position_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        self.book.positions.get_mut(&id)
    }

    /// Account and one of its positions, both mutable.
    pub fn account_and_position_mut(
        &mut self,
        id: PositionId,
    ) -> Option<(&mut TradingAccount, &mut Position)> {
        let AccountBook { account, positions } = &mut self.book;
        positions.get_mut(&id).map(|position| (account, position))
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.book.positions.values().filter(|p| p.is_open())
    }

    pub fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn recorded(&self) -> &[AuditEvent] {
        &self.events
    }
}

pub trait UnitOfWork: Send + Sync {
    fn locate(&self, position_id: PositionId) -> Option<PositionLocator>;

    fn load_account(&self, account_id: AccountId) -> Option<TradingAccount>;

    fn load_position(&self, position_id: PositionId) -> Option<Position>;

    fn open_positions(&self, account_id: AccountId) -> Vec<Position>;

    /// Runs `work` against a staged copy of the account book and commits it
    /// all-or-nothing.
    fn transact<T, E, F>(&self, scope: TxScope, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: From<LedgerError>;
}

/// In-process ledger. Accounts are sharded in a `DashMap`, each book behind
/// its own mutex; the audit log is a sequenced append-only vector.
pub struct InMemoryLedger {
    books: DashMap<AccountId, Arc<Mutex<AccountBook>>>,
    index: DashMap<PositionId, PositionLocator>,
    audit: Mutex<Vec<AuditLogEntry>>,
    next_audit_id: AtomicU64,
    config: LedgerConfig,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            books: DashMap::new(),
            index: DashMap::new(),
            audit: Mutex::new(Vec::new()),
            next_audit_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn insert_account(&self, account: TradingAccount) -> Result<(), LedgerError> {
        let id = account.id;
        match self.books.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LedgerError::DuplicateAccount(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AccountBook::new(account))));
                Ok(())
            }
        }
    }

    /// Adds an already-opened position and locks its isolated margin on the
    /// owning account. Stands in for the open flow, which lives elsewhere, so
    /// it holds the position to the same symbol rules that flow would.
    pub fn insert_position(
        &self,
        position: Position,
        symbol: &SymbolRiskParams,
    ) -> Result<(), LedgerError> {
        if position.symbol != symbol.symbol {
            return Err(LedgerError::ConstraintViolation(format!(
                "position {:?} is on {}, not {}",
                position.id, position.symbol, symbol.symbol
            )));
        }
        if !symbol.is_quantity_aligned(position.quantity) {
            return Err(LedgerError::ConstraintViolation(format!(
                "quantity {} is not a multiple of {} on {}",
                position.quantity, symbol.quantity_step, symbol.symbol
            )));
        }
        if !symbol.allows(position.leverage) {
            return Err(LedgerError::ConstraintViolation(format!(
                "leverage {} is not offered on {}",
                position.leverage, symbol.symbol
            )));
        }
        if position.margin_mode == MarginMode::Cross && !position.locked_initial_margin.is_zero() {
            return Err(LedgerError::ConstraintViolation(format!(
                "cross position {:?} carries locked margin",
                position.id
            )));
        }
        let book = self.book(position.account_id)?;
        let mut book = book.lock();
        if self.index.contains_key(&position.id) {
            return Err(LedgerError::DuplicatePosition(position.id));
        }
        if position.is_open() {
            book.account
                .lock_margin(position.locked_initial_margin)
                .map_err(|e| LedgerError::ConstraintViolation(e.to_string()))?;
        }
        self.index.insert(
            position.id,
            PositionLocator {
                position_id: position.id,
                account_id: position.account_id,
                symbol: position.symbol.clone(),
            },
        );
        book.positions.insert(position.id, position);
        Ok(())
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.lock().clone()
    }

    pub fn audit_entries_for(&self, correlation_id: Uuid) -> Vec<AuditLogEntry> {
        self.audit
            .lock()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    pub fn audit_len(&self) -> usize {
        self.audit.lock().len()
    }

    fn book(&self, account_id: AccountId) -> Result<Arc<Mutex<AccountBook>>, LedgerError> {
        self.books
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    // called with the account lock held, so ids follow commit order per account
    fn append_audit(&self, scope: &TxScope, events: Vec<AuditEvent>) {
        let mut log = self.audit.lock();
        for event in events {
            let id = AuditId(self.next_audit_id.fetch_add(1, Ordering::SeqCst));
            log.push(AuditLogEntry {
                id,
                correlation_id: scope.correlation_id,
                account_id: scope.account_id,
                timestamp: scope.now,
                event,
            });
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl UnitOfWork for InMemoryLedger {
    fn locate(&self, position_id: PositionId) -> Option<PositionLocator> {
        self.index.get(&position_id).map(|entry| entry.value().clone())
    }

    fn load_account(&self, account_id: AccountId) -> Option<TradingAccount> {
        let book = self.book(account_id).ok()?;
        let account = book.lock().account.clone();
        Some(account)
    }

    fn load_position(&self, position_id: PositionId) -> Option<Position> {
        let locator = self.locate(position_id)?;
        let book = self.book(locator.account_id).ok()?;
        let position = book.lock().positions.get(&position_id).cloned();
        position
    }

    fn open_positions(&self, account_id: AccountId) -> Vec<Position> {
        let Ok(book) = self.book(account_id) else {
            return Vec::new();
        };
        let book = book.lock();
        book.positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    fn transact<T, E, F>(&self, scope: TxScope, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
        E: From<LedgerError>,
    {
        let book = self.book(scope.account_id)?;
        let started = Instant::now();
        let mut stored = book
            .try_lock_for(self.config.lock_timeout())
            .ok_or(LedgerError::LockTimeout(scope.account_id))?;

        let mut tx = Transaction::new(scope, stored.clone());
        let output = work(&mut tx)?;

        let elapsed = started.elapsed();
        if elapsed > self.config.transaction_timeout() {
            return Err(LedgerError::TransactionTimeout {
                account_id: scope.account_id,
                elapsed_ms: elapsed.as_millis(),
            }
            .into());
        }

        check_commit(&stored, &tx)?;

        let Transaction {
            scope,
            book: staged,
            events,
        } = tx;
        *stored = staged;
        self.append_audit(&scope, events);
        Ok(output)
    }
}

// 10.1: last line of defence before the staged book replaces the stored one
fn check_commit(stored: &AccountBook, tx: &Transaction) -> Result<(), LedgerError> {
    let staged = &tx.book;
    if staged == stored {
        return Ok(());
    }

    if tx.events.is_empty() {
        return Err(LedgerError::ConstraintViolation(
            "mutation without an audit event".to_string(),
        ));
    }

    let account = &staged.account;
    if account.id != stored.account.id || account.client_id != stored.account.client_id {
        return Err(LedgerError::ConstraintViolation(
            "account identity changed".to_string(),
        ));
    }
    if account.margin.is_negative() {
        return Err(LedgerError::ConstraintViolation(format!(
            "margin would be negative: {}",
            account.margin
        )));
    }
    if account.available_balance.is_negative() {
        return Err(LedgerError::ConstraintViolation(format!(
            "available balance would be negative: {}",
            account.available_balance
        )));
    }

    if staged.positions.len() != stored.positions.len() {
        return Err(LedgerError::ConstraintViolation(
            "positions added or removed inside a transaction".to_string(),
        ));
    }
    for (id, before) in &stored.positions {
        let Some(after) = staged.positions.get(id) else {
            return Err(LedgerError::ConstraintViolation(format!(
                "position {id:?} removed"
            )));
        };
        if before.status.is_terminal() && after != before {
            return Err(LedgerError::ConstraintViolation(format!(
                "terminal position {id:?} modified"
            )));
        }
        if after.account_id != before.account_id || after.symbol != before.symbol {
            return Err(LedgerError::ConstraintViolation(format!(
                "position {id:?} moved"
            )));
        }
        if after.margin_mode == MarginMode::Cross && !after.locked_initial_margin.is_zero() {
            return Err(LedgerError::ConstraintViolation(format!(
                "cross position {id:?} carries locked margin"
            )));
        }
    }
    Ok(())
}

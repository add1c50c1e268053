use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::account::{Account, InterestLog};
use crate::currency::{self, Currency, CurrencyKey};
use crate::db::{Error, Result};
use crate::error::DomainError;
use crate::ledger::{LedgerEntry, LedgerQuery};
use crate::types::Id;
use crate::uow::{AccountRepository, ChangeSet, CurrencyRepository, InterestLogRepository, LedgerRepository, UnitOfWork};

/// In-memory store with the same versioning rules as the Postgres store.
///
/// Intended for tests/dev. Conflicts can be injected to exercise the
/// engine's retry loop.
#[derive(Debug, Default)]
pub struct MemoryStore {
	accounts: RwLock<HashMap<Id, Account>>,
	currencies: RwLock<HashMap<Id, Currency>>,
	ledger: RwLock<Vec<LedgerEntry>>,
	interest_logs: RwLock<Vec<InterestLog>>,
	injected_conflicts: AtomicU32,
	applied: AtomicU32,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
	lock.read().map_err(|_| Error::Runtime("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
	lock.write().map_err(|_| Error::Runtime("lock poisoned".to_string()))
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a currency, keeping codes unique and at most one base currency
	pub fn insert_currency(&self, currency: Currency) -> std::result::Result<Currency, DomainError> {
		let mut currencies = self.currencies.write().unwrap_or_else(|e| e.into_inner());
		let mut all: Vec<Currency> = currencies.values().filter(|c| c.id != currency.id).cloned().collect();
		all.push(currency.clone());
		currency::check_registry(&all)?;
		currencies.insert(currency.id, currency.clone());
		Ok(currency)
	}

	pub fn insert_account(&self, account: Account) -> Account {
		let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
		accounts.insert(account.id, account.clone());
		account
	}

	pub fn insert_interest_log(&self, log: InterestLog) {
		let mut logs = self.interest_logs.write().unwrap_or_else(|e| e.into_inner());
		logs.push(log);
	}

	/// Snapshot of a stored account
	pub fn account(&self, account_id: &Id) -> Option<Account> {
		let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
		accounts.get(account_id).cloned()
	}

	/// Every committed ledger entry, oldest first
	pub fn ledger(&self) -> Vec<LedgerEntry> {
		self.ledger.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Number of change sets applied successfully
	pub fn applied(&self) -> u32 {
		self.applied.load(Ordering::SeqCst)
	}

	/// Make the next `n` applies fail with a version conflict
	pub fn inject_conflicts(&self, n: u32) {
		self.injected_conflicts.store(n, Ordering::SeqCst);
	}

	/// Simulate another writer committing a change to an account
	pub fn touch_account<F>(&self, account_id: &Id, f: F) -> Result<Account>
	where
		F: FnOnce(&mut Account),
	{
		let mut accounts = write(&self.accounts)?;
		let account = accounts.get_mut(account_id).ok_or(Error::RecordNotFound)?;
		f(account);
		account.version += 1;
		Ok(account.clone())
	}

	fn take_injected_conflict(&self) -> bool {
		self.injected_conflicts
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
	}
}

#[async_trait]
impl AccountRepository for MemoryStore {
	async fn find_account(&self, account_id: &Id) -> Result<Option<Account>> {
		Ok(read(&self.accounts)?.get(account_id).cloned())
	}

	async fn find_accounts_by_owner(&self, user_id: &Id) -> Result<Vec<Account>> {
		let mut found: Vec<Account> = read(&self.accounts)?
			.values()
			.filter(|a| &a.user_id == user_id)
			.cloned()
			.collect();
		found.sort_by_key(|a| a.created_at);
		Ok(found)
	}
}

#[async_trait]
impl CurrencyRepository for MemoryStore {
	async fn find_currency(&self, key: CurrencyKey<'_>) -> Result<Option<Currency>> {
		let currencies = read(&self.currencies)?;
		let found = match key {
			CurrencyKey::ID(id) => currencies.get(&id).cloned(),
			CurrencyKey::Code(code) => {
				let code = code.trim().to_ascii_uppercase();
				currencies.values().find(|c| c.code == code).cloned()
			}
		};
		Ok(found)
	}
}

#[async_trait]
impl LedgerRepository for MemoryStore {
	async fn find_ledger_entries(&self, account_id: &Id, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
		let ledger = read(&self.ledger)?;
		let mut found: Vec<LedgerEntry> = ledger
			.iter()
			.filter(|e| e.leg_for(account_id).is_some() && query.contains(&e.created_at()))
			.cloned()
			.collect();
		// newest first, insertion order breaks ties
		found.reverse();
		found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

		Ok(found
			.into_iter()
			.skip(query.offset() as usize)
			.take(query.limit() as usize)
			.collect())
	}
}

#[async_trait]
impl InterestLogRepository for MemoryStore {
	async fn find_interest_logs(&self, account_id: &Id) -> Result<Vec<InterestLog>> {
		let mut found: Vec<InterestLog> = read(&self.interest_logs)?
			.iter()
			.filter(|log| &log.account_id == account_id)
			.cloned()
			.collect();
		found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(found)
	}
}

#[async_trait]
impl UnitOfWork for MemoryStore {
	async fn apply(&self, changes: ChangeSet) -> Result<()> {
		if self.take_injected_conflict() {
			return Err(Error::Conflict("injected conflict".to_string()));
		}

		let mut accounts = write(&self.accounts)?;
		let mut ledger = write(&self.ledger)?;

		// validate everything before touching anything
		for (account, expected_version) in &changes.accounts {
			let stored = accounts.get(&account.id).ok_or(Error::RecordNotFound)?;
			if stored.version != *expected_version {
				return Err(Error::Conflict(format!(
					"account {} is at version {}, expected {}", account.id, stored.version, expected_version
				)));
			}
		}
		let known: HashSet<Id> = ledger.iter().map(|e| e.id()).collect();
		for entry in &changes.entries {
			if known.contains(&entry.id()) {
				return Err(Error::RecordAlreadyExists);
			}
			if entry.legs().iter().any(|leg| !accounts.contains_key(&leg.account_id)) {
				return Err(Error::RecordNotFound);
			}
		}

		for (account, expected_version) in changes.accounts {
			let mut stored = account;
			stored.version = expected_version + 1;
			accounts.insert(stored.id, stored);
		}
		ledger.extend(changes.entries);

		self.applied.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

//! Persistence boundary of the transaction engine.
//!
//! Repositories are read-only. Every write goes through a [`Session`], the
//! explicit transaction handle returned by [`UnitOfWork::begin_transaction`]:
//! accounts loaded through it are tracked together with the version they were
//! read at, mutated copies and ledger entries are staged on it, and
//! [`UnitOfWork::save`] hands the staged [`ChangeSet`] to the backend, which
//! applies all of it or none of it.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;

use crate::account::{Account, InterestLog};
use crate::currency::{Currency, CurrencyKey};
use crate::db::{Error, Result};
use crate::ledger::{LedgerEntry, LedgerQuery};
use crate::types::Id;

#[async_trait]
pub trait AccountRepository: Send + Sync {
	async fn find_account(&self, account_id: &Id) -> Result<Option<Account>>;

	async fn find_accounts_by_owner(&self, user_id: &Id) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait CurrencyRepository: Send + Sync {
	async fn find_currency(&self, key: CurrencyKey<'_>) -> Result<Option<Currency>>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
	/// Entries with a leg on the account, newest first
	async fn find_ledger_entries(&self, account_id: &Id, query: &LedgerQuery) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait InterestLogRepository: Send + Sync {
	async fn find_interest_logs(&self, account_id: &Id) -> Result<Vec<InterestLog>>;
}

/// Writes staged on a session
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
	/// Accounts to write, each with the version it was loaded at
	pub accounts: Vec<(Account, i32)>,
	pub entries: Vec<LedgerEntry>,
}

impl ChangeSet {
	pub fn is_empty(&self) -> bool {
		self.accounts.is_empty() && self.entries.is_empty()
	}
}

#[derive(Debug)]
struct Tracked {
	account: Account,
	loaded_version: i32,
	dirty: bool,
}

/// Transaction handle threaded through one engine operation
#[derive(Debug)]
pub struct Session {
	id: Id,
	tracked: HashMap<Id, Tracked>,
	entries: Vec<LedgerEntry>,
}

impl Session {
	pub fn new() -> Self {
		Session {
			id: Id::new_v4(),
			tracked: HashMap::new(),
			entries: Vec::new(),
		}
	}

	pub fn id(&self) -> Id {
		self.id
	}

	/// Start tracking an account as read from storage, replacing any earlier
	/// snapshot. Returns a working copy.
	pub fn track(&mut self, account: Account) -> Account {
		let copy = account.clone();
		self.tracked.insert(account.id, Tracked {
			loaded_version: account.version,
			account,
			dirty: false,
		});
		copy
	}

	pub fn untrack(&mut self, account_id: &Id) {
		self.tracked.remove(account_id);
	}

	pub fn tracked(&self, account_id: &Id) -> Option<&Account> {
		self.tracked.get(account_id).map(|t| &t.account)
	}

	pub fn tracked_ids(&self) -> Vec<Id> {
		self.tracked.keys().copied().collect()
	}

	/// Stage a mutated copy of a tracked account
	pub fn update(&mut self, account: Account) -> Result<()> {
		let tracked = self.tracked.get_mut(&account.id).ok_or(Error::Untracked(account.id))?;
		tracked.account = account;
		tracked.dirty = true;
		Ok(())
	}

	/// Stage a ledger entry
	pub fn add(&mut self, entry: LedgerEntry) {
		self.entries.push(entry);
	}

	pub fn has_changes(&self) -> bool {
		!self.entries.is_empty() || self.tracked.values().any(|t| t.dirty)
	}

	/// Staged changes, accounts ordered by id so concurrent writers lock
	/// rows in the same order
	pub fn change_set(&self) -> ChangeSet {
		let mut accounts: Vec<(Account, i32)> = self.tracked
			.values()
			.filter(|t| t.dirty)
			.map(|t| (t.account.clone(), t.loaded_version))
			.collect();
		accounts.sort_by_key(|(account, _)| account.id);
		ChangeSet {
			accounts,
			entries: self.entries.clone(),
		}
	}

	/// Record that the staged changes were applied: written accounts move to
	/// their next version and nothing is staged any more.
	pub fn mark_saved(&mut self) {
		for tracked in self.tracked.values_mut().filter(|t| t.dirty) {
			tracked.loaded_version += 1;
			tracked.account.version = tracked.loaded_version;
			tracked.dirty = false;
		}
		self.entries.clear();
	}

	/// Drop staged ledger entries and forget which accounts were modified.
	/// Tracked snapshots keep their in-memory state until reloaded.
	pub fn discard(&mut self) {
		for tracked in self.tracked.values_mut() {
			tracked.dirty = false;
		}
		self.entries.clear();
	}
}

impl Default for Session {
	fn default() -> Self {
		Session::new()
	}
}

#[async_trait]
pub trait UnitOfWork: AccountRepository {
	/// Apply every change in the set or none of them. Fails with
	/// [`Error::Conflict`] when a stored account is no longer at the version
	/// it was loaded at.
	async fn apply(&self, changes: ChangeSet) -> Result<()>;

	async fn begin_transaction(&self) -> Result<Session> {
		let session = Session::new();
		debug!(target: "bank::uow", "session {} started", session.id());
		Ok(session)
	}

	/// Persist everything staged on the session as one atomic unit
	async fn save(&self, session: &mut Session) -> Result<()> {
		if !session.has_changes() {
			return Ok(());
		}
		self.apply(session.change_set()).await?;
		session.mark_saved();
		Ok(())
	}

	async fn commit(&self, mut session: Session) -> Result<()> {
		self.save(&mut session).await?;
		debug!(target: "bank::uow", "session {} committed", session.id());
		Ok(())
	}

	async fn rollback(&self, mut session: Session) -> Result<()> {
		session.discard();
		debug!(target: "bank::uow", "session {} rolled back", session.id());
		Ok(())
	}

	/// Discard staged changes and re-read every tracked account from storage
	async fn reload_tracked(&self, session: &mut Session) -> Result<()> {
		session.discard();
		for account_id in session.tracked_ids() {
			match self.find_account(&account_id).await? {
				Some(account) => {
					session.track(account);
				}
				None => session.untrack(&account_id),
			}
		}
		debug!(target: "bank::uow", "session {} reloaded", session.id());
		Ok(())
	}
}

/// Everything the transaction engine needs from a backend
pub trait Store: UnitOfWork + CurrencyRepository + LedgerRepository + InterestLogRepository {}

impl<T> Store for T where T: UnitOfWork + CurrencyRepository + LedgerRepository + InterestLogRepository {}

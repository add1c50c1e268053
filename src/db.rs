use std::fmt;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use diesel::result::DatabaseErrorKind::{SerializationFailure, UniqueViolation};
use diesel::result::Error::{DatabaseError, NotFound};

use crate::account::{self, Account, InterestLog};
use crate::currency::{self, Currency, CurrencyKey};
use crate::ledger::{self, LedgerEntry, LedgerQuery};
use crate::types::Id;
use crate::uow::{AccountRepository, ChangeSet, CurrencyRepository, InterestLogRepository, LedgerRepository, UnitOfWork};

pub type Result<T> = std::result::Result<T, Error>;
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Get a pooled connection to the underlying PostgreSQL database
pub fn pg_pool(database_url: &str) -> Result<PgPool> {
	let manager = ConnectionManager::<PgConnection>::new(database_url);
	Pool::builder().build(manager).map_err(Into::into)
}

/// Error that can occur when querying against the store
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	RecordAlreadyExists,
	RecordNotFound,
	/// An optimistic version check failed; the caller should reload and retry
	Conflict(String),
	/// A stored row that cannot be turned back into a domain value
	InvalidRow(String),
	/// An account was staged on a session without being loaded through it
	Untracked(Id),
	Connection(String),
	Runtime(String),
	/// Used as a catch-all for other diesel errors
	DatabaseError(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordAlreadyExists => write!(f, "record violates a unique constraint"),
			Error::RecordNotFound => write!(f, "record does not exist"),
			Error::Conflict(e) => write!(f, "concurrent modification: {}", e),
			Error::InvalidRow(e) => write!(f, "invalid stored row: {}", e),
			Error::Untracked(id) => write!(f, "account {} is not tracked by the session", id),
			Error::Connection(e) => write!(f, "opening database connection: {}", e),
			Error::Runtime(e) => write!(f, "running database task: {}", e),
			Error::DatabaseError(e) => write!(f, "database error: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		match e {
			DatabaseError(UniqueViolation, _) => Error::RecordAlreadyExists,
			DatabaseError(SerializationFailure, info) => Error::Conflict(info.message().to_string()),
			// 40P01 has no kind of its own in diesel
			DatabaseError(_, ref info) if info.message().contains("deadlock detected") => {
				Error::Conflict(info.message().to_string())
			}
			NotFound => Error::RecordNotFound,

			_ => Error::DatabaseError(e.to_string()),
		}
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Self {
		Error::Connection(e.to_string())
	}
}

/// Postgres-backed store. Diesel is synchronous, so every call runs on the
/// blocking thread pool with its own pooled connection.
#[derive(Clone)]
pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	pub fn new(pool: PgPool) -> Self {
		PgStore { pool }
	}

	async fn run<T, F>(&self, f: F) -> Result<T>
	where
		F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let pool = self.pool.clone();
		tokio::task::spawn_blocking(move || {
			let mut conn = pool.get()?;
			f(&mut conn)
		})
			.await
			.map_err(|e| Error::Runtime(e.to_string()))?
	}

	pub async fn create_account(&self, account: Account) -> Result<Account> {
		self.run(move |conn| account::Repo::new(conn).create(&account)).await
	}

	pub async fn create_currency(&self, currency: Currency) -> Result<Currency> {
		self.run(move |conn| currency::Repo::new(conn).create(&currency)).await
	}

	pub async fn create_interest_log(&self, log: InterestLog) -> Result<InterestLog> {
		self.run(move |conn| account::Repo::new(conn).create_interest_log(&log)).await
	}
}

#[async_trait]
impl AccountRepository for PgStore {
	async fn find_account(&self, account_id: &Id) -> Result<Option<Account>> {
		let account_id = *account_id;
		self.run(move |conn| account::Repo::new(conn).find_by_id(&account_id)).await
	}

	async fn find_accounts_by_owner(&self, user_id: &Id) -> Result<Vec<Account>> {
		let user_id = *user_id;
		self.run(move |conn| account::Repo::new(conn).find_by_owner(&user_id)).await
	}
}

#[async_trait]
impl CurrencyRepository for PgStore {
	async fn find_currency(&self, key: CurrencyKey<'_>) -> Result<Option<Currency>> {
		match key {
			CurrencyKey::ID(id) => {
				self.run(move |conn| currency::Repo::new(conn).find(CurrencyKey::ID(id))).await
			}
			CurrencyKey::Code(code) => {
				let code = code.to_string();
				self.run(move |conn| currency::Repo::new(conn).find(CurrencyKey::Code(&code))).await
			}
		}
	}
}

#[async_trait]
impl LedgerRepository for PgStore {
	async fn find_ledger_entries(&self, account_id: &Id, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
		let account_id = *account_id;
		let query = query.clone();
		self.run(move |conn| ledger::Repo::new(conn).find_by_account(&account_id, &query)).await
	}
}

#[async_trait]
impl InterestLogRepository for PgStore {
	async fn find_interest_logs(&self, account_id: &Id) -> Result<Vec<InterestLog>> {
		let account_id = *account_id;
		self.run(move |conn| account::Repo::new(conn).find_interest_logs(&account_id)).await
	}
}

#[async_trait]
impl UnitOfWork for PgStore {
	async fn apply(&self, mut changes: ChangeSet) -> Result<()> {
		// same row lock order for every writer
		changes.accounts.sort_by_key(|(account, _)| account.id);
		self.run(move |conn| {
			conn.transaction::<_, Error, _>(|conn| {
				for (account, expected_version) in &changes.accounts {
					account::Repo::new(conn).update_versioned(account, *expected_version)?;
				}
				for entry in &changes.entries {
					ledger::Repo::new(conn).create(entry)?;
				}
				Ok(())
			})
		}).await
	}
}

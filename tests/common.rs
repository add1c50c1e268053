use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

pub use bigdecimal::BigDecimal;
pub use bank_ledger::*;
pub use bank_ledger::bank::{cancellation, ErrorKind};
pub use bank_ledger::db;
pub use bank_ledger::uow::{AccountRepository, ChangeSet, CurrencyRepository, InterestLogRepository, LedgerRepository};

pub fn dec(s: &str) -> BigDecimal {
	BigDecimal::from_str(s).unwrap()
}

pub fn modify() -> Context {
	Context::new(Access::MODIFY)
}

pub fn view() -> Context {
	Context::new(Access::VIEW)
}

/// Clock that moves one second forward on every reading
pub struct TickingClock {
	next: AtomicI64,
}

impl TickingClock {
	pub fn new() -> Self {
		TickingClock {
			next: AtomicI64::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap().timestamp()),
		}
	}
}

impl Clock for TickingClock {
	fn now(&self) -> Time {
		let secs = self.next.fetch_add(1, Ordering::SeqCst);
		Utc.timestamp_opt(secs, 0).unwrap()
	}
}

pub fn service<S: Store + 'static>(store: Arc<S>, fees: Arc<dyn FeePolicy>) -> Service<S> {
	Service::new(NewService {
		store,
		fees,
		clock: Arc::new(TickingClock::new()),
		retry: RetryPolicy::new(3, Duration::ZERO),
		currency_cache_ttl: Duration::from_secs(120),
	})
}

/// An in-memory bank with a USD base currency and EUR at 0.9
pub struct Fixture {
	pub store: Arc<MemoryStore>,
	pub usd: Currency,
	pub eur: Currency,
	pub account_factory: AccountFactory,
}

impl Fixture {
	pub fn new() -> Self {
		let store = Arc::new(MemoryStore::new());
		let usd = store.insert_currency(Currency::base("USD").unwrap()).unwrap();
		let eur = store.insert_currency(Currency::new("EUR", dec("0.9")).unwrap()).unwrap();
		Fixture {
			account_factory: AccountFactory { store: store.clone() },
			store,
			usd,
			eur,
		}
	}

	pub fn service(&self) -> Service<MemoryStore> {
		service(self.store.clone(), Arc::new(NoFee))
	}

	pub fn service_with_fees(&self, fees: Arc<dyn FeePolicy>) -> Service<MemoryStore> {
		service(self.store.clone(), fees)
	}

	pub fn balance(&self, account: &Account) -> BigDecimal {
		self.store.account(&account.id).unwrap().balance
	}
}

pub struct AccountFactory {
	store: Arc<MemoryStore>,
}

impl AccountFactory {
	pub fn checking(&self, currency: &Currency, balance: i64, overdraft_limit: i64) -> Account {
		let mut account = Account::open_checking(
			Id::new_v4(),
			currency.id,
			BigDecimal::from(overdraft_limit),
			Utc::now(),
		).unwrap();
		account.balance = BigDecimal::from(balance);
		self.store.insert_account(account)
	}

	pub fn savings(&self, currency: &Currency, balance: i64) -> Account {
		let mut account = Account::open_savings(
			Id::new_v4(),
			currency.id,
			dec("0.02"),
			AccrualSchedule::Monthly,
			Utc::now(),
		).unwrap();
		account.balance = BigDecimal::from(balance);
		self.store.insert_account(account)
	}

	pub fn insert(&self, account: Account) -> Account {
		self.store.insert_account(account)
	}
}

type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// Wraps a memory store and runs a one-shot hook right before the next
/// change set is applied, to play the part of a concurrent writer
pub struct HookedStore {
	pub inner: Arc<MemoryStore>,
	hook: Mutex<Option<Hook>>,
}

impl HookedStore {
	pub fn new<F>(inner: Arc<MemoryStore>, hook: F) -> Self
	where
		F: FnOnce(&MemoryStore) + Send + 'static,
	{
		HookedStore {
			inner,
			hook: Mutex::new(Some(Box::new(hook))),
		}
	}
}

#[async_trait]
impl AccountRepository for HookedStore {
	async fn find_account(&self, account_id: &Id) -> db::Result<Option<Account>> {
		self.inner.find_account(account_id).await
	}

	async fn find_accounts_by_owner(&self, user_id: &Id) -> db::Result<Vec<Account>> {
		self.inner.find_accounts_by_owner(user_id).await
	}
}

#[async_trait]
impl CurrencyRepository for HookedStore {
	async fn find_currency(&self, key: CurrencyKey<'_>) -> db::Result<Option<Currency>> {
		self.inner.find_currency(key).await
	}
}

#[async_trait]
impl LedgerRepository for HookedStore {
	async fn find_ledger_entries(&self, account_id: &Id, query: &LedgerQuery) -> db::Result<Vec<LedgerEntry>> {
		self.inner.find_ledger_entries(account_id, query).await
	}
}

#[async_trait]
impl InterestLogRepository for HookedStore {
	async fn find_interest_logs(&self, account_id: &Id) -> db::Result<Vec<InterestLog>> {
		self.inner.find_interest_logs(account_id).await
	}
}

#[async_trait]
impl UnitOfWork for HookedStore {
	async fn apply(&self, changes: ChangeSet) -> db::Result<()> {
		let hook = self.hook.lock().unwrap().take();
		if let Some(hook) = hook {
			hook(&self.inner);
		}
		self.inner.apply(changes).await
	}
}

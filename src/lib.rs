pub mod account;
pub mod account_transaction;
pub mod bank;
pub mod config;
pub mod conversion;
pub mod currency;
pub mod db;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod memory;
pub mod schema;
pub mod transaction;
pub mod types;
pub mod uow;

pub use account::{Account, AccountKind, AccountType, AccrualSchedule, InterestLog};
pub use account_transaction::{AccountTransaction, Role};
pub use bank::{Access, Context, NewService, RetryPolicy, Service};
pub use config::Config;
pub use conversion::ConversionService;
pub use currency::{Currency, CurrencyKey};
pub use error::DomainError;
pub use fee::{FeePolicy, FeeRule, FeeSchedule, NoFee};
pub use ledger::{LedgerEntry, LedgerQuery};
pub use memory::MemoryStore;
pub use transaction::{Transaction, TransactionType};
pub use types::{Clock, Id, SystemClock, Time};
pub use uow::{Session, Store, UnitOfWork};

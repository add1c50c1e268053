use std::collections::{HashMap, HashSet};

use bigdecimal::{BigDecimal, Signed, Zero};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::account_transaction::{AccountTransaction, Role};
use crate::db;
use crate::error::{DomainError, Kind, Result};
use crate::schema::{account_transactions, transactions};
use crate::transaction::{Transaction, TransactionType};
use crate::types::{Id, Time};

/// A ledger header together with its legs.
///
/// Built only through [`LedgerEntry::new`] and the helpers on top of it, so
/// every entry in hand has the double-entry shape: deposits and withdrawals
/// carry one Source leg, transfers one Source and one Target leg on two
/// different accounts.
///
/// ```compile_fail
/// use bank_ledger::{LedgerEntry, Transaction, TransactionType};
///
/// let header = Transaction::new(TransactionType::Transfer, chrono::Utc::now());
/// let entry = LedgerEntry { transaction: header, legs: Vec::new() };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
	transaction: Transaction,
	legs: Vec<AccountTransaction>,
}

fn invalid(msg: impl Into<String>) -> DomainError {
	DomainError::new(Kind::InvalidLedger(msg.into()))
}

impl LedgerEntry {
	pub fn new(transaction: Transaction, mut legs: Vec<AccountTransaction>) -> Result<LedgerEntry> {
		let kind = transaction.transaction_type;
		if legs.len() != kind.leg_count() {
			return Err(invalid(format!("{} needs {} leg(s), got {}", kind, kind.leg_count(), legs.len())));
		}

		for leg in &legs {
			if leg.transaction_id != transaction.id {
				return Err(invalid("leg belongs to another transaction"));
			}
			if !leg.amount.is_positive() {
				return Err(invalid("leg amount must be positive"));
			}
			if leg.fee.is_negative() {
				return Err(invalid("leg fee must not be negative"));
			}
			if leg.role == Role::Target && !leg.fee.is_zero() {
				return Err(invalid("only the source leg carries a fee"));
			}
		}

		match kind {
			TransactionType::Deposit | TransactionType::Withdraw => {
				if legs[0].role != Role::Source {
					return Err(invalid("single leg must be the source"));
				}
				if kind == TransactionType::Deposit && !legs[0].fee.is_zero() {
					return Err(invalid("deposits carry no fee"));
				}
			}
			TransactionType::Transfer => {
				// Source first, Target second
				legs.sort_by_key(|leg| leg.role == Role::Target);
				if legs[0].role != Role::Source || legs[1].role != Role::Target {
					return Err(invalid("transfer needs one source and one target leg"));
				}
				if legs[0].account_id == legs[1].account_id {
					return Err(invalid("transfer legs must reference different accounts"));
				}
			}
		}

		Ok(LedgerEntry { transaction, legs })
	}

	/// Entry for a deposit or withdrawal on one account
	pub fn single(
		kind: TransactionType,
		account: &Account,
		currency_code: &str,
		amount: BigDecimal,
		fee: BigDecimal,
		at: Time,
	) -> Result<LedgerEntry> {
		let transaction = Transaction::new(kind, at);
		let leg = AccountTransaction {
			account_id: account.id,
			transaction_id: transaction.id,
			role: Role::Source,
			currency_code: currency_code.to_string(),
			amount,
			fee,
		};
		LedgerEntry::new(transaction, vec![leg])
	}

	/// Entry for a transfer. `amount` is in the source currency, `converted` in the target currency.
	pub fn transfer(
		source: (&Account, &str),
		target: (&Account, &str),
		amount: BigDecimal,
		fee: BigDecimal,
		converted: BigDecimal,
		at: Time,
	) -> Result<LedgerEntry> {
		let transaction = Transaction::new(TransactionType::Transfer, at);
		let legs = vec![
			AccountTransaction {
				account_id: source.0.id,
				transaction_id: transaction.id,
				role: Role::Source,
				currency_code: source.1.to_string(),
				amount,
				fee,
			},
			AccountTransaction {
				account_id: target.0.id,
				transaction_id: transaction.id,
				role: Role::Target,
				currency_code: target.1.to_string(),
				amount: converted,
				fee: BigDecimal::zero(),
			},
		];
		LedgerEntry::new(transaction, legs)
	}

	pub fn transaction(&self) -> &Transaction {
		&self.transaction
	}

	/// Source leg first, then the target leg of a transfer
	pub fn legs(&self) -> &[AccountTransaction] {
		&self.legs
	}

	pub fn id(&self) -> Id {
		self.transaction.id
	}

	pub fn transaction_type(&self) -> TransactionType {
		self.transaction.transaction_type
	}

	pub fn created_at(&self) -> Time {
		self.transaction.created_at
	}

	pub fn source(&self) -> &AccountTransaction {
		&self.legs[0]
	}

	pub fn target(&self) -> Option<&AccountTransaction> {
		self.legs.get(1)
	}

	/// Amount moved, in the source currency
	pub fn amount(&self) -> &BigDecimal {
		&self.source().amount
	}

	pub fn fees(&self) -> BigDecimal {
		self.legs.iter().map(|leg| &leg.fee).sum()
	}

	pub fn leg_for(&self, account_id: &Id) -> Option<&AccountTransaction> {
		self.legs.iter().find(|leg| &leg.account_id == account_id)
	}

	pub fn account_ids(&self) -> HashSet<Id> {
		self.legs.iter().map(|leg| leg.account_id).collect()
	}
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Paged query over an account's ledger, newest first
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerQuery {
	/// Inclusive lower bound on the transaction time
	pub from: Option<Time>,
	/// Exclusive upper bound on the transaction time
	pub to: Option<Time>,
	/// 1-based page number
	pub page: u32,
	pub per_page: u32,
}

impl Default for LedgerQuery {
	fn default() -> Self {
		LedgerQuery {
			from: None,
			to: None,
			page: 1,
			per_page: DEFAULT_PER_PAGE,
		}
	}
}

impl LedgerQuery {
	pub fn limit(&self) -> i64 {
		self.per_page.clamp(1, MAX_PER_PAGE) as i64
	}

	pub fn offset(&self) -> i64 {
		(self.page.max(1) as i64 - 1) * self.limit()
	}

	pub fn contains(&self, at: &Time) -> bool {
		self.from.map_or(true, |from| at >= &from) && self.to.map_or(true, |to| at < &to)
	}
}

/// Data store implementation for ledger headers and legs
pub struct Repo<'a> {
	conn: &'a mut PgConnection,
}

impl<'a> Repo<'a> {
	pub fn new(conn: &'a mut PgConnection) -> Self {
		Repo { conn }
	}

	pub fn create(&mut self, entry: &LedgerEntry) -> db::Result<()> {
		diesel::insert_into(transactions::table)
			.values(&entry.transaction)
			.execute(self.conn)?;
		diesel::insert_into(account_transactions::table)
			.values(&entry.legs)
			.execute(self.conn)?;
		Ok(())
	}

	pub fn find_by_account(&mut self, account_id: &Id, query: &LedgerQuery) -> db::Result<Vec<LedgerEntry>> {
		let mut headers = transactions::table
			.inner_join(account_transactions::table)
			.filter(account_transactions::account_id.eq(*account_id))
			.select(Transaction::as_select())
			.order(transactions::created_at.desc())
			.into_boxed();

		if let Some(from) = query.from {
			headers = headers.filter(transactions::created_at.ge(from));
		}
		if let Some(to) = query.to {
			headers = headers.filter(transactions::created_at.lt(to));
		}

		let headers: Vec<Transaction> = headers
			.offset(query.offset())
			.limit(query.limit())
			.load(self.conn)?;

		let ids: Vec<Id> = headers.iter().map(|t| t.id).collect();
		let legs: Vec<AccountTransaction> = account_transactions::table
			.filter(account_transactions::transaction_id.eq_any(&ids))
			.select(AccountTransaction::as_select())
			.load(self.conn)?;

		let mut legs_by_transaction: HashMap<Id, Vec<AccountTransaction>> = HashMap::new();
		for leg in legs {
			legs_by_transaction.entry(leg.transaction_id).or_default().push(leg);
		}

		headers
			.into_iter()
			.map(|header| {
				let legs = legs_by_transaction.remove(&header.id).unwrap_or_default();
				LedgerEntry::new(header, legs).map_err(|e| db::Error::InvalidRow(e.to_string()))
			})
			.collect()
	}
}

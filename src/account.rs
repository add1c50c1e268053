use std::convert::TryFrom;
use std::io::Write;

use bigdecimal::{BigDecimal, Signed, Zero};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use diesel::{AsExpression, FromSqlRow};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::error::{DomainError, Kind, Result};
use crate::schema::{accounts, interest_logs};
use crate::types::{Id, Time};

/// A customer account holding a balance in a single currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
	pub id: Id,
	pub account_number: String,
	pub user_id: Id,
	pub currency_id: Id,
	pub kind: AccountKind,
	pub balance: BigDecimal,
	pub created_at: Time,
	pub is_active: bool,
	/// Optimistic concurrency token, bumped by the store on every write
	pub version: i32,
}

/// Kind-specific account terms
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountKind {
	/// May go negative down to `-overdraft_limit` on plain withdrawals
	Checking { overdraft_limit: BigDecimal },
	/// Interest bearing, never overdrawn
	Savings {
		interest_rate: BigDecimal,
		accrual_schedule: AccrualSchedule,
	},
}

impl AccountKind {
	pub fn account_type(&self) -> AccountType {
		match self {
			AccountKind::Checking { .. } => AccountType::Checking,
			AccountKind::Savings { .. } => AccountType::Savings,
		}
	}
}

#[derive(AsExpression, FromSqlRow, Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
pub enum AccountType {
	Checking,
	Savings,
}

impl ToSql<Varchar, Pg> for AccountType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for AccountType {
	fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(bytes.as_bytes())?;
		Ok(s.parse()?)
	}
}

/// How often interest is accrued on a savings account
#[derive(AsExpression, FromSqlRow, Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccrualSchedule {
	Daily,
	Monthly,
	Quarterly,
	Annually,
}

impl ToSql<Varchar, Pg> for AccrualSchedule {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for AccrualSchedule {
	fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(bytes.as_bytes())?;
		Ok(s.parse()?)
	}
}

/// Generates a 12 digit account number
pub fn generate_account_number() -> String {
	let n = uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000;
	format!("{:012}", n)
}

fn ensure_positive(amount: &BigDecimal) -> Result<()> {
	if amount.is_positive() {
		Ok(())
	} else {
		Err(DomainError::new(Kind::InvalidAmount))
	}
}

impl Account {
	/// Opens an empty checking account
	pub fn open_checking(user_id: Id, currency_id: Id, overdraft_limit: BigDecimal, now: Time) -> Result<Account> {
		if overdraft_limit.is_negative() {
			return Err(DomainError::new(Kind::InvalidAmount));
		}
		Ok(Account::open(user_id, currency_id, AccountKind::Checking { overdraft_limit }, now))
	}

	/// Opens an empty savings account
	pub fn open_savings(
		user_id: Id,
		currency_id: Id,
		interest_rate: BigDecimal,
		accrual_schedule: AccrualSchedule,
		now: Time,
	) -> Result<Account> {
		if interest_rate.is_negative() {
			return Err(DomainError::new(Kind::InvalidAmount));
		}
		Ok(Account::open(user_id, currency_id, AccountKind::Savings { interest_rate, accrual_schedule }, now))
	}

	fn open(user_id: Id, currency_id: Id, kind: AccountKind, now: Time) -> Account {
		Account {
			id: Id::new_v4(),
			account_number: generate_account_number(),
			user_id,
			currency_id,
			kind,
			balance: BigDecimal::zero(),
			created_at: now,
			is_active: true,
			version: 0,
		}
	}

	pub fn account_type(&self) -> AccountType {
		self.kind.account_type()
	}

	/// Funds a plain withdrawal may draw on, overdraft included
	pub fn available(&self) -> BigDecimal {
		match &self.kind {
			AccountKind::Checking { overdraft_limit } => &self.balance + overdraft_limit,
			AccountKind::Savings { .. } => self.balance.clone(),
		}
	}

	pub fn deposit(&mut self, amount: &BigDecimal) -> Result<()> {
		ensure_positive(amount)?;
		self.balance += amount;
		Ok(())
	}

	/// Withdraw funds, drawing on the overdraft of a checking account
	pub fn withdraw(&mut self, amount: &BigDecimal) -> Result<()> {
		ensure_positive(amount)?;
		let available = self.available();
		self.debit(amount, available)
	}

	/// Withdraw funds to be moved into another account.
	/// The overdraft never funds a transfer, whatever the account kind.
	pub fn withdraw_for_transfer(&mut self, amount: &BigDecimal) -> Result<()> {
		ensure_positive(amount)?;
		let available = self.balance.clone();
		self.debit(amount, available)
	}

	fn debit(&mut self, amount: &BigDecimal, available: BigDecimal) -> Result<()> {
		if amount > &available {
			return Err(DomainError::insufficient_funds(amount - available));
		}
		self.balance -= amount;
		Ok(())
	}

	/// Credit accrued interest to a savings account
	pub fn post_interest(&mut self, amount: &BigDecimal) -> Result<()> {
		match self.kind {
			AccountKind::Savings { .. } => self.deposit(amount),
			AccountKind::Checking { .. } => Err(DomainError::new(Kind::NotInterestBearing)),
		}
	}

	/// Mark the account inactive. Only empty accounts can be closed.
	pub fn deactivate(&mut self) -> Result<()> {
		if !self.balance.is_zero() {
			return Err(DomainError::new(Kind::NonZeroBalance));
		}
		self.is_active = false;
		Ok(())
	}
}

/// Interest accrued on a savings account, appended by the accrual job
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = interest_logs)]
pub struct InterestLog {
	pub id: Id,
	pub account_id: Id,
	pub amount: BigDecimal,
	pub created_at: Time,
}

/// Flat row of the accounts table
#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = accounts)]
pub struct AccountRow {
	pub id: Id,
	pub account_number: String,
	pub user_id: Id,
	pub currency_id: Id,
	pub account_type: AccountType,
	pub balance: BigDecimal,
	pub overdraft_limit: Option<BigDecimal>,
	pub interest_rate: Option<BigDecimal>,
	pub accrual_schedule: Option<AccrualSchedule>,
	pub created_at: Time,
	pub is_active: bool,
	pub version: i32,
}

impl TryFrom<AccountRow> for Account {
	type Error = db::Error;

	fn try_from(row: AccountRow) -> db::Result<Account> {
		let kind = match (row.account_type, row.overdraft_limit, row.interest_rate, row.accrual_schedule) {
			(AccountType::Checking, overdraft_limit, _, _) => AccountKind::Checking {
				overdraft_limit: overdraft_limit.unwrap_or_else(BigDecimal::zero),
			},
			(AccountType::Savings, _, Some(interest_rate), Some(accrual_schedule)) => AccountKind::Savings {
				interest_rate,
				accrual_schedule,
			},
			(AccountType::Savings, ..) => {
				return Err(db::Error::InvalidRow(format!("savings account {} has no interest terms", row.id)));
			}
		};

		Ok(Account {
			id: row.id,
			account_number: row.account_number,
			user_id: row.user_id,
			currency_id: row.currency_id,
			kind,
			balance: row.balance,
			created_at: row.created_at,
			is_active: row.is_active,
			version: row.version,
		})
	}
}

impl From<&Account> for AccountRow {
	fn from(account: &Account) -> Self {
		let (overdraft_limit, interest_rate, accrual_schedule) = match &account.kind {
			AccountKind::Checking { overdraft_limit } => (Some(overdraft_limit.clone()), None, None),
			AccountKind::Savings { interest_rate, accrual_schedule } => {
				(None, Some(interest_rate.clone()), Some(*accrual_schedule))
			}
		};

		AccountRow {
			id: account.id,
			account_number: account.account_number.clone(),
			user_id: account.user_id,
			currency_id: account.currency_id,
			account_type: account.account_type(),
			balance: account.balance.clone(),
			overdraft_limit,
			interest_rate,
			accrual_schedule,
			created_at: account.created_at,
			is_active: account.is_active,
			version: account.version,
		}
	}
}

/// Data store implementation for accounts and their interest logs
pub struct Repo<'a> {
	conn: &'a mut PgConnection,
}

impl<'a> Repo<'a> {
	pub fn new(conn: &'a mut PgConnection) -> Self {
		Repo { conn }
	}

	pub fn create(&mut self, account: &Account) -> db::Result<Account> {
		let row = diesel::insert_into(accounts::table)
			.values(AccountRow::from(account))
			.returning(AccountRow::as_returning())
			.get_result(self.conn)?;
		Account::try_from(row)
	}

	pub fn find_by_id(&mut self, account_id: &Id) -> db::Result<Option<Account>> {
		accounts::table
			.find(*account_id)
			.select(AccountRow::as_select())
			.first(self.conn)
			.optional()?
			.map(Account::try_from)
			.transpose()
	}

	pub fn find_by_owner(&mut self, user_id: &Id) -> db::Result<Vec<Account>> {
		accounts::table
			.filter(accounts::user_id.eq(user_id))
			.order(accounts::created_at.asc())
			.select(AccountRow::as_select())
			.load(self.conn)?
			.into_iter()
			.map(Account::try_from)
			.collect()
	}

	/// Writes the mutable columns of `account` if the stored row is still at
	/// `expected_version`, bumping the version by one.
	pub fn update_versioned(&mut self, account: &Account, expected_version: i32) -> db::Result<()> {
		let updated = diesel::update(accounts::table)
			.filter(accounts::id.eq(account.id))
			.filter(accounts::version.eq(expected_version))
			.set((
				accounts::balance.eq(&account.balance),
				accounts::is_active.eq(account.is_active),
				accounts::version.eq(expected_version + 1),
			))
			.execute(self.conn)?;

		if updated == 0 {
			return Err(db::Error::Conflict(format!(
				"account {} is no longer at version {}", account.id, expected_version
			)));
		}
		Ok(())
	}

	pub fn find_interest_logs(&mut self, account_id: &Id) -> db::Result<Vec<InterestLog>> {
		interest_logs::table
			.filter(interest_logs::account_id.eq(account_id))
			.order(interest_logs::created_at.desc())
			.select(InterestLog::as_select())
			.load(self.conn)
			.map_err(Into::into)
	}

	pub fn create_interest_log(&mut self, log: &InterestLog) -> db::Result<InterestLog> {
		diesel::insert_into(interest_logs::table)
			.values(log)
			.returning(InterestLog::as_returning())
			.get_result(self.conn)
			.map_err(Into::into)
	}
}

use std::collections::HashSet;
use std::fmt;

use bigdecimal::{BigDecimal, One, Signed};
use diesel::prelude::*;
use serde::Serialize;

use crate::db;
use crate::error::{DomainError, Kind, Result};
use crate::schema::currencies;
use crate::types::Id;

/// A currency and its exchange rate against the base currency
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = currencies)]
pub struct Currency {
	pub id: Id,
	pub code: String,
	/// Units of this currency per one unit of the base currency
	pub exchange_rate: BigDecimal,
	pub is_base: bool,
	pub is_active: bool,
}

impl Currency {
	pub fn new(code: &str, exchange_rate: BigDecimal) -> Result<Currency> {
		let code = normalize_code(code)?;
		if !exchange_rate.is_positive() {
			return Err(DomainError::new(Kind::InvalidExchangeRate(code)));
		}
		Ok(Currency {
			id: Id::new_v4(),
			code,
			exchange_rate,
			is_base: false,
			is_active: true,
		})
	}

	/// The currency every exchange rate is expressed against
	pub fn base(code: &str) -> Result<Currency> {
		let mut currency = Currency::new(code, BigDecimal::one())?;
		currency.is_base = true;
		Ok(currency)
	}

	/// Exchange rate used for conversion. The base currency is always 1.
	pub fn rate(&self) -> Result<BigDecimal> {
		if self.is_base {
			return Ok(BigDecimal::one());
		}
		if !self.exchange_rate.is_positive() {
			return Err(DomainError::new(Kind::InvalidExchangeRate(self.code.clone())));
		}
		Ok(self.exchange_rate.clone())
	}

	pub fn ensure_active(&self) -> Result<()> {
		if self.is_active {
			Ok(())
		} else {
			Err(DomainError::new(Kind::CurrencyInactive(self.code.clone())))
		}
	}
}

/// Upper-cases a currency code and checks it is 3 to 5 ASCII alphanumerics
pub fn normalize_code(code: &str) -> Result<String> {
	let code = code.trim().to_ascii_uppercase();
	let valid = (3..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
	if !valid {
		return Err(DomainError::new(Kind::InvalidCurrencyCode(code)));
	}
	Ok(code)
}

/// Checks a set of currencies has unique codes and at most one base currency
pub fn check_registry(currencies: &[Currency]) -> Result<()> {
	if currencies.iter().filter(|c| c.is_base).count() > 1 {
		return Err(DomainError::new(Kind::MultipleBaseCurrencies));
	}

	let mut seen = HashSet::new();
	for currency in currencies {
		if !seen.insert(currency.code.as_str()) {
			return Err(DomainError::new(Kind::InvalidCurrencyCode(currency.code.clone())));
		}
	}
	Ok(())
}

/// Lookup key for a currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyKey<'a> {
	ID(Id),
	Code(&'a str),
}

impl fmt::Display for CurrencyKey<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			CurrencyKey::ID(id) => write!(f, "{}", id),
			CurrencyKey::Code(code) => write!(f, "{}", code),
		}
	}
}

/// Data store implementation for currencies
pub struct Repo<'a> {
	conn: &'a mut PgConnection,
}

impl<'a> Repo<'a> {
	pub fn new(conn: &'a mut PgConnection) -> Self {
		Repo { conn }
	}

	pub fn create(&mut self, currency: &Currency) -> db::Result<Currency> {
		diesel::insert_into(currencies::table)
			.values(currency)
			.returning(Currency::as_returning())
			.get_result(self.conn)
			.map_err(Into::into)
	}

	pub fn find(&mut self, key: CurrencyKey) -> db::Result<Option<Currency>> {
		match key {
			CurrencyKey::ID(id) => {
				currencies::table
					.find(id)
					.select(Currency::as_select())
					.first(self.conn)
					.optional()
					.map_err(Into::into)
			}
			CurrencyKey::Code(code) => {
				let code = code.trim().to_ascii_uppercase();
				currencies::table
					.filter(currencies::code.eq(code))
					.select(Currency::as_select())
					.first(self.conn)
					.optional()
					.map_err(Into::into)
			}
		}
	}
}

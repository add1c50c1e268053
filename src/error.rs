use std::error;
use std::fmt;

use bigdecimal::BigDecimal;

/// An error raised by a domain rule on accounts, currencies or the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct DomainError {
	kind: Kind,
}

impl DomainError {
	pub fn new(kind: Kind) -> DomainError {
		DomainError { kind }
	}

	pub fn kind(&self) -> &Kind {
		&self.kind
	}

	pub fn insufficient_funds(shortfall: BigDecimal) -> DomainError {
		DomainError::new(Kind::InsufficientFunds { shortfall })
	}
}

/// The kind of a domain error.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
	/// Amounts moved through an account or converted must be positive
	InvalidAmount,
	InsufficientFunds { shortfall: BigDecimal },
	CurrencyNotFound(String),
	CurrencyInactive(String),
	InvalidExchangeRate(String),
	InvalidCurrencyCode(String),
	MultipleBaseCurrencies,
	/// A ledger entry whose legs break the double-entry shape
	InvalidLedger(String),
	NotInterestBearing,
	NonZeroBalance,
}

impl fmt::Display for DomainError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			Kind::InvalidAmount => write!(f, "amount must be greater than zero"),
			Kind::InsufficientFunds { shortfall } => {
				write!(f, "not enough funds in account, short by {}", shortfall)
			}
			Kind::CurrencyNotFound(key) => write!(f, "currency {} does not exist", key),
			Kind::CurrencyInactive(code) => write!(f, "currency {} is not active", code),
			Kind::InvalidExchangeRate(code) => write!(f, "currency {} has a non-positive exchange rate", code),
			Kind::InvalidCurrencyCode(code) => write!(f, "invalid currency code: {:?}", code),
			Kind::MultipleBaseCurrencies => write!(f, "more than one currency is marked as base"),
			Kind::InvalidLedger(msg) => write!(f, "invalid ledger entry: {}", msg),
			Kind::NotInterestBearing => write!(f, "account does not bear interest"),
			Kind::NonZeroBalance => write!(f, "account balance must be zero"),
		}
	}
}

impl error::Error for DomainError {}

pub type Result<T> = std::result::Result<T, DomainError>;

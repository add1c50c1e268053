use std::error;
use std::fmt;

use bigdecimal::BigDecimal;

use crate::{conversion, db};
use crate::error::{DomainError, Kind};

/// An error returned by a banking operation
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
	kind: ErrorKind,
	message: String,
}

impl Error {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Error {
		Error {
			kind,
			message: message.into(),
		}
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn not_found(message: impl Into<String>) -> Error {
		Error::new(ErrorKind::NotFound, message)
	}

	pub fn bad_request(message: impl Into<String>) -> Error {
		Error::new(ErrorKind::BadRequest, message)
	}
}

/// The kind of an error that can occur.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
	InvalidAmount,
	/// Missing account or currency
	NotFound,
	/// Inactive account or currency, or otherwise unusable state
	BadRequest,
	InsufficientFunds { shortfall: BigDecimal },
	InvalidOperation,
	Forbidden,
	/// Concurrent writers kept winning until the retry bound ran out
	Conflict,
	Cancelled,
	Database(db::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let kind = match &self.kind {
			ErrorKind::InvalidAmount => "invalid amount",
			ErrorKind::NotFound => "not found",
			ErrorKind::BadRequest => "bad request",
			ErrorKind::InsufficientFunds { .. } => "insufficient funds",
			ErrorKind::InvalidOperation => "invalid operation",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::Conflict => "conflict",
			ErrorKind::Cancelled => "cancelled",
			ErrorKind::Database(_) => "db error",
		};
		write!(f, "{}: {}", kind, self.message)
	}
}

impl error::Error for Error {}

impl From<DomainError> for Error {
	fn from(e: DomainError) -> Self {
		let kind = match e.kind() {
			Kind::InvalidAmount => ErrorKind::InvalidAmount,
			Kind::InsufficientFunds { shortfall } => ErrorKind::InsufficientFunds { shortfall: shortfall.clone() },
			Kind::CurrencyNotFound(_) => ErrorKind::NotFound,
			Kind::NotInterestBearing => ErrorKind::InvalidOperation,
			Kind::CurrencyInactive(_)
			| Kind::InvalidExchangeRate(_)
			| Kind::InvalidCurrencyCode(_)
			| Kind::MultipleBaseCurrencies
			| Kind::InvalidLedger(_)
			| Kind::NonZeroBalance => ErrorKind::BadRequest,
		};
		Error::new(kind, e.to_string())
	}
}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		match e {
			db::Error::RecordNotFound => Error::not_found(e.to_string()),
			db::Error::Conflict(_) => Error::new(ErrorKind::Conflict, e.to_string()),
			_ => Error::new(ErrorKind::Database(e.clone()), e.to_string()),
		}
	}
}

impl From<conversion::Error> for Error {
	fn from(e: conversion::Error) -> Self {
		match e {
			conversion::Error::Domain(e) => e.into(),
			conversion::Error::Store(e) => e.into(),
		}
	}
}

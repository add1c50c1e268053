use bigdecimal::{BigDecimal, RoundingMode, Zero};

use crate::account::Account;
use crate::transaction::TransactionType;

/// Decimal places kept on a computed fee
pub const FEE_SCALE: i64 = 2;

/// Decides the fee charged to the source account of a money movement
pub trait FeePolicy: Send + Sync {
	fn fee(&self, kind: TransactionType, account: &Account, amount: &BigDecimal) -> BigDecimal;
}

/// Charges nothing
pub struct NoFee;

impl FeePolicy for NoFee {
	fn fee(&self, _: TransactionType, _: &Account, _: &BigDecimal) -> BigDecimal {
		BigDecimal::zero()
	}
}

/// A fixed or percentage fee with optional bounds
#[derive(Debug, Clone, PartialEq)]
pub struct FeeRule {
	pub fixed_amount: Option<BigDecimal>,
	/// Fraction of the amount, e.g. 0.01 for 1%
	pub percentage: Option<BigDecimal>,
	pub min_fee: BigDecimal,
	pub max_fee: Option<BigDecimal>,
}

impl FeeRule {
	pub fn fixed(amount: BigDecimal) -> Self {
		FeeRule {
			fixed_amount: Some(amount),
			percentage: None,
			min_fee: BigDecimal::zero(),
			max_fee: None,
		}
	}

	pub fn percentage(rate: BigDecimal, min_fee: BigDecimal, max_fee: Option<BigDecimal>) -> Self {
		FeeRule {
			fixed_amount: None,
			percentage: Some(rate),
			min_fee,
			max_fee,
		}
	}

	pub fn calculate(&self, amount: &BigDecimal) -> BigDecimal {
		if let Some(fixed) = &self.fixed_amount {
			return fixed.clone();
		}

		let mut fee = match &self.percentage {
			Some(rate) => (amount * rate).with_scale_round(FEE_SCALE, RoundingMode::HalfUp),
			None => BigDecimal::zero(),
		};
		if fee < self.min_fee {
			fee = self.min_fee.clone();
		}
		if let Some(max) = &self.max_fee {
			if &fee > max {
				fee = max.clone();
			}
		}
		fee
	}
}

/// Per transaction type fee rules. Deposits are always free.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
	pub withdraw: Option<FeeRule>,
	pub transfer: Option<FeeRule>,
}

impl FeePolicy for FeeSchedule {
	fn fee(&self, kind: TransactionType, _: &Account, amount: &BigDecimal) -> BigDecimal {
		let rule = match kind {
			TransactionType::Deposit => None,
			TransactionType::Withdraw => self.withdraw.as_ref(),
			TransactionType::Transfer => self.transfer.as_ref(),
		};
		rule.map_or_else(BigDecimal::zero, |rule| rule.calculate(amount))
	}
}

#[cfg(test)]
mod tests {
	use chrono::Utc;

	use super::*;
	use crate::types::Id;

	fn dec(s: &str) -> BigDecimal {
		s.parse().unwrap()
	}

	#[test]
	fn fixed_fee() {
		assert_eq!(FeeRule::fixed(dec("1.50")).calculate(&dec("1000")), dec("1.5"));
	}

	#[test]
	fn percentage_fee_is_clamped() {
		let rule = FeeRule::percentage(dec("0.01"), dec("0.50"), Some(dec("10")));
		assert_eq!(rule.calculate(&dec("100")), dec("1"));
		assert_eq!(rule.calculate(&dec("10")), dec("0.5"));
		assert_eq!(rule.calculate(&dec("5000")), dec("10"));
		assert_eq!(rule.calculate(&dec("123.45")), dec("1.23"));
	}

	#[test]
	fn schedule_never_charges_deposits() {
		let account = Account::open_checking(Id::new_v4(), Id::new_v4(), BigDecimal::zero(), Utc::now()).unwrap();
		let schedule = FeeSchedule {
			withdraw: Some(FeeRule::fixed(dec("2"))),
			transfer: None,
		};

		assert!(schedule.fee(TransactionType::Deposit, &account, &dec("100")).is_zero());
		assert_eq!(schedule.fee(TransactionType::Withdraw, &account, &dec("100")), dec("2"));
		assert!(schedule.fee(TransactionType::Transfer, &account, &dec("100")).is_zero());
		assert!(NoFee.fee(TransactionType::Withdraw, &account, &dec("100")).is_zero());
	}
}

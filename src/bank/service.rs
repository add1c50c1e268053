use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Signed, Zero};
use log::{debug, info, warn};

use crate::account::{Account, AccountKind, InterestLog};
use crate::conversion::{self, ConversionService};
use crate::currency::{Currency, CurrencyKey};
use crate::error::{DomainError, Kind};
use crate::fee::FeePolicy;
use crate::ledger::{LedgerEntry, LedgerQuery};
use crate::transaction::TransactionType;
use crate::types::{Clock, Id};
use crate::uow::{Session, Store};

use super::access::Access;
use super::cancel::CancelSignal;
use super::error::{Error, ErrorKind};
use super::retry::RetryPolicy;

pub type Result<T> = std::result::Result<T, Error>;

/// Per-request inputs decided outside the engine
#[derive(Debug, Clone)]
pub struct Context {
	pub access: Access,
	pub cancel: CancelSignal,
}

impl Context {
	pub fn new(access: Access) -> Self {
		Context {
			access,
			cancel: CancelSignal::never(),
		}
	}

	pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
		self.cancel = cancel;
		self
	}

	fn ensure_running(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			Err(Error::new(ErrorKind::Cancelled, "operation was cancelled"))
		} else {
			Ok(())
		}
	}
}

/// Service for moving money between accounts and reporting on them
pub struct Service<S> {
	store: Arc<S>,
	converter: ConversionService<S>,
	fees: Arc<dyn FeePolicy>,
	clock: Arc<dyn Clock>,
	retry: RetryPolicy,
}

/// Parameter object for creating a new Service
pub struct NewService<S> {
	pub store: Arc<S>,
	pub fees: Arc<dyn FeePolicy>,
	pub clock: Arc<dyn Clock>,
	pub retry: RetryPolicy,
	pub currency_cache_ttl: Duration,
}

/// One business operation, staged on a session and re-run on conflict
#[async_trait]
trait Operation<S: Store + 'static>: Send + Sync {
	type Output: Send;

	fn name(&self) -> &'static str;

	async fn stage(&self, service: &Service<S>, ctx: &Context, session: &mut Session) -> Result<Self::Output>;
}

struct Deposit {
	account_id: Id,
	amount: BigDecimal,
}

struct Withdraw {
	account_id: Id,
	amount: BigDecimal,
}

struct Transfer {
	source_id: Id,
	target_id: Id,
	amount: BigDecimal,
}

struct Close {
	account_id: Id,
}

#[async_trait]
impl<S: Store + 'static> Operation<S> for Deposit {
	type Output = LedgerEntry;

	fn name(&self) -> &'static str {
		"deposit"
	}

	async fn stage(&self, service: &Service<S>, ctx: &Context, session: &mut Session) -> Result<LedgerEntry> {
		let mut account = service.load_active_account(ctx, session, &self.account_id).await?;
		let currency = service.load_currency(ctx, &account).await?;

		account.deposit(&self.amount)?;
		let entry = LedgerEntry::single(
			TransactionType::Deposit,
			&account,
			&currency.code,
			self.amount.clone(),
			BigDecimal::zero(),
			service.clock.now(),
		)?;

		session.update(account)?;
		session.add(entry.clone());
		Ok(entry)
	}
}

#[async_trait]
impl<S: Store + 'static> Operation<S> for Withdraw {
	type Output = LedgerEntry;

	fn name(&self) -> &'static str {
		"withdraw"
	}

	async fn stage(&self, service: &Service<S>, ctx: &Context, session: &mut Session) -> Result<LedgerEntry> {
		let mut account = service.load_active_account(ctx, session, &self.account_id).await?;
		let currency = service.load_currency(ctx, &account).await?;

		let fee = service.fee_for(TransactionType::Withdraw, &account, &self.amount)?;
		account.withdraw(&(&self.amount + &fee))?;
		let entry = LedgerEntry::single(
			TransactionType::Withdraw,
			&account,
			&currency.code,
			self.amount.clone(),
			fee,
			service.clock.now(),
		)?;

		session.update(account)?;
		session.add(entry.clone());
		Ok(entry)
	}
}

#[async_trait]
impl<S: Store + 'static> Operation<S> for Transfer {
	type Output = LedgerEntry;

	fn name(&self) -> &'static str {
		"transfer"
	}

	async fn stage(&self, service: &Service<S>, ctx: &Context, session: &mut Session) -> Result<LedgerEntry> {
		let mut source = service.load_active_account(ctx, session, &self.source_id).await?;
		let mut target = service.load_active_account(ctx, session, &self.target_id).await?;
		let source_currency = service.load_currency(ctx, &source).await?;
		let target_currency = service.load_currency(ctx, &target).await?;

		// debit is checked and applied before the credit is worked out
		let fee = service.fee_for(TransactionType::Transfer, &source, &self.amount)?;
		source.withdraw_for_transfer(&(&self.amount + &fee))?;

		let converted = conversion::convert_amount(&source_currency, &target_currency, &self.amount)?;
		if !converted.is_positive() {
			return Err(Error::bad_request(format!(
				"{} {} converted to {} rounds to zero",
				self.amount, source_currency.code, target_currency.code,
			)));
		}
		target.deposit(&converted)?;

		let entry = LedgerEntry::transfer(
			(&source, &source_currency.code),
			(&target, &target_currency.code),
			self.amount.clone(),
			fee,
			converted,
			service.clock.now(),
		)?;

		session.update(source)?;
		session.update(target)?;
		session.add(entry.clone());
		Ok(entry)
	}
}

#[async_trait]
impl<S: Store + 'static> Operation<S> for Close {
	type Output = Account;

	fn name(&self) -> &'static str {
		"close account"
	}

	async fn stage(&self, service: &Service<S>, ctx: &Context, session: &mut Session) -> Result<Account> {
		let mut account = service.load_active_account(ctx, session, &self.account_id).await?;
		account.deactivate()?;
		session.update(account.clone())?;
		Ok(account)
	}
}

fn ensure_positive(amount: &BigDecimal) -> Result<()> {
	if amount.is_positive() {
		Ok(())
	} else {
		Err(DomainError::new(Kind::InvalidAmount).into())
	}
}

impl<S: Store + 'static> Service<S> {
	pub fn new(v: NewService<S>) -> Self {
		Service {
			converter: ConversionService::new(v.store.clone(), v.currency_cache_ttl),
			store: v.store,
			fees: v.fees,
			clock: v.clock,
			retry: v.retry,
		}
	}

	pub fn converter(&self) -> &ConversionService<S> {
		&self.converter
	}

	/// Deposit funds into an account
	///
	/// # Arguments
	/// * `account_id` - account credited with the funds
	/// * `amount` - amount deposited, in the account's currency
	pub async fn deposit(&self, ctx: &Context, account_id: &Id, amount: &BigDecimal) -> Result<LedgerEntry> {
		ctx.access.require_modify()?;
		ensure_positive(amount)?;
		self.execute(ctx, Deposit {
			account_id: *account_id,
			amount: amount.clone(),
		}).await
	}

	/// Withdraw funds from an account. The account is debited the amount plus
	/// the fee, and a checking account may dip into its overdraft to cover it.
	pub async fn withdraw(&self, ctx: &Context, account_id: &Id, amount: &BigDecimal) -> Result<LedgerEntry> {
		ctx.access.require_modify()?;
		ensure_positive(amount)?;
		self.execute(ctx, Withdraw {
			account_id: *account_id,
			amount: amount.clone(),
		}).await
	}

	/// Transfer funds from account to account, converting between their currencies
	///
	/// # Arguments
	/// * `source_id` - account debited with `amount` plus the transfer fee
	/// * `target_id` - account credited with the converted amount
	/// * `amount` - amount in the source account's currency
	pub async fn transfer(&self, ctx: &Context, source_id: &Id, target_id: &Id, amount: &BigDecimal) -> Result<LedgerEntry> {
		ctx.access.require_modify()?;
		if source_id == target_id {
			return Err(Error::new(ErrorKind::InvalidOperation, "cannot transfer to the same account"));
		}
		ensure_positive(amount)?;
		self.execute(ctx, Transfer {
			source_id: *source_id,
			target_id: *target_id,
			amount: amount.clone(),
		}).await
	}

	/// Deactivate an empty account
	pub async fn close_account(&self, ctx: &Context, account_id: &Id) -> Result<Account> {
		ctx.access.require_modify()?;
		self.execute(ctx, Close { account_id: *account_id }).await
	}

	pub async fn balance(&self, ctx: &Context, account_id: &Id) -> Result<Account> {
		ctx.access.require_view()?;
		ctx.ensure_running()?;
		self.find_account(account_id).await
	}

	pub async fn accounts_for_owner(&self, ctx: &Context, user_id: &Id) -> Result<Vec<Account>> {
		ctx.access.require_view()?;
		ctx.ensure_running()?;
		Ok(self.store.find_accounts_by_owner(user_id).await?)
	}

	/// Ledger entries touching an account, newest first
	pub async fn history(&self, ctx: &Context, account_id: &Id, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
		ctx.access.require_view()?;
		ctx.ensure_running()?;
		self.find_account(account_id).await?;
		ctx.ensure_running()?;
		Ok(self.store.find_ledger_entries(account_id, query).await?)
	}

	/// Interest credited to a savings account
	pub async fn interest_history(&self, ctx: &Context, account_id: &Id) -> Result<Vec<InterestLog>> {
		ctx.access.require_view()?;
		ctx.ensure_running()?;
		let account = self.find_account(account_id).await?;
		if let AccountKind::Checking { .. } = account.kind {
			return Err(DomainError::new(Kind::NotInterestBearing).into());
		}
		ctx.ensure_running()?;
		Ok(self.store.find_interest_logs(account_id).await?)
	}

	/// Value of `amount` of one currency in another, at the current rates
	pub async fn quote(&self, from: &str, to: &str, amount: &BigDecimal) -> Result<BigDecimal> {
		Ok(self.converter.convert(CurrencyKey::Code(from), CurrencyKey::Code(to), amount).await?)
	}

	/// Run an operation to completion, retrying it from scratch when another
	/// writer got to one of its accounts first
	async fn execute<O: Operation<S>>(&self, ctx: &Context, op: O) -> Result<O::Output> {
		let mut session = self.store.begin_transaction().await?;
		let mut attempt = 1;

		loop {
			let err = match self.attempt(ctx, &op, &mut session).await {
				Ok(output) => {
					self.store.commit(session).await?;
					info!(target: "bank::engine", "{} committed after {} attempt(s)", op.name(), attempt);
					return Ok(output);
				}
				Err(err) => err,
			};

			if *err.kind() != ErrorKind::Conflict {
				debug!(target: "bank::engine", "{} failed: {}", op.name(), err);
				self.store.rollback(session).await?;
				return Err(err);
			}

			if attempt >= self.retry.max_attempts {
				warn!(target: "bank::engine", "{} gave up after {} attempt(s): {}", op.name(), attempt, err);
				self.store.rollback(session).await?;
				return Err(Error::new(
					ErrorKind::Conflict,
					format!("{} conflicted with concurrent updates {} time(s)", op.name(), attempt),
				));
			}

			warn!(target: "bank::engine", "{} conflicted on attempt {}/{}, retrying", op.name(), attempt, self.retry.max_attempts);
			// reload only once the backoff has elapsed
			tokio::time::sleep(self.retry.delay(attempt)).await;
			if let Err(err) = self.reload(ctx, &mut session).await {
				self.store.rollback(session).await?;
				return Err(err);
			}
			attempt += 1;
		}
	}

	async fn attempt<O: Operation<S>>(&self, ctx: &Context, op: &O, session: &mut Session) -> Result<O::Output> {
		ctx.ensure_running()?;
		let output = op.stage(self, ctx, session).await?;
		ctx.ensure_running()?;
		self.store.save(session).await?;
		Ok(output)
	}

	async fn reload(&self, ctx: &Context, session: &mut Session) -> Result<()> {
		ctx.ensure_running()?;
		self.store.reload_tracked(session).await?;
		Ok(())
	}

	async fn find_account(&self, account_id: &Id) -> Result<Account> {
		self.store.find_account(account_id).await?
			.ok_or_else(|| Error::not_found(format!("account {} does not exist", account_id)))
	}

	/// Working copy of an account through the session, loading and tracking
	/// it on first use
	async fn load_active_account(&self, ctx: &Context, session: &mut Session, account_id: &Id) -> Result<Account> {
		let account = match session.tracked(account_id) {
			Some(account) => account.clone(),
			None => {
				ctx.ensure_running()?;
				let account = self.find_account(account_id).await?;
				session.track(account)
			}
		};
		if !account.is_active {
			return Err(Error::bad_request(format!("account {} is not active", account_id)));
		}
		Ok(account)
	}

	async fn load_currency(&self, ctx: &Context, account: &Account) -> Result<Currency> {
		ctx.ensure_running()?;
		Ok(self.converter.resolve(CurrencyKey::ID(account.currency_id)).await?)
	}

	fn fee_for(&self, kind: TransactionType, account: &Account, amount: &BigDecimal) -> Result<BigDecimal> {
		let fee = self.fees.fee(kind, account, amount);
		if fee.is_negative() {
			return Err(Error::bad_request(format!("fee policy returned a negative {} fee", kind)));
		}
		Ok(fee)
	}
}

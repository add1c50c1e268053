use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bigdecimal::{BigDecimal, RoundingMode, Signed};
use log::debug;
use tokio::time::Instant;

use crate::currency::{Currency, CurrencyKey};
use crate::db;
use crate::error::{DomainError, Kind};
use crate::types::Id;
use crate::uow::CurrencyRepository;

/// Decimal places kept on a converted amount
pub const CONVERSION_SCALE: i64 = 8;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(120);

/// Error raised while converting between currencies
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	Domain(DomainError),
	Store(db::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Domain(e) => write!(f, "{}", e),
			Error::Store(e) => write!(f, "currency lookup: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<DomainError> for Error {
	fn from(e: DomainError) -> Self {
		Error::Domain(e)
	}
}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::Store(e)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convert `amount` of `from` into `to`, pivoting through the base currency.
/// Same currency returns the amount untouched.
pub fn convert_amount(from: &Currency, to: &Currency, amount: &BigDecimal) -> std::result::Result<BigDecimal, DomainError> {
	if !amount.is_positive() {
		return Err(DomainError::new(Kind::InvalidAmount));
	}
	from.ensure_active()?;
	to.ensure_active()?;
	if from.id == to.id {
		return Ok(amount.clone());
	}

	let in_base = if from.is_base { amount.clone() } else { amount / from.rate()? };
	let converted = if to.is_base { in_base } else { in_base * to.rate()? };
	Ok(converted.with_scale_round(CONVERSION_SCALE, RoundingMode::HalfEven))
}

#[derive(Debug)]
struct Cached {
	currency: Currency,
	fetched_at: Instant,
}

#[derive(Debug, Default)]
struct Cache {
	by_id: HashMap<Id, Cached>,
	ids_by_code: HashMap<String, Id>,
}

/// Currency conversion over a repository, with a short-lived cache of
/// currency rows keyed by id and code
pub struct ConversionService<R> {
	repo: Arc<R>,
	ttl: Duration,
	cache: RwLock<Cache>,
}

impl<R: CurrencyRepository> ConversionService<R> {
	pub fn new(repo: Arc<R>, ttl: Duration) -> Self {
		ConversionService {
			repo,
			ttl,
			cache: RwLock::new(Cache::default()),
		}
	}

	/// Look up an active currency
	pub async fn resolve(&self, key: CurrencyKey<'_>) -> Result<Currency> {
		let currency = self.lookup(key).await?
			.ok_or_else(|| DomainError::new(Kind::CurrencyNotFound(key.to_string())))?;
		currency.ensure_active()?;
		Ok(currency)
	}

	pub async fn convert(&self, from: CurrencyKey<'_>, to: CurrencyKey<'_>, amount: &BigDecimal) -> Result<BigDecimal> {
		if !amount.is_positive() {
			return Err(DomainError::new(Kind::InvalidAmount).into());
		}
		let from = self.resolve(from).await?;
		let to = self.resolve(to).await?;
		let converted = convert_amount(&from, &to, amount)?;
		debug!(target: "bank::conversion", "{} {} -> {} {}", amount, from.code, converted, to.code);
		Ok(converted)
	}

	/// Drop every cached currency. Called after rate or base changes.
	pub fn invalidate(&self) {
		let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
		cache.by_id.clear();
		cache.ids_by_code.clear();
	}

	pub fn invalidate_currency(&self, key: CurrencyKey<'_>) {
		let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
		let id = match key {
			CurrencyKey::ID(id) => Some(id),
			CurrencyKey::Code(code) => cache.ids_by_code.get(&code.trim().to_ascii_uppercase()).copied(),
		};
		if let Some(id) = id {
			if let Some(cached) = cache.by_id.remove(&id) {
				cache.ids_by_code.remove(&cached.currency.code);
			}
		}
	}

	async fn lookup(&self, key: CurrencyKey<'_>) -> Result<Option<Currency>> {
		if let Some(currency) = self.cached(key) {
			return Ok(Some(currency));
		}

		let found = self.repo.find_currency(key).await?;
		if let Some(currency) = &found {
			let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
			cache.ids_by_code.insert(currency.code.clone(), currency.id);
			cache.by_id.insert(currency.id, Cached {
				currency: currency.clone(),
				fetched_at: Instant::now(),
			});
		}
		Ok(found)
	}

	fn cached(&self, key: CurrencyKey<'_>) -> Option<Currency> {
		let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
		let id = match key {
			CurrencyKey::ID(id) => id,
			CurrencyKey::Code(code) => *cache.ids_by_code.get(&code.trim().to_ascii_uppercase())?,
		};
		cache.by_id
			.get(&id)
			.filter(|cached| cached.fetched_at.elapsed() < self.ttl)
			.map(|cached| cached.currency.clone())
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use async_trait::async_trait;

	use super::*;
	use crate::memory::MemoryStore;

	fn dec(s: &str) -> BigDecimal {
		s.parse().unwrap()
	}

	/// Counts lookups that reach the repository
	struct Counting {
		inner: MemoryStore,
		hits: AtomicU32,
	}

	#[async_trait]
	impl CurrencyRepository for Counting {
		async fn find_currency(&self, key: CurrencyKey<'_>) -> db::Result<Option<Currency>> {
			self.hits.fetch_add(1, Ordering::SeqCst);
			self.inner.find_currency(key).await
		}
	}

	fn registry() -> (Arc<Counting>, Currency, Currency, Currency) {
		let store = MemoryStore::new();
		let usd = store.insert_currency(Currency::base("USD").unwrap()).unwrap();
		let eur = store.insert_currency(Currency::new("EUR", dec("0.9")).unwrap()).unwrap();
		let gbp = store.insert_currency(Currency::new("GBP", dec("0.8")).unwrap()).unwrap();
		(Arc::new(Counting { inner: store, hits: AtomicU32::new(0) }), usd, eur, gbp)
	}

	#[test]
	fn pivot_through_base() {
		let usd = Currency::base("USD").unwrap();
		let eur = Currency::new("EUR", dec("0.9")).unwrap();
		let gbp = Currency::new("GBP", dec("0.8")).unwrap();

		assert_eq!(convert_amount(&usd, &eur, &dec("100")).unwrap(), dec("90"));
		assert_eq!(convert_amount(&eur, &usd, &dec("90")).unwrap(), dec("100"));
		// 90 EUR = 100 USD = 80 GBP
		assert_eq!(convert_amount(&eur, &gbp, &dec("90")).unwrap(), dec("80"));
	}

	#[test]
	fn identity_is_exact() {
		let eur = Currency::new("EUR", dec("0.9")).unwrap();
		let amount = dec("0.123456789123");
		assert_eq!(convert_amount(&eur, &eur, &amount).unwrap().to_string(), "0.123456789123");
	}

	#[test]
	fn round_trip_within_tolerance() {
		let usd = Currency::base("USD").unwrap();
		let jpy = Currency::new("JPY", dec("151.37")).unwrap();
		let tolerance = dec("0.000001");

		for x in vec!["1", "0.01", "12345.67", "999999.99"] {
			let x = dec(x);
			let there = convert_amount(&usd, &jpy, &x).unwrap();
			let back = convert_amount(&jpy, &usd, &there).unwrap();
			assert!((back - &x).abs() < tolerance, "round trip of {} drifted", x);
		}
	}

	#[test]
	fn rejects_bad_input() {
		let usd = Currency::base("USD").unwrap();
		let mut eur = Currency::new("EUR", dec("0.9")).unwrap();

		let err = convert_amount(&usd, &eur, &dec("0")).unwrap_err();
		assert_eq!(err.kind(), &Kind::InvalidAmount);

		eur.is_active = false;
		let err = convert_amount(&usd, &eur, &dec("1")).unwrap_err();
		assert_eq!(err.kind(), &Kind::CurrencyInactive("EUR".to_string()));
	}

	#[tokio::test]
	async fn convert_by_code_and_id() {
		let (repo, usd, eur, _) = registry();
		let service = ConversionService::new(repo, DEFAULT_CACHE_TTL);

		let got = service.convert(CurrencyKey::Code("usd"), CurrencyKey::ID(eur.id), &dec("100")).await.unwrap();
		assert_eq!(got, dec("90"));

		let got = service.convert(CurrencyKey::ID(usd.id), CurrencyKey::Code("USD"), &dec("7")).await.unwrap();
		assert_eq!(got, dec("7"));
	}

	#[tokio::test]
	async fn unknown_currency() {
		let (repo, _, _, _) = registry();
		let service = ConversionService::new(repo, DEFAULT_CACHE_TTL);

		let err = service.convert(CurrencyKey::Code("USD"), CurrencyKey::Code("XYZ"), &dec("1")).await.unwrap_err();
		assert_eq!(err, Error::Domain(DomainError::new(Kind::CurrencyNotFound("XYZ".to_string()))));
	}

	#[tokio::test(start_paused = true)]
	async fn cache_expires() {
		let (repo, usd, eur, _) = registry();
		let service = ConversionService::new(repo.clone(), Duration::from_secs(60));

		service.convert(CurrencyKey::ID(usd.id), CurrencyKey::ID(eur.id), &dec("1")).await.unwrap();
		service.convert(CurrencyKey::Code("USD"), CurrencyKey::Code("EUR"), &dec("1")).await.unwrap();
		assert_eq!(repo.hits.load(Ordering::SeqCst), 2);

		tokio::time::advance(Duration::from_secs(61)).await;
		service.convert(CurrencyKey::ID(usd.id), CurrencyKey::ID(eur.id), &dec("1")).await.unwrap();
		assert_eq!(repo.hits.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn invalidation_picks_up_new_rates() {
		let (repo, usd, eur, _) = registry();
		let service = ConversionService::new(repo.clone(), DEFAULT_CACHE_TTL);
		assert_eq!(
			service.convert(CurrencyKey::ID(usd.id), CurrencyKey::ID(eur.id), &dec("10")).await.unwrap(),
			dec("9"),
		);

		let mut eur = eur;
		eur.exchange_rate = dec("0.5");
		repo.inner.insert_currency(eur.clone()).unwrap();

		// still cached
		assert_eq!(
			service.convert(CurrencyKey::ID(usd.id), CurrencyKey::ID(eur.id), &dec("10")).await.unwrap(),
			dec("9"),
		);

		service.invalidate_currency(CurrencyKey::Code("EUR"));
		assert_eq!(
			service.convert(CurrencyKey::ID(usd.id), CurrencyKey::ID(eur.id), &dec("10")).await.unwrap(),
			dec("5"),
		);

		service.invalidate();
		let hits = repo.hits.load(Ordering::SeqCst);
		service.resolve(CurrencyKey::ID(usd.id)).await.unwrap();
		assert_eq!(repo.hits.load(Ordering::SeqCst), hits + 1);
	}
}

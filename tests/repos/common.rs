use std::env;

use diesel::prelude::*;

pub use crate::common::*;
pub use bank_ledger::db::{self, PgStore};

/// Postgres backed store with emptied tables. Needs `DATABASE_URL`, and the
/// tests sharing it must run with `--test-threads=1`.
pub struct PgFixture {
	pub pool: db::PgPool,
	pub store: PgStore,
}

impl PgFixture {
	pub fn new() -> Self {
		dotenv::dotenv().ok();
		let url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
		let pool = db::pg_pool(&url).expect("connecting to postgres");
		let fixture = PgFixture {
			store: PgStore::new(pool.clone()),
			pool,
		};
		fixture.teardown();
		fixture
	}

	pub fn teardown(&self) {
		let tables = vec![
			"account_transactions",
			"transactions",
			"interest_logs",
			"accounts",
			"currencies",
		];
		let mut conn = self.pool.get().expect("pooled connection");
		for table in tables {
			diesel::sql_query(format!("DELETE FROM {}", table))
				.execute(&mut conn)
				.expect("deleting db table");
		}
	}

	pub async fn currencies(&self) -> (Currency, Currency) {
		let usd = self.store.create_currency(Currency::base("USD").unwrap()).await.unwrap();
		let eur = self.store.create_currency(Currency::new("EUR", dec("0.9")).unwrap()).await.unwrap();
		(usd, eur)
	}
}

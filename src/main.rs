use std::convert::Infallible;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use log::*;
use serde::{Deserialize, Serialize};
use warp::Filter;
use warp::filters::log::Info;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};

use bank_ledger::bank::{self, Access, Context, ErrorKind, NewService, Service};
use bank_ledger::db::{self, PgStore};
use bank_ledger::{Config, Id, LedgerQuery, NoFee, SystemClock};

type Bank = Arc<Service<PgStore>>;

#[derive(Deserialize)]
struct AmountRequest {
	amount: BigDecimal,
}

#[derive(Deserialize)]
struct TransferRequest {
	source_id: Id,
	target_id: Id,
	amount: BigDecimal,
}

#[derive(Deserialize)]
struct QuoteRequest {
	from: String,
	to: String,
	amount: BigDecimal,
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
	message: String,
}

#[tokio::main]
async fn main() {
	if std::env::var_os("RUST_LOG").is_none() {
		std::env::set_var("RUST_LOG", "info");
	}
	pretty_env_logger::init();

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!(target: "bank::api", "loading config: {}", e);
			std::process::exit(1);
		}
	};
	let pool = match db::pg_pool(&config.database_url) {
		Ok(pool) => pool,
		Err(e) => {
			error!(target: "bank::api", "{}", e);
			std::process::exit(1);
		}
	};

	let service: Bank = Arc::new(Service::new(NewService {
		store: Arc::new(PgStore::new(pool)),
		fees: Arc::new(NoFee),
		clock: Arc::new(SystemClock),
		retry: config.retry.clone(),
		currency_cache_ttl: config.currency_cache_ttl,
	}));

	let log = warp::log::custom(|info: Info| {
		info!(
			target: "bank::api",
			"\"{} {} {:?}\" \t{} {} {:?}",
			info.method(),
			info.path(),
			info.version(),
			info.status().canonical_reason().unwrap_or("-"),
			info.status().as_u16(),
			info.elapsed(),
		);
	});

	info!(target: "bank::api", "listening on {}", config.bind_addr);
	warp::serve(routes(service).with(log)).run(config.bind_addr).await;
}

fn routes(service: Bank) -> impl Filter<Extract = (WithStatus<Json>,), Error = warp::Rejection> + Clone {
	let deposit = warp::post()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path("deposit"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and(warp::body::json())
		.and_then(|id: Id, service: Bank, ctx: Context, req: AmountRequest| async move {
			reply(service.deposit(&ctx, &id, &req.amount).await)
		});

	let withdraw = warp::post()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path("withdraw"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and(warp::body::json())
		.and_then(|id: Id, service: Bank, ctx: Context, req: AmountRequest| async move {
			reply(service.withdraw(&ctx, &id, &req.amount).await)
		});

	let close = warp::post()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path("close"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and_then(|id: Id, service: Bank, ctx: Context| async move {
			reply(service.close_account(&ctx, &id).await)
		});

	let transfer = warp::post()
		.and(warp::path("transfers"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and(warp::body::json())
		.and_then(|service: Bank, ctx: Context, req: TransferRequest| async move {
			reply(service.transfer(&ctx, &req.source_id, &req.target_id, &req.amount).await)
		});

	let balance = warp::get()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and_then(|id: Id, service: Bank, ctx: Context| async move {
			reply(service.balance(&ctx, &id).await)
		});

	let history = warp::get()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path("transactions"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and(warp::query::<LedgerQuery>())
		.and_then(|id: Id, service: Bank, ctx: Context, query: LedgerQuery| async move {
			reply(service.history(&ctx, &id, &query).await)
		});

	let interest = warp::get()
		.and(warp::path("accounts"))
		.and(warp::path::param::<Id>())
		.and(warp::path("interest"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and_then(|id: Id, service: Bank, ctx: Context| async move {
			reply(service.interest_history(&ctx, &id).await)
		});

	let owner = warp::get()
		.and(warp::path("users"))
		.and(warp::path::param::<Id>())
		.and(warp::path("accounts"))
		.and(warp::path::end())
		.and(with_service(service.clone()))
		.and(context())
		.and_then(|user_id: Id, service: Bank, ctx: Context| async move {
			reply(service.accounts_for_owner(&ctx, &user_id).await)
		});

	let quote = warp::get()
		.and(warp::path("quote"))
		.and(warp::path::end())
		.and(with_service(service))
		.and(warp::query::<QuoteRequest>())
		.and_then(|service: Bank, req: QuoteRequest| async move {
			reply(service.quote(&req.from, &req.to, &req.amount).await)
		});

	deposit
		.or(withdraw).unify()
		.or(close).unify()
		.or(transfer).unify()
		.or(balance).unify()
		.or(history).unify()
		.or(interest).unify()
		.or(owner).unify()
		.or(quote).unify()
}

fn with_service(service: Bank) -> impl Filter<Extract = (Bank,), Error = Infallible> + Clone {
	warp::any().map(move || service.clone())
}

/// The access decision is made upstream and forwarded in a header.
/// Anything missing or unrecognised grants nothing.
fn context() -> impl Filter<Extract = (Context,), Error = warp::Rejection> + Clone {
	warp::header::optional::<String>("x-access-decision").map(|decision: Option<String>| {
		let access = decision
			.and_then(|d| d.parse::<Access>().ok())
			.unwrap_or(Access::NONE);
		Context::new(access)
	})
}

fn reply<T: Serialize>(result: bank::Result<T>) -> Result<WithStatus<Json>, Infallible> {
	Ok(match result {
		Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
		Err(e) => {
			let status = status_for(e.kind());
			let message = match e.kind() {
				ErrorKind::Database(_) => {
					error!(target: "bank::api", "{}", e);
					"internal error".to_string()
				}
				_ => e.message().to_string(),
			};
			let body = ErrorBody {
				error: status.canonical_reason().unwrap_or("error").to_string(),
				message,
			};
			warp::reply::with_status(warp::reply::json(&body), status)
		}
	})
}

fn status_for(kind: &ErrorKind) -> StatusCode {
	match kind {
		ErrorKind::InvalidAmount | ErrorKind::BadRequest | ErrorKind::InvalidOperation => StatusCode::BAD_REQUEST,
		ErrorKind::NotFound => StatusCode::NOT_FOUND,
		ErrorKind::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
		ErrorKind::Forbidden => StatusCode::FORBIDDEN,
		ErrorKind::Conflict => StatusCode::CONFLICT,
		ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
		ErrorKind::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

use std::io::Write;

use bigdecimal::BigDecimal;
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use diesel::{AsExpression, FromSqlRow};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::schema::account_transactions;
use crate::types::Id;

/// Side of a money movement an account is on
#[derive(AsExpression, FromSqlRow, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Source,
	Target,
}

impl ToSql<Varchar, Pg> for Role {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for Role {
	fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(bytes.as_bytes())?;
		Ok(s.parse()?)
	}
}

/// One leg of a ledger transaction, tied to a single account
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = account_transactions)]
pub struct AccountTransaction {
	pub account_id: Id,
	pub transaction_id: Id,
	pub role: Role,
	/// Code of the account's currency when the leg was posted
	pub currency_code: String,
	/// Amount in the leg's currency
	pub amount: BigDecimal,
	pub fee: BigDecimal,
}

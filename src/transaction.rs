use std::io::Write;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use diesel::{AsExpression, FromSqlRow};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::schema::transactions;
use crate::types::{Id, Time};

#[derive(AsExpression, FromSqlRow, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize)]
#[diesel(sql_type = Varchar)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
	/// Funds put into an account
	Deposit,
	/// Funds taken out of an account
	Withdraw,
	/// Funds moved from one account to another
	Transfer,
}

impl TransactionType {
	/// Number of ledger legs a transaction of this type carries
	pub fn leg_count(&self) -> usize {
		match self {
			TransactionType::Deposit | TransactionType::Withdraw => 1,
			TransactionType::Transfer => 2,
		}
	}
}

impl ToSql<Varchar, Pg> for TransactionType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.to_string().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for TransactionType {
	fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
		let s = std::str::from_utf8(bytes.as_bytes())?;
		Ok(s.parse()?)
	}
}

/// Ledger header shared by the legs of one money movement
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = transactions)]
pub struct Transaction {
	pub id: Id,
	pub transaction_type: TransactionType,
	pub created_at: Time,
}

impl Transaction {
	pub fn new(transaction_type: TransactionType, created_at: Time) -> Self {
		Transaction {
			id: Id::new_v4(),
			transaction_type,
			created_at,
		}
	}
}

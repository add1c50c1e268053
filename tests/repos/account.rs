use chrono::{Duration, Utc};

use crate::repos::common::*;

#[tokio::test]
#[ignore]
async fn create_and_find_account() {
	let f = PgFixture::new();
	let (usd, _) = f.currencies().await;
	let owner = Id::new_v4();

	let checking = Account::open_checking(owner, usd.id, BigDecimal::from(500), Utc::now()).unwrap();
	let savings = Account::open_savings(owner, usd.id, dec("0.025"), AccrualSchedule::Quarterly, Utc::now()).unwrap();
	let checking = f.store.create_account(checking).await.unwrap();
	let savings = f.store.create_account(savings).await.unwrap();

	let got = f.store.find_account(&savings.id).await.unwrap().unwrap();
	assert_eq!(got.kind, savings.kind);
	assert_eq!(got.account_number, savings.account_number);

	let owned = f.store.find_accounts_by_owner(&owner).await.unwrap();
	let ids: Vec<Id> = owned.iter().map(|a| a.id).collect();
	assert_eq!(ids.len(), 2);
	assert!(ids.contains(&checking.id) && ids.contains(&savings.id));

	assert!(f.store.find_account(&Id::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn stale_session_conflicts() {
	let f = PgFixture::new();
	let (usd, _) = f.currencies().await;
	let account = Account::open_checking(Id::new_v4(), usd.id, BigDecimal::from(0), Utc::now()).unwrap();
	let account = f.store.create_account(account).await.unwrap();

	let mut first = f.store.begin_transaction().await.unwrap();
	let mut second = f.store.begin_transaction().await.unwrap();
	let mut a = first.track(f.store.find_account(&account.id).await.unwrap().unwrap());
	let mut b = second.track(f.store.find_account(&account.id).await.unwrap().unwrap());

	a.deposit(&BigDecimal::from(10)).unwrap();
	first.update(a).unwrap();
	f.store.commit(first).await.unwrap();

	b.deposit(&BigDecimal::from(20)).unwrap();
	second.update(b).unwrap();
	let err = f.store.save(&mut second).await.unwrap_err();
	assert!(matches!(err, db::Error::Conflict(_)));

	let stored = f.store.find_account(&account.id).await.unwrap().unwrap();
	assert_eq!(stored.balance, BigDecimal::from(10));
	assert_eq!(stored.version, 1);
}

#[tokio::test]
#[ignore]
async fn interest_logs_newest_first() {
	let f = PgFixture::new();
	let (usd, _) = f.currencies().await;
	let savings = Account::open_savings(Id::new_v4(), usd.id, dec("0.02"), AccrualSchedule::Monthly, Utc::now()).unwrap();
	let savings = f.store.create_account(savings).await.unwrap();

	for (days, amount) in [(31, "1.64"), (0, "1.70")] {
		f.store.create_interest_log(InterestLog {
			id: Id::new_v4(),
			account_id: savings.id,
			amount: dec(amount),
			created_at: Utc::now() - Duration::days(days),
		}).await.unwrap();
	}

	let logs = f.store.find_interest_logs(&savings.id).await.unwrap();
	assert_eq!(logs.len(), 2);
	assert_eq!(logs[0].amount, dec("1.70"));
}

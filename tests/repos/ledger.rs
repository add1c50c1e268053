use std::sync::Arc;

use chrono::Utc;

use crate::repos::common::*;

#[tokio::test]
#[ignore]
async fn transfer_writes_both_legs() {
	let f = PgFixture::new();
	let (usd, eur) = f.currencies().await;
	let source = Account::open_checking(Id::new_v4(), usd.id, BigDecimal::from(0), Utc::now()).unwrap();
	let target = Account::open_checking(Id::new_v4(), eur.id, BigDecimal::from(0), Utc::now()).unwrap();
	let source = f.store.create_account(source).await.unwrap();
	let target = f.store.create_account(target).await.unwrap();

	let service = service(Arc::new(f.store.clone()), Arc::new(NoFee));
	service.deposit(&modify(), &source.id, &BigDecimal::from(1000)).await.unwrap();
	let receipt = service.transfer(&modify(), &source.id, &target.id, &BigDecimal::from(100)).await.unwrap();

	let history = f.store.find_ledger_entries(&target.id, &LedgerQuery::default()).await.unwrap();
	assert_eq!(history.len(), 1);
	assert_eq!(history[0].id(), receipt.id());
	assert_eq!(history[0].legs().len(), 2);
	assert_eq!(history[0].leg_for(&target.id).unwrap().amount, BigDecimal::from(90));

	let history = f.store.find_ledger_entries(&source.id, &LedgerQuery::default()).await.unwrap();
	assert_eq!(history.len(), 2);
	assert_eq!(history[0].transaction_type(), TransactionType::Transfer);

	let stored = f.store.find_account(&source.id).await.unwrap().unwrap();
	assert_eq!(stored.balance, BigDecimal::from(900));
}

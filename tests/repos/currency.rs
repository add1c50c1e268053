use crate::repos::common::*;

#[tokio::test]
#[ignore]
async fn find_currency_with_key() {
	let f = PgFixture::new();
	let (_, eur) = f.currencies().await;

	for key in vec![CurrencyKey::Code("EUR"), CurrencyKey::Code("eur"), CurrencyKey::ID(eur.id)] {
		let got = f.store.find_currency(key).await.unwrap().expect("found currency");
		assert_eq!(got, eur);
	}
	assert!(f.store.find_currency(CurrencyKey::Code("JPY")).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn one_base_currency() {
	let f = PgFixture::new();
	f.currencies().await;

	let err = f.store.create_currency(Currency::base("GBP").unwrap()).await.unwrap_err();
	assert_eq!(err, db::Error::RecordAlreadyExists);
}

mod common;
mod account;
mod currency;
mod ledger;

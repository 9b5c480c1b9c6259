//! Registers every concrete backend with the engine builder.
//!
//! Storage and account backends are selected by the `backend` name of their
//! configuration section; the fetchers and the price feed have a single
//! implementation each.

use oracle_account::implementations::local;
use oracle_config::Config;
use oracle_core::OracleBuilder;
use oracle_fetcher::implementations::{evm::alloy as evm_reader, http};
use oracle_publisher::implementations::evm::alloy as price_feed;
use oracle_storage::implementations::{file, memory};

pub fn builder(config: Config) -> OracleBuilder {
	OracleBuilder::new(config)
		.with_storage_factory("file", file::create_storage)
		.with_storage_factory("memory", |config| Ok(memory::create_storage(config)))
		.with_account_factory("local", local::create_account)
		.with_http_factory(http::create_http)
		.with_evm_factory(|config| Ok(evm_reader::create_evm_reader(config)))
		.with_price_feed_factory(price_feed::create_price_feed)
}

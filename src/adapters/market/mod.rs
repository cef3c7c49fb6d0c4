//! Market-data adapters (prices, holders, symbol search)

pub mod http;
pub mod mock;

pub use http::HttpMarketData;
pub use mock::SimMarketData;

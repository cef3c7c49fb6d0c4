//! Social-post adapters

pub mod http;
pub mod mock;

pub use http::HttpSocialSource;
pub use mock::SimSocialSource;

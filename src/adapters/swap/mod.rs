//! Swap-routing adapters

pub mod jupiter;
pub mod mock;

pub use jupiter::JupiterRouter;
pub use mock::{Rate, SimRouter};

//! Helpers for exercising subscriptions without a node.

pub mod macros;
pub mod mock;

pub use mock::{MOCK_CONTRACT, MOCK_EVENT, MockChainClient};

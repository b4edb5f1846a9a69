pub mod client;
pub mod pairs;

pub use {
    client::SubgraphClient,
    pairs::{Collection, Currency, DefaultSubgraphService, Pool, SubgraphError, SubgraphService},
};

#[cfg(any(test, feature = "test-util"))]
pub use pairs::MockSubgraphService;

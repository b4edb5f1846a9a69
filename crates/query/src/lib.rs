//! Chain-scoped cached queries.
//!
//! A [`QueryClient`] is shared by the whole process and caches the results of
//! queries against external services by [`QueryKey`]. Identical keys share
//! in-flight requests, stale entries are served while being refreshed in the
//! background and transient failures are retried with capped exponential
//! backoff. [`ChainScopedQuery`] binds a [`QuerySpec`] to the current chain
//! selection and exposes the `{data, loading, error}` state of a single
//! consumer.

pub mod client;
pub mod error;
pub mod handle;
pub mod key;
pub mod retry;
pub mod state;

pub use {
    client::{Lookup, QueryClient, QueryOptions},
    error::QueryError,
    handle::{ChainScopedQuery, QuerySpec},
    key::QueryKey,
    retry::RetryPolicy,
    state::QueryState,
};

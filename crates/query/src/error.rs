use {
    chain::ChainId,
    itertools::Itertools,
    std::sync::Arc,
    thiserror::Error,
};

/// Failure of a query as observed by its consumers.
///
/// Errors are shared between all waiters of a deduplicated request so they
/// have to be cheap to clone.
#[derive(Clone, Debug, Error)]
pub enum QueryError {
    /// The service has no deployment on the requested chain. Raised before
    /// any network request is made.
    #[error(
        "{service} does not support chain {chain}, supported chains: {}",
        .supported.iter().join(", ")
    )]
    UnsupportedChain {
        service: &'static str,
        chain: ChainId,
        supported: Vec<ChainId>,
    },

    /// The service request failed, after all retries were exhausted.
    #[error("{0:#}")]
    Service(Arc<anyhow::Error>),
}

impl QueryError {
    pub fn service(err: impl Into<anyhow::Error>) -> Self {
        Self::Service(Arc::new(err.into()))
    }

    /// Whether retrying the request could lead to a different result.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_chain_lists_supported_chains() {
        let err = QueryError::UnsupportedChain {
            service: "subgraph",
            chain: ChainId(5),
            supported: vec![ChainId(1), ChainId(8453)],
        };
        assert_eq!(
            err.to_string(),
            "subgraph does not support chain 5, supported chains: 1, 8453"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn service_errors_keep_context() {
        let err = QueryError::service(anyhow::anyhow!("timeout").context("pool query"));
        assert_eq!(err.to_string(), "pool query: timeout");
        assert!(err.is_transient());
    }
}

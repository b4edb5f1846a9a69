use crate::QueryError;

/// What a consumer of a query gets to render.
///
/// Either `loading` is set (optionally with the last known `data` for the same
/// key), or the query settled: on success `error` is `None`, on failure
/// `error` is set and `data` holds the previous value if there was one.
#[derive(Clone, Debug)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<QueryError>,
}

impl<T> QueryState<T> {
    /// The query is disabled or misses parameters. Holds the empty value of
    /// the query so consumers can render "nothing" without special cases.
    pub fn idle() -> Self
    where
        T: Default,
    {
        Self {
            data: Some(T::default()),
            loading: false,
            error: None,
        }
    }

    pub fn pending(previous: Option<T>) -> Self {
        Self {
            data: previous,
            loading: true,
            error: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            loading: false,
            error: None,
        }
    }

    pub fn failure(error: QueryError, previous: Option<T>) -> Self {
        Self {
            data: previous,
            loading: false,
            error: Some(error),
        }
    }
}

impl<T: Default> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

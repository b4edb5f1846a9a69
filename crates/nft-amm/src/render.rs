use {
    chain::ChainId,
    query::QueryState,
    serde::Serialize,
};

/// A query state the way the front end displays it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendered<'a, T> {
    pub chain: ChainId,
    pub loading: bool,
    pub data: Option<&'a T>,
    pub error: Option<String>,
}

impl<'a, T> Rendered<'a, T> {
    pub fn new(chain: ChainId, state: &'a QueryState<T>) -> Self {
        Self {
            chain,
            loading: state.loading,
            data: state.data.as_ref(),
            error: state.error.as_ref().map(ToString::to_string),
        }
    }
}

pub fn to_json<T: Serialize>(chain: ChainId, state: &QueryState<T>) -> serde_json::Value {
    // Serializing plain data structures doesn't fail.
    serde_json::to_value(Rendered::new(chain, state)).unwrap_or_default()
}

use {
    chain::ChainId,
    std::fmt::{self, Display, Formatter},
};

/// Identifies a cached query result: the logical name of the query, the chain
/// it is scoped to and its serialized parameters, in order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryKey {
    name: &'static str,
    chain: ChainId,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(name: &'static str, chain: ChainId) -> Self {
        Self {
            name,
            chain,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Display) -> Self {
        self.params.push(param.to_string());
        self
    }

    pub fn with_params<P: Display>(mut self, params: impl IntoIterator<Item = P>) -> Self {
        self.params
            .extend(params.into_iter().map(|param| param.to_string()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.chain)?;
        for param in &self.params {
            write!(f, "/{param}")?;
        }
        Ok(())
    }
}

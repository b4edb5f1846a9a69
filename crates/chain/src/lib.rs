//! Chain identifiers and the process-wide chain selection.

use {
    serde::{Deserialize, Serialize},
    std::{
        fmt::{self, Display, Formatter},
        num::ParseIntError,
        str::FromStr,
        sync::Arc,
    },
    thiserror::Error,
    tokio::sync::watch,
};

/// Numeric identifier of a blockchain network.
///
/// Unlike [`Chain`] this can hold any value so that chains the application
/// doesn't know about can still be represented (and rejected).
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Chain> for ChainId {
    fn from(value: Chain) -> Self {
        value.id()
    }
}

/// Represents each chain the application knows about.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u64)]
pub enum Chain {
    Ethereum = 1,
    Sepolia = 11155111,
    Base = 8453,
    ArbitrumOne = 42161,
    ApeChain = 33139,
    HyperEvm = 999,
    HyperEvmTestnet = 998,
}

/// Groups of chains that share off-chain infrastructure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Family {
    Evm,
    Hyperliquid,
}

impl Chain {
    pub const ALL: [Chain; 7] = [
        Chain::Ethereum,
        Chain::Sepolia,
        Chain::Base,
        Chain::ArbitrumOne,
        Chain::ApeChain,
        Chain::HyperEvm,
        Chain::HyperEvmTestnet,
    ];

    /// Returns the chain's numeric id.
    pub fn id(&self) -> ChainId {
        ChainId(*self as u64)
    }

    /// Human readable name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ethereum => "Ethereum",
            Self::Sepolia => "Sepolia",
            Self::Base => "Base",
            Self::ArbitrumOne => "Arbitrum One",
            Self::ApeChain => "ApeChain",
            Self::HyperEvm => "HyperEVM",
            Self::HyperEvmTestnet => "HyperEVM Testnet",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Self::HyperEvm | Self::HyperEvmTestnet => Family::Hyperliquid,
            _ => Family::Evm,
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

impl TryFrom<ChainId> for Chain {
    type Error = UnknownChain;

    /// Initializes `Chain` from a chain id, returns an error if the chain is
    /// not known.
    fn try_from(value: ChainId) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|chain| chain.id() == value)
            .ok_or(UnknownChain(value))
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown chain id {0}")]
pub struct UnknownChain(pub ChainId);

/// Returns the chain family of a chain id, `None` for unknown chains.
pub fn family_of(chain: ChainId) -> Option<Family> {
    Chain::try_from(chain).ok().map(|chain| chain.family())
}

/// Process-wide selection of the chain all data is scoped to.
///
/// The context is cheap to clone and every clone observes the same
/// selection. It is initialized once at startup and changed only through
/// [`ChainContext::select`].
#[derive(Clone, Debug)]
pub struct ChainContext {
    sender: Arc<watch::Sender<ChainId>>,
}

impl ChainContext {
    pub fn new(initial: impl Into<ChainId>) -> Self {
        let (sender, _) = watch::channel(initial.into());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// The currently selected chain.
    pub fn current(&self) -> ChainId {
        *self.sender.borrow()
    }

    /// Switches the selection. Subscribers only get notified when the
    /// selection actually changes.
    pub fn select(&self, chain: impl Into<ChainId>) {
        let chain = chain.into();
        let changed = self.sender.send_if_modified(|current| {
            if *current == chain {
                return false;
            }
            *current = chain;
            true
        });
        if changed {
            tracing::debug!(%chain, "selected chain");
        }
    }

    /// Returns a receiver that yields the selection whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<ChainId> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_round_trips_through_id() {
        for chain in Chain::ALL {
            assert_eq!(Chain::try_from(chain.id()).unwrap(), chain);
        }
        assert_eq!(
            Chain::try_from(ChainId(1337)).unwrap_err(),
            UnknownChain(ChainId(1337))
        );
    }

    #[test]
    fn families() {
        assert_eq!(Chain::HyperEvm.family(), Family::Hyperliquid);
        assert_eq!(Chain::Base.family(), Family::Evm);
        assert_eq!(family_of(ChainId(998)), Some(Family::Hyperliquid));
        assert_eq!(family_of(ChainId(5)), None);
    }

    #[test]
    fn chain_id_is_serialized_as_number() {
        assert_eq!(serde_json::to_string(&ChainId(8453)).unwrap(), "8453");
        assert_eq!("42161".parse::<ChainId>().unwrap(), ChainId(42161));
    }

    #[tokio::test]
    async fn selection_is_shared_between_clones() {
        let context = ChainContext::new(Chain::Ethereum);
        let clone = context.clone();
        let mut receiver = context.subscribe();

        clone.select(Chain::Base);
        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow_and_update(), Chain::Base.id());
        assert_eq!(context.current(), Chain::Base.id());

        // Selecting the same chain again does not notify.
        context.select(Chain::Base);
        assert!(!receiver.has_changed().unwrap());
    }
}

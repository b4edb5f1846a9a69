//! Keeps the connected wallet on the chain selected in the application.

use {
    alloy_primitives::Address,
    anyhow::Result,
    chain::{ChainContext, ChainId},
    prometheus::IntCounterVec,
    std::sync::{Arc, Mutex},
    tokio::task::JoinHandle,
};

/// The user's wallet as seen by the application.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait Wallet: Send + Sync {
    /// Address of the connected account, `None` while disconnected.
    fn address(&self) -> Option<Address>;

    /// Chain the wallet is currently on, `None` while disconnected.
    fn chain_id(&self) -> Option<ChainId>;

    /// Whether the wallet can be asked to change its chain. Disconnected
    /// wallets can't.
    fn can_switch_chain(&self) -> bool;

    async fn switch_chain(&self, chain: ChainId) -> Result<()>;
}

/// What happened when the coordinator tried to bring the wallet onto the
/// selected chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwitchOutcome {
    NotConnected,
    /// The selected chain is not one the application is configured for.
    UnconfiguredChain,
    AlreadyOnChain,
    Switched,
    /// The wallet refused or failed. Logged, never surfaced.
    Failed,
}

impl SwitchOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::UnconfiguredChain => "unconfigured_chain",
            Self::AlreadyOnChain => "already_on_chain",
            Self::Switched => "switched",
            Self::Failed => "failed",
        }
    }
}

/// Follows the chain selection and asks the wallet to switch along.
///
/// Failed attempts are not retried on their own. The next selection change
/// or wallet connection triggers a new attempt.
pub struct ChainSwitchCoordinator {
    chain: ChainContext,
    wallet: Arc<dyn Wallet>,
    configured: Vec<ChainId>,
    metrics: &'static Metrics,
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "wallet")]
struct Metrics {
    /// Wallet chain switch attempts by outcome.
    #[metric(labels("outcome"))]
    chain_switch_attempts: IntCounterVec,
}

impl ChainSwitchCoordinator {
    pub fn new(chain: ChainContext, wallet: Arc<dyn Wallet>, configured: Vec<ChainId>) -> Self {
        Self {
            chain,
            wallet,
            configured,
            metrics: Metrics::instance(observe::metrics::get_storage_registry()).unwrap(),
        }
    }

    /// Brings a freshly connected wallet onto the selected chain.
    pub async fn on_wallet_connected(&self) -> SwitchOutcome {
        self.sync().await
    }

    /// Attempts to switch the wallet to the currently selected chain.
    pub async fn sync(&self) -> SwitchOutcome {
        let target = self.chain.current();
        let outcome = self.switch(target).await;
        self.metrics
            .chain_switch_attempts
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn switch(&self, target: ChainId) -> SwitchOutcome {
        if !self.wallet.can_switch_chain() {
            tracing::debug!(chain = %target, "wallet not connected, not switching chain");
            return SwitchOutcome::NotConnected;
        }
        if !self.configured.contains(&target) {
            tracing::debug!(chain = %target, "chain not configured, not switching wallet");
            return SwitchOutcome::UnconfiguredChain;
        }
        if self.wallet.chain_id() == Some(target) {
            return SwitchOutcome::AlreadyOnChain;
        }
        match self.wallet.switch_chain(target).await {
            Ok(()) => {
                tracing::debug!(chain = %target, "switched wallet chain");
                SwitchOutcome::Switched
            }
            Err(err) => {
                tracing::warn!(chain = %target, ?err, "failed to switch wallet chain");
                SwitchOutcome::Failed
            }
        }
    }

    /// Syncs once and then on every selection change.
    pub async fn run(self) {
        let mut selection = self.chain.subscribe();
        self.sync().await;
        while selection.changed().await.is_ok() {
            self.sync().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::task::spawn(self.run())
    }
}

/// A wallet kept in memory, for front ends without a browser wallet.
#[derive(Debug, Default)]
pub struct LocalWallet {
    state: Mutex<Option<(Address, ChainId)>>,
}

impl LocalWallet {
    pub fn connected(address: Address, chain: ChainId) -> Self {
        Self {
            state: Mutex::new(Some((address, chain))),
        }
    }

    pub fn connect(&self, address: Address, chain: ChainId) {
        *self.state.lock().unwrap() = Some((address, chain));
    }

    pub fn disconnect(&self) {
        *self.state.lock().unwrap() = None;
    }
}

#[async_trait::async_trait]
impl Wallet for LocalWallet {
    fn address(&self) -> Option<Address> {
        self.state.lock().unwrap().map(|(address, _)| address)
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.state.lock().unwrap().map(|(_, chain)| chain)
    }

    fn can_switch_chain(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<()> {
        match self.state.lock().unwrap().as_mut() {
            Some((_, current)) => {
                *current = chain;
                Ok(())
            }
            None => anyhow::bail!("wallet is not connected"),
        }
    }
}

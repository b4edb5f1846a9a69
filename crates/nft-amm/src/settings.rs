//! User preferences applied to swap transactions.
//!
//! Settings live in a [`TransactionSettingsScope`] that is installed for the
//! duration of a task, similar to a context provider. Reading them outside of
//! a scope is a usage error reported as [`MissingProvider`].

use {
    alloy_primitives::U256,
    serde::Serialize,
    std::{
        future::Future,
        sync::{Arc, RwLock},
        time::Duration,
    },
    thiserror::Error,
};

/// One hundred percent in basis points.
const BPS_DENOMINATOR: u64 = 10_000;

pub const MAX_SLIPPAGE_BPS: u16 = 5_000;

tokio::task_local! {
    static SCOPE: TransactionSettingsScope;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSettings {
    slippage_bps: u16,
    #[serde(serialize_with = "serialize_secs")]
    deadline: Duration,
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_secs())
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            slippage_bps: 50,
            deadline: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    #[error("slippage of {0} bps exceeds the maximum of 5000 bps")]
    SlippageTooHigh(u16),
    #[error("transaction deadline must be at least one second")]
    DeadlineTooShort,
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("transaction settings used outside of a TransactionSettingsScope")]
pub struct MissingProvider;

impl TransactionSettings {
    pub fn new(slippage_bps: u16, deadline: Duration) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.set_slippage_bps(slippage_bps)?;
        settings.set_deadline(deadline)?;
        Ok(settings)
    }

    pub fn slippage_bps(&self) -> u16 {
        self.slippage_bps
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    fn set_slippage_bps(&mut self, slippage_bps: u16) -> Result<(), SettingsError> {
        if slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(SettingsError::SlippageTooHigh(slippage_bps));
        }
        self.slippage_bps = slippage_bps;
        Ok(())
    }

    fn set_deadline(&mut self, deadline: Duration) -> Result<(), SettingsError> {
        if deadline < Duration::from_secs(1) {
            return Err(SettingsError::DeadlineTooShort);
        }
        self.deadline = deadline;
        Ok(())
    }

    /// The least a swap quoted at `amount` may return.
    pub fn min_amount_out(&self, amount: U256) -> U256 {
        amount * U256::from(BPS_DENOMINATOR - u64::from(self.slippage_bps))
            / U256::from(BPS_DENOMINATOR)
    }

    /// The most a swap quoted at `amount` may cost, rounded up.
    pub fn max_amount_in(&self, amount: U256) -> U256 {
        (amount * U256::from(BPS_DENOMINATOR + u64::from(self.slippage_bps)))
            .div_ceil(U256::from(BPS_DENOMINATOR))
    }

    /// Unix timestamp a transaction submitted at `now` expires at.
    pub fn deadline_at(&self, now: u64) -> u64 {
        now.saturating_add(self.deadline.as_secs())
    }
}

/// Shared, mutable settings visible to everything running inside
/// [`TransactionSettingsScope::run`].
#[derive(Clone, Debug, Default)]
pub struct TransactionSettingsScope {
    settings: Arc<RwLock<TransactionSettings>>,
}

impl TransactionSettingsScope {
    pub fn new(settings: TransactionSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Runs the future with this scope installed.
    pub async fn run<F: Future>(self, future: F) -> F::Output {
        SCOPE.scope(self, future).await
    }

    pub fn get(&self) -> TransactionSettings {
        *self.settings.read().unwrap()
    }

    pub fn set_slippage_bps(&self, slippage_bps: u16) -> Result<(), SettingsError> {
        self.settings.write().unwrap().set_slippage_bps(slippage_bps)
    }

    pub fn set_deadline(&self, deadline: Duration) -> Result<(), SettingsError> {
        self.settings.write().unwrap().set_deadline(deadline)
    }

    pub fn reset(&self) {
        *self.settings.write().unwrap() = TransactionSettings::default();
    }
}

/// The scope of the current task.
pub fn transaction_settings() -> Result<TransactionSettingsScope, MissingProvider> {
    SCOPE.try_with(Clone::clone).map_err(|_| MissingProvider)
}

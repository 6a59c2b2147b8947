//! Periodic settlement trigger.
//!
//! Anyone may settle a round; this task is the operator's own keeper. It calls
//! `try_settle` on a fixed interval and, when a round settles, pays the native
//! rewards for it.

use crate::ServiceState;
use roundledger_core::{
    AccountId, DistributionReport, EngineError, ErrorKind, NativeDistributor, SettlementReceipt,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SettlerConfig {
    /// Identity the trigger settles as. The owner never earns the incentive.
    pub settler: AccountId,
    pub interval_secs: u64,
    pub startup_delay_secs: u64,
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            settler: AccountId::new("owner"),
            interval_secs: 300,
            startup_delay_secs: 5,
        }
    }
}

/// What one trigger tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The round has not ended yet, or another caller settled it first.
    Idle(String),
    Settled {
        receipt: SettlementReceipt,
        distribution: Option<DistributionReport>,
    },
}

pub struct SettlementTrigger {
    state: ServiceState,
    distributor: Option<Arc<NativeDistributor>>,
    config: SettlerConfig,
}

impl SettlementTrigger {
    pub fn new(
        state: ServiceState,
        distributor: Option<Arc<NativeDistributor>>,
        config: SettlerConfig,
    ) -> Self {
        Self {
            state,
            distributor,
            config,
        }
    }

    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    /// Attempt one settlement. Business-rule rejections are normal outcomes; only
    /// internal failures are errors.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let now = self.state.now();
        let receipt = match self.state.engine.try_settle(&self.config.settler, now) {
            Ok(receipt) => receipt,
            Err(err) if err.kind() == ErrorKind::Internal => return Err(err),
            Err(err) => {
                debug!(error = %err, "round not settleable");
                return Ok(TickOutcome::Idle(err.to_string()));
            }
        };

        info!(
            round_id = receipt.round_id,
            reward_pool = %receipt.reward_pool,
            winners = receipt.winners.len(),
            "round settled by trigger"
        );
        if let Err(err) = self.state.persist_journal().await {
            error!(round_id = receipt.round_id, error = %err, "journal persistence failed");
        }

        let distribution = match &self.distributor {
            Some(distributor) => {
                let round = self.state.engine.get_round(receipt.round_id)?;
                match distributor.distribute(&round).await {
                    Ok(report) => Some(report),
                    Err(err) => {
                        warn!(round_id = round.id, error = %err, "native distribution skipped");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(TickOutcome::Settled {
            receipt,
            distribution,
        })
    }

    /// Tick once after the startup delay and then on every interval until
    /// `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            settler = %self.config.settler,
            interval_secs = self.config.interval_secs,
            "settlement trigger started"
        );

        tokio::select! {
            _ = sleep(Duration::from_secs(self.config.startup_delay_secs)) => self.log_tick().await,
            _ = shutdown.changed() => {
                info!("settlement trigger stopped");
                return;
            }
        }

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.log_tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("settlement trigger stopped");
    }

    async fn log_tick(&self) {
        if let Err(err) = self.tick().await {
            error!(error = %err, "settlement tick failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, ServiceConfig};
    use roundledger_adapters::{AlwaysFailWallet, InMemoryNativeWallet};
    use roundledger_core::{tokens, NativeRewardPolicy, Timestamp, ONE_TOKEN};

    const T0: Timestamp = 1_700_000_000;
    const ROUND_SECS: u64 = 45 * 60;

    async fn state_with_winner() -> (ServiceState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let state = ServiceState::bootstrap_with_clock(ServiceConfig::default(), clock.clone())
            .await
            .unwrap();
        let engine = &state.engine;
        let owner = AccountId::new("owner");
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");
        engine.transfer(&owner, &alice, tokens(100_000), T0).unwrap();
        engine.transfer(&owner, &bob, tokens(20_000), T0).unwrap();
        engine.burn_for_upload(&alice, T0).unwrap();
        let content = engine
            .register_content(&alice, "QmClip", "clip", "", T0 + 1)
            .unwrap();
        engine.like_content(&bob, &content.id, T0 + 2).unwrap();
        (state, clock)
    }

    fn trigger(
        state: &ServiceState,
        distributor: Option<Arc<NativeDistributor>>,
    ) -> SettlementTrigger {
        SettlementTrigger::new(
            state.clone(),
            distributor,
            SettlerConfig {
                settler: AccountId::new("keeper"),
                ..SettlerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn open_round_is_an_idle_tick() {
        let (state, _) = state_with_winner().await;
        let outcome = trigger(&state, None).tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Idle(_)));
        assert_eq!(state.engine.current_round_id().unwrap(), 1);
    }

    #[tokio::test]
    async fn settled_round_pays_native_rewards() {
        let (state, clock) = state_with_winner().await;
        let wallet = Arc::new(InMemoryNativeWallet::new("operator", 10 * ONE_TOKEN));
        let distributor = Arc::new(NativeDistributor::new(
            NativeRewardPolicy::default(),
            wallet.clone(),
        ));
        clock.advance(ROUND_SECS);

        let outcome = trigger(&state, Some(distributor)).tick().await.unwrap();
        let TickOutcome::Settled {
            receipt,
            distribution,
        } = outcome
        else {
            panic!("expected settlement");
        };
        assert_eq!(receipt.round_id, 1);
        let report = distribution.unwrap();
        assert_eq!(report.paid.len(), 1);
        assert_eq!(report.paid[0].0.account, AccountId::new("alice"));
        assert_eq!(wallet.sent().unwrap().len(), 1);
        assert_eq!(
            state.journal.lock().await.shipped(),
            state.engine.journal_len().unwrap() as u64
        );

        let again = trigger(&state, None).tick().await.unwrap();
        assert!(matches!(again, TickOutcome::Idle(_)));
    }

    #[tokio::test]
    async fn failing_wallet_does_not_undo_settlement() {
        let (state, clock) = state_with_winner().await;
        let distributor = Arc::new(NativeDistributor::new(
            NativeRewardPolicy::default(),
            Arc::new(AlwaysFailWallet::new(10 * ONE_TOKEN, "rpc down")),
        ));
        clock.advance(ROUND_SECS);

        let outcome = trigger(&state, Some(distributor)).tick().await.unwrap();
        let TickOutcome::Settled { distribution, .. } = outcome else {
            panic!("expected settlement");
        };
        let report = distribution.unwrap();
        assert!(report.paid.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(state.engine.current_round_id().unwrap(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (state, _) = state_with_winner().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(trigger(&state, None).run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

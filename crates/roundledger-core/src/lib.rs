//! RoundLedger core.
//!
//! A round-based content-incentive engine: a taxed token ledger with holding tiers
//! and burn permits, a per-round content registry, ranking, settlement into a claim
//! vault, and planning for secondary native-currency rewards. Every time-dependent
//! call takes `now` explicitly.

#![deny(unsafe_code)]

pub mod claims;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod journal;
pub mod permits;
pub mod ranking;
pub mod recovery;
pub mod registry;
pub mod rounds;
pub mod settlement;
pub mod stats;
pub mod tiers;
pub mod token;
pub mod types;

pub use claims::{ClaimRecord, ClaimVault};
pub use config::{
    AmountRange, EngineConfig, GenesisAccounts, HoldingWindows, ParamBounds, RoundParams,
    TokenParams,
};
pub use distribution::{
    DistributionReport, NativeDistributor, NativePayout, NativeRewardPlan, NativeRewardPolicy,
    NativeWallet, WalletError,
};
pub use engine::{AccountView, ClaimReceipt, LedgerSummary, LikeReceipt, RoundEngine};
pub use error::{EngineError, ErrorKind, LedgerError};
pub use journal::{EngineEvent, EventJournal, JournalEntry, PauseScope};
pub use permits::{BurnEvidence, BurnEvidenceSource, PermitGrant};
pub use ranking::{rank, Podium, RankedWinner};
pub use registry::{ContentFilter, ContentRecord, ContentRegistry};
pub use rounds::{Round, RoundPhase};
pub use settlement::{IncentivePayment, SettlementCoordinator, SettlementReceipt};
pub use stats::{AccountStats, ProtocolStats};
pub use token::{AccountState, BurnReceipt, LedgerParameter, TokenLedger, TransferReceipt};
pub use types::{tokens, AccountId, Amount, ContentId, RoundId, Timestamp, ONE_TOKEN};

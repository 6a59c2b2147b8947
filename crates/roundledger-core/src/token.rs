//! Token ledger: balances, transfer tax, holding state, burn permits and
//! compliance controls.
//!
//! Every operation checks all of its preconditions before touching state, so a
//! rejected call leaves the ledger exactly as it was.

use crate::config::{GenesisAccounts, HoldingWindows, ParamBounds, TokenParams, BPS_DENOMINATOR};
use crate::error::LedgerError;
use crate::permits::{normalize_proof_id, BurnEvidence, PermitGrant};
use crate::tiers::{self, HolderSnapshot};
use crate::types::{amount_serde, mul_div_floor, AccountId, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Per-account ledger state. Accounts are created on their first balance-affecting
/// event and never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    pub holding_since: Option<Timestamp>,
    pub has_sold: bool,
    pub cooldown_until: Timestamp,
    pub blacklisted: bool,
    pub fee_exempt: bool,
    pub burn_permits: u64,
    #[serde(with = "amount_serde")]
    pub total_burned: Amount,
}

impl AccountState {
    pub fn snapshot(&self) -> HolderSnapshot {
        HolderSnapshot {
            holding_since: self.holding_since,
            has_sold: self.has_sold,
            cooldown_until: self.cooldown_until,
        }
    }
}

/// Result of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    #[serde(with = "amount_serde")]
    pub received: Amount,
    #[serde(with = "amount_serde")]
    pub fee: Amount,
    #[serde(with = "amount_serde")]
    pub reward_amount: Amount,
    #[serde(with = "amount_serde")]
    pub marketing_amount: Amount,
}

/// Result of a successful upload burn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BurnReceipt {
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub permit_count: u64,
}

/// Admin-settable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerParameter {
    BurnAmount,
    HoldingThreshold,
    LikeCost,
}

impl LedgerParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BurnAmount => "burn_amount",
            Self::HoldingThreshold => "holding_threshold",
            Self::LikeCost => "like_cost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenLedger {
    genesis: GenesisAccounts,
    params: TokenParams,
    windows: HoldingWindows,
    bounds: ParamBounds,
    accounts: HashMap<AccountId, AccountState>,
    used_proofs: HashSet<String>,
    total_supply: Amount,
    fees_collected: Amount,
    paused: bool,
}

impl TokenLedger {
    /// Mint the full supply to the initial holder and mark the system accounts fee-exempt.
    pub fn genesis(
        genesis: GenesisAccounts,
        params: TokenParams,
        windows: HoldingWindows,
        bounds: ParamBounds,
        now: Timestamp,
    ) -> Self {
        let total_supply = params.total_supply;
        let mut ledger = Self {
            genesis,
            params,
            windows,
            bounds,
            accounts: HashMap::new(),
            used_proofs: HashSet::new(),
            total_supply,
            fees_collected: 0,
            paused: false,
        };

        for account in ledger.protected_accounts() {
            ledger.account_mut(&account).fee_exempt = true;
        }
        let holder = ledger.genesis.initial_holder.clone();
        ledger.credit(&holder, total_supply, now);

        info!(holder = %holder, supply = %total_supply, "token ledger minted genesis supply");
        ledger
    }

    pub fn genesis_accounts(&self) -> &GenesisAccounts {
        &self.genesis
    }

    pub fn params(&self) -> &TokenParams {
        &self.params
    }

    pub fn bounds(&self) -> &ParamBounds {
        &self.bounds
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn fees_collected(&self) -> Amount {
        self.fees_collected
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn owner(&self) -> &AccountId {
        &self.genesis.owner
    }

    pub fn account(&self, account: &AccountId) -> AccountState {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    /// Every account the ledger has seen, ordered by id.
    pub fn accounts(&self) -> BTreeMap<AccountId, AccountState> {
        self.accounts
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.accounts.get(account).map(|a| a.balance).unwrap_or(0)
    }

    pub fn burn_permit_count(&self, account: &AccountId) -> u64 {
        self.accounts.get(account).map(|a| a.burn_permits).unwrap_or(0)
    }

    pub fn is_blacklisted(&self, account: &AccountId) -> bool {
        self.accounts.get(account).is_some_and(|a| a.blacklisted)
    }

    pub fn is_fee_exempt(&self, account: &AccountId) -> bool {
        self.accounts.get(account).is_some_and(|a| a.fee_exempt)
    }

    pub fn is_proof_used(&self, proof_id: &str) -> bool {
        self.used_proofs.contains(&normalize_proof_id(proof_id))
    }

    pub fn reward_pool_balance(&self) -> Amount {
        self.balance_of(&self.genesis.reward_pool)
    }

    pub fn snapshot(&self, account: &AccountId) -> HolderSnapshot {
        self.accounts
            .get(account)
            .map(AccountState::snapshot)
            .unwrap_or_default()
    }

    pub fn tier_ratio(&self, account: &AccountId, now: Timestamp) -> u64 {
        tiers::tier_ratio_pct(&self.snapshot(account), now, &self.windows)
    }

    pub fn holding_bonus(&self, account: &AccountId, now: Timestamp) -> u64 {
        tiers::holding_bonus_pct(&self.snapshot(account), now, &self.windows)
    }

    pub fn is_in_cooldown(&self, account: &AccountId, now: Timestamp) -> bool {
        self.snapshot(account).in_cooldown(now)
    }

    pub fn is_diamond(&self, account: &AccountId, now: Timestamp) -> bool {
        self.snapshot(account).is_diamond(now, &self.windows)
    }

    pub fn is_long_holder(&self, account: &AccountId, now: Timestamp) -> bool {
        self.snapshot(account).is_long_holder(now, &self.windows)
    }

    pub fn can_participate(&self, account: &AccountId, now: Timestamp) -> bool {
        let state = self.account(account);
        !state.blacklisted
            && state.balance >= self.params.holding_threshold
            && !state.snapshot().in_cooldown(now)
    }

    /// Fee owed on a transfer of `amount` between the two parties.
    pub fn transfer_fee(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Amount {
        if self.is_fee_exempt(from) || self.is_fee_exempt(to) {
            0
        } else {
            mul_div_floor(amount, self.params.tax_bps, BPS_DENOMINATOR)
        }
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<TransferReceipt, LedgerError> {
        self.ensure_not_blacklisted("sender", from)?;
        self.ensure_not_blacklisted("recipient", to)?;
        self.ensure_not_paused()?;
        self.ensure_balance(from, amount)?;

        let fee = self.transfer_fee(from, to, amount);
        let reward_amount = mul_div_floor(fee, self.params.reward_share_bps, BPS_DENOMINATOR);
        let marketing_amount = fee - reward_amount;
        let received = amount - fee;

        self.debit(from, amount);
        if from != to && amount > 0 {
            let cooldown_until = now.saturating_add(self.windows.cooldown_secs);
            let sender = self.account_mut(from);
            sender.has_sold = true;
            sender.cooldown_until = cooldown_until;
        }
        self.credit(to, received, now);
        if fee > 0 {
            let reward_pool = self.genesis.reward_pool.clone();
            let marketing_pool = self.genesis.marketing_pool.clone();
            self.credit(&reward_pool, reward_amount, now);
            self.credit(&marketing_pool, marketing_amount, now);
            self.fees_collected += fee;
        }

        debug!(from = %from, to = %to, amount = %amount, fee = %fee, "transfer applied");
        Ok(TransferReceipt {
            amount,
            received,
            fee,
            reward_amount,
            marketing_amount,
        })
    }

    /// Burn the upload cost and grant one permit.
    pub fn burn_for_upload(&mut self, account: &AccountId) -> Result<BurnReceipt, LedgerError> {
        self.ensure_not_blacklisted("account", account)?;
        self.ensure_not_paused()?;
        let balance = self.balance_of(account);
        if balance < self.params.holding_threshold {
            return Err(LedgerError::BelowThreshold {
                balance,
                threshold: self.params.holding_threshold,
            });
        }
        let amount = self.params.burn_amount;
        self.ensure_balance(account, amount)?;

        self.burn(account, amount);
        let state = self.account_mut(account);
        state.burn_permits += 1;
        let permit_count = state.burn_permits;

        info!(account = %account, amount = %amount, permit_count, "burned for upload permit");
        Ok(BurnReceipt {
            amount,
            permit_count,
        })
    }

    /// Check that `account` could pay the like cost right now.
    pub fn ensure_can_burn_like(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.ensure_not_blacklisted("account", account)?;
        self.ensure_not_paused()?;
        let cost = self.params.like_cost;
        self.ensure_balance(account, cost)?;
        Ok(cost)
    }

    /// Remove the like cost from the liker's balance and from supply.
    pub fn burn_for_like(&mut self, account: &AccountId) -> Result<Amount, LedgerError> {
        let cost = self.ensure_can_burn_like(account)?;
        self.burn(account, cost);
        Ok(cost)
    }

    pub fn ensure_permit(&self, account: &AccountId) -> Result<(), LedgerError> {
        if self.burn_permit_count(account) == 0 {
            return Err(LedgerError::NoPermit(account.clone()));
        }
        Ok(())
    }

    /// Consume one permit, returning how many remain.
    pub fn consume_permit(&mut self, account: &AccountId) -> Result<u64, LedgerError> {
        self.ensure_permit(account)?;
        let state = self.account_mut(account);
        state.burn_permits -= 1;
        Ok(state.burn_permits)
    }

    /// Grant a permit for externally observed burn evidence, deduplicated by proof id.
    pub fn register_burn_permit(
        &mut self,
        account: &AccountId,
        evidence: &BurnEvidence,
    ) -> Result<PermitGrant, LedgerError> {
        let proof_id = normalize_proof_id(&evidence.proof_id);
        if self.used_proofs.contains(&proof_id) {
            debug!(account = %account, proof_id = %proof_id, "burn proof already registered");
            return Ok(PermitGrant {
                granted: false,
                permit_count: self.burn_permit_count(account),
            });
        }
        self.ensure_not_blacklisted("account", account)?;
        if &evidence.from != account {
            return Err(LedgerError::InvalidEvidence(format!(
                "burn was sent by {}, not {}",
                evidence.from, account
            )));
        }
        if evidence.to != self.genesis.burn_sink {
            return Err(LedgerError::InvalidEvidence(format!(
                "transfer went to {}, not the burn sink",
                evidence.to
            )));
        }
        if evidence.amount < self.params.burn_amount {
            return Err(LedgerError::InvalidEvidence(format!(
                "burned {} but {} is required",
                evidence.amount, self.params.burn_amount
            )));
        }

        self.used_proofs.insert(proof_id.clone());
        let state = self.account_mut(account);
        state.burn_permits += 1;
        state.total_burned += evidence.amount;
        let permit_count = state.burn_permits;

        info!(account = %account, proof_id = %proof_id, permit_count, "burn permit registered");
        Ok(PermitGrant {
            granted: true,
            permit_count,
        })
    }

    /// Destroy `amount` held by the reward pool. Used when claims are forfeited.
    pub fn burn_from_reward_pool(&mut self, amount: Amount) -> Amount {
        let pool = self.genesis.reward_pool.clone();
        let burned = amount.min(self.balance_of(&pool));
        if burned > 0 {
            self.burn(&pool, burned);
        }
        burned
    }

    pub fn set_blacklist(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        blacklisted: bool,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        if blacklisted && self.protected_accounts().contains(account) {
            return Err(LedgerError::ProtectedAccount(account.clone()));
        }
        self.account_mut(account).blacklisted = blacklisted;
        info!(account = %account, blacklisted, "blacklist updated");
        Ok(())
    }

    pub fn set_fee_exempt(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        exempt: bool,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        if !exempt && self.protected_accounts().contains(account) {
            return Err(LedgerError::ProtectedAccount(account.clone()));
        }
        self.account_mut(account).fee_exempt = exempt;
        info!(account = %account, exempt, "fee exemption updated");
        Ok(())
    }

    pub fn set_paused(&mut self, caller: &AccountId, paused: bool) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        self.paused = paused;
        info!(paused, "ledger pause updated");
        Ok(())
    }

    pub fn set_parameter(
        &mut self,
        caller: &AccountId,
        parameter: LedgerParameter,
        value: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        let range = match parameter {
            LedgerParameter::BurnAmount => self.bounds.burn_amount,
            LedgerParameter::HoldingThreshold => self.bounds.holding_threshold,
            LedgerParameter::LikeCost => self.bounds.like_cost,
        };
        if !range.contains(value) {
            return Err(LedgerError::OutOfRange {
                parameter: parameter.as_str(),
                value,
                min: range.min,
                max: range.max,
            });
        }
        match parameter {
            LedgerParameter::BurnAmount => self.params.burn_amount = value,
            LedgerParameter::HoldingThreshold => self.params.holding_threshold = value,
            LedgerParameter::LikeCost => self.params.like_cost = value,
        }
        info!(parameter = parameter.as_str(), value = %value, "ledger parameter updated");
        Ok(())
    }

    pub fn ensure_owner(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if caller != &self.genesis.owner {
            return Err(LedgerError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    fn protected_accounts(&self) -> Vec<AccountId> {
        vec![
            self.genesis.owner.clone(),
            self.genesis.reward_pool.clone(),
            self.genesis.marketing_pool.clone(),
            self.genesis.initial_holder.clone(),
            self.genesis.burn_sink.clone(),
        ]
    }

    fn ensure_not_blacklisted(
        &self,
        role: &'static str,
        account: &AccountId,
    ) -> Result<(), LedgerError> {
        if self.is_blacklisted(account) {
            return Err(LedgerError::Blacklisted {
                role,
                account: account.clone(),
            });
        }
        Ok(())
    }

    fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn ensure_balance(&self, account: &AccountId, needed: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(account);
        if available < needed {
            return Err(LedgerError::InsufficientBalance { needed, available });
        }
        Ok(())
    }

    fn account_mut(&mut self, account: &AccountId) -> &mut AccountState {
        self.accounts.entry(account.clone()).or_default()
    }

    fn credit(&mut self, account: &AccountId, amount: Amount, now: Timestamp) {
        if amount == 0 {
            return;
        }
        let state = self.account_mut(account);
        if state.balance == 0 {
            state.holding_since = Some(now);
        }
        state.balance += amount;
    }

    // Callers have already checked the balance.
    fn debit(&mut self, account: &AccountId, amount: Amount) {
        let state = self.account_mut(account);
        state.balance -= amount;
        if state.balance == 0 {
            state.holding_since = None;
        }
    }

    fn burn(&mut self, account: &AccountId, amount: Amount) {
        self.debit(account, amount);
        self.account_mut(account).total_burned += amount;
        self.total_supply -= amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{tokens, MINUTE};
    use proptest::prelude::*;

    const T0: Timestamp = 1_700_000_000;

    fn ledger() -> TokenLedger {
        let config = EngineConfig::default();
        TokenLedger::genesis(config.genesis, config.token, config.holding, config.bounds, T0)
    }

    fn id(raw: &str) -> AccountId {
        AccountId::new(raw)
    }

    fn fund(ledger: &mut TokenLedger, account: &str, whole: u128) {
        ledger
            .transfer(&id("owner"), &id(account), tokens(whole), T0)
            .expect("funded");
    }

    #[test]
    fn genesis_mints_supply_to_initial_holder() {
        let ledger = ledger();
        assert_eq!(ledger.balance_of(&id("owner")), tokens(1_000_000_000));
        assert_eq!(ledger.total_supply(), tokens(1_000_000_000));
        assert_eq!(ledger.account(&id("owner")).holding_since, Some(T0));
        assert!(ledger.is_fee_exempt(&id("reward-pool")));
    }

    #[test]
    fn taxed_transfer_splits_fee_between_pools() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 10_000);

        let receipt = ledger
            .transfer(&id("alice"), &id("bob"), tokens(1_000), T0 + 10)
            .unwrap();
        assert_eq!(receipt.fee, tokens(30));
        assert_eq!(receipt.reward_amount, tokens(24));
        assert_eq!(receipt.marketing_amount, tokens(6));
        assert_eq!(ledger.balance_of(&id("bob")), tokens(970));
        assert_eq!(ledger.reward_pool_balance(), tokens(24));
        assert_eq!(ledger.balance_of(&id("marketing-pool")), tokens(6));
        assert_eq!(ledger.fees_collected(), tokens(30));

        let alice = ledger.account(&id("alice"));
        assert!(alice.has_sold);
        assert_eq!(alice.cooldown_until, T0 + 10 + 30 * MINUTE);
        assert_eq!(ledger.account(&id("bob")).holding_since, Some(T0 + 10));
    }

    #[test]
    fn exempt_transfer_moves_amount_verbatim() {
        let mut ledger = ledger();
        let receipt = ledger
            .transfer(&id("owner"), &id("alice"), tokens(500), T0)
            .unwrap();
        assert_eq!(receipt.fee, 0);
        assert_eq!(ledger.balance_of(&id("alice")), tokens(500));
    }

    #[test]
    fn blacklisted_sender_cannot_transfer() {
        let mut ledger = ledger();
        fund(&mut ledger, "mallory", 1_000);
        ledger.set_blacklist(&id("owner"), &id("mallory"), true).unwrap();

        let before = ledger.clone();
        let err = ledger
            .transfer(&id("mallory"), &id("bob"), tokens(10), T0)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Blacklisted { role: "sender", .. }));
        assert_eq!(ledger.balance_of(&id("mallory")), before.balance_of(&id("mallory")));
        assert_eq!(ledger.balance_of(&id("bob")), 0);
    }

    #[test]
    fn paused_ledger_rejects_transfers() {
        let mut ledger = ledger();
        ledger.set_paused(&id("owner"), true).unwrap();
        assert_eq!(
            ledger.transfer(&id("owner"), &id("bob"), 1, T0),
            Err(LedgerError::Paused)
        );
        ledger.set_paused(&id("owner"), false).unwrap();
        assert!(ledger.transfer(&id("owner"), &id("bob"), 1, T0).is_ok());
    }

    #[test]
    fn burn_for_upload_grants_permit() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 60_000);
        let supply = ledger.total_supply();

        let receipt = ledger.burn_for_upload(&id("alice")).unwrap();
        assert_eq!(receipt.permit_count, 1);
        assert_eq!(ledger.balance_of(&id("alice")), tokens(10_000));
        assert_eq!(ledger.total_supply(), supply - tokens(50_000));
        assert_eq!(ledger.account(&id("alice")).total_burned, tokens(50_000));
        assert!(!ledger.account(&id("alice")).has_sold);
    }

    #[test]
    fn burn_below_threshold_fails_without_mutation() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 5_000);
        let err = ledger.burn_for_upload(&id("alice")).unwrap_err();
        assert!(matches!(err, LedgerError::BelowThreshold { .. }));
        assert_eq!(ledger.balance_of(&id("alice")), tokens(5_000));
        assert_eq!(ledger.burn_permit_count(&id("alice")), 0);

        fund(&mut ledger, "bob", 20_000);
        let err = ledger.burn_for_upload(&id("bob")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn permits_are_consumed_one_at_a_time() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 60_000);
        ledger.burn_for_upload(&id("alice")).unwrap();
        assert_eq!(ledger.consume_permit(&id("alice")), Ok(0));
        assert_eq!(
            ledger.consume_permit(&id("alice")),
            Err(LedgerError::NoPermit(id("alice")))
        );
    }

    #[test]
    fn burn_evidence_is_deduplicated_by_proof() {
        let mut ledger = ledger();
        let evidence = BurnEvidence {
            proof_id: "0xABC".to_string(),
            from: id("alice"),
            to: id("0x000000000000000000000000000000000000dEaD"),
            amount: tokens(50_000),
        };
        let first = ledger.register_burn_permit(&id("alice"), &evidence).unwrap();
        assert_eq!(first, PermitGrant { granted: true, permit_count: 1 });

        let mut replay = evidence.clone();
        replay.proof_id = "0xabc".to_string();
        let second = ledger.register_burn_permit(&id("alice"), &replay).unwrap();
        assert_eq!(second, PermitGrant { granted: false, permit_count: 1 });
    }

    #[test]
    fn burn_evidence_must_match_sink_amount_and_sender() {
        let mut ledger = ledger();
        let mut evidence = BurnEvidence {
            proof_id: "0x1".to_string(),
            from: id("bob"),
            to: id("0x000000000000000000000000000000000000dead"),
            amount: tokens(50_000),
        };
        assert!(ledger.register_burn_permit(&id("alice"), &evidence).is_err());
        evidence.from = id("alice");
        evidence.amount = tokens(49_999);
        assert!(ledger.register_burn_permit(&id("alice"), &evidence).is_err());
        evidence.amount = tokens(50_000);
        evidence.to = id("carol");
        assert!(ledger.register_burn_permit(&id("alice"), &evidence).is_err());
        assert!(!ledger.is_proof_used("0x1"));
    }

    #[test]
    fn admin_parameters_are_bounded_and_owner_only() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.set_parameter(&id("alice"), LedgerParameter::LikeCost, tokens(5)),
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            ledger.set_parameter(&id("owner"), LedgerParameter::BurnAmount, tokens(9_999)),
            Err(LedgerError::OutOfRange { .. })
        ));
        ledger
            .set_parameter(&id("owner"), LedgerParameter::BurnAmount, tokens(200_000))
            .unwrap();
        assert_eq!(ledger.params().burn_amount, tokens(200_000));
    }

    #[test]
    fn system_accounts_stay_exempt_and_unblocked() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.set_fee_exempt(&id("owner"), &id("reward-pool"), false),
            Err(LedgerError::ProtectedAccount(_))
        ));
        assert!(matches!(
            ledger.set_blacklist(&id("owner"), &id("owner"), true),
            Err(LedgerError::ProtectedAccount(_))
        ));
        ledger.set_fee_exempt(&id("owner"), &id("exchange"), true).unwrap();
        assert!(ledger.is_fee_exempt(&id("exchange")));
    }

    #[test]
    fn participation_requires_threshold_and_no_cooldown() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 20_000);
        assert!(ledger.can_participate(&id("alice"), T0));

        ledger
            .transfer(&id("alice"), &id("bob"), tokens(1), T0 + 1)
            .unwrap();
        assert!(!ledger.can_participate(&id("alice"), T0 + 2));
        assert_eq!(ledger.tier_ratio(&id("alice"), T0 + 2), 0);
        assert!(ledger.can_participate(&id("alice"), T0 + 1 + 30 * MINUTE));
        assert_eq!(ledger.tier_ratio(&id("alice"), T0 + 1 + 30 * MINUTE), 80);
    }

    #[test]
    fn holding_since_resets_when_balance_empties() {
        let mut ledger = ledger();
        fund(&mut ledger, "alice", 100);
        ledger
            .transfer(&id("alice"), &id("owner"), tokens(100), T0 + 5)
            .unwrap();
        assert_eq!(ledger.account(&id("alice")).holding_since, None);
    }

    proptest! {
        #[test]
        fn taxed_transfers_conserve_supply(
            amounts in proptest::collection::vec(1u128..5_000_000_000_000_000_000_000u128, 1..20),
        ) {
            let mut ledger = ledger();
            fund(&mut ledger, "alice", 100_000_000);
            for (i, amount) in amounts.iter().enumerate() {
                let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
                let before_to = ledger.balance_of(&id(to));
                let before_pools =
                    ledger.reward_pool_balance() + ledger.balance_of(&id("marketing-pool"));
                let amount = (*amount).min(ledger.balance_of(&id(from)));
                let receipt = ledger.transfer(&id(from), &id(to), amount, T0).unwrap();

                let fee = amount * 300 / 10_000;
                prop_assert_eq!(receipt.fee, fee);
                prop_assert_eq!(ledger.balance_of(&id(to)), before_to + amount - fee);
                prop_assert_eq!(
                    ledger.reward_pool_balance() + ledger.balance_of(&id("marketing-pool")),
                    before_pools + fee
                );
                prop_assert_eq!(receipt.reward_amount, fee * 8_000 / 10_000);
            }
            let sum: Amount = ledger.accounts().values().map(|a| a.balance).sum();
            prop_assert_eq!(sum, ledger.total_supply());
        }

        #[test]
        fn upload_burns_decrease_balance_by_burn_amount(whole in 10_000u128..500_000u128) {
            let mut ledger = ledger();
            fund(&mut ledger, "alice", whole);
            let before = ledger.balance_of(&id("alice"));
            match ledger.burn_for_upload(&id("alice")) {
                Ok(receipt) => {
                    prop_assert_eq!(ledger.balance_of(&id("alice")), before - tokens(50_000));
                    prop_assert_eq!(receipt.permit_count, 1);
                }
                Err(_) => {
                    prop_assert_eq!(ledger.balance_of(&id("alice")), before);
                    prop_assert_eq!(ledger.burn_permit_count(&id("alice")), 0);
                }
            }
        }
    }
}

use roundledger_core::{
    tokens, AccountId, ContentFilter, EngineConfig, EngineError, EngineEvent, ErrorKind,
    LedgerParameter, RoundEngine, RoundPhase, Timestamp,
};
use std::sync::{Arc, Barrier};
use std::thread;

const T0: Timestamp = 1_700_000_000;
const ROUND: u64 = 45 * 60;
const WEEK: u64 = 7 * 24 * 3600;

fn id(raw: &str) -> AccountId {
    AccountId::new(raw)
}

fn engine() -> RoundEngine {
    RoundEngine::new(EngineConfig::default(), T0).expect("engine")
}

/// Fund `accounts` from the owner and route a taxed transfer through the reward pool.
fn seed(engine: &RoundEngine, accounts: &[(&str, u128)]) {
    let owner = id("owner");
    for (account, whole) in accounts {
        engine
            .transfer(&owner, &id(account), tokens(*whole), T0)
            .expect("fund");
    }
    engine
        .transfer(&owner, &id("trader"), tokens(200_000), T0)
        .expect("fund trader");
    engine
        .transfer(&id("trader"), &id("counterparty"), tokens(100_000), T0)
        .expect("taxed transfer");
}

fn upload(
    engine: &RoundEngine,
    uploader: &str,
    cid: &str,
    now: Timestamp,
) -> roundledger_core::ContentRecord {
    engine.burn_for_upload(&id(uploader), now).expect("burn");
    engine
        .register_content(&id(uploader), cid, "title", "QmCover", now)
        .expect("register")
}

#[test]
fn full_round_scenario() {
    let engine = engine();
    seed(
        &engine,
        &[("u1", 60_000), ("u2", 1_000), ("u3", 1_000), ("u4", 1_000)],
    );
    let reward_pool_before = engine.ledger_summary().unwrap().reward_pool_balance;
    assert_eq!(reward_pool_before, tokens(2_400));

    let content = upload(&engine, "u1", "QmVideo", T0 + 60);
    for liker in ["u2", "u3", "u4"] {
        engine
            .like_content(&id(liker), &content.id, T0 + 120)
            .expect("like");
    }
    assert_eq!(engine.get_content(&content.id).unwrap().like_count, 3);
    assert_eq!(engine.balance_of(&id("u2")).unwrap(), tokens(900));

    let end = engine.current_round().unwrap().end_time;
    assert_eq!(end, T0 + ROUND);
    assert!(!engine.is_settleable(end - 1).unwrap());
    assert!(engine.try_settle(&id("keeper"), end - 1).is_err());

    let receipt = engine.try_settle(&id("keeper"), end + 1).expect("settled");
    assert_eq!(receipt.round_id, 1);
    assert_eq!(receipt.next_round_id, 2);
    assert_eq!(receipt.reward_pool, tokens(2_300));
    assert_eq!(receipt.participant_count, 4);

    let round = engine.get_round(1).unwrap();
    assert!(round.settled);
    assert_eq!(round.phase(end + 1), RoundPhase::Settled);
    assert_eq!(round.top_accounts[0], Some(id("u1")));
    assert_eq!(round.top_scores[0], 3);
    assert_eq!(round.top_accounts[1], None);
    assert_eq!(engine.current_round_id().unwrap(), 2);

    let claimable = engine.get_claimable(1, &id("u1"), end + 1).unwrap();
    assert!(claimable > 0);
    assert!(claimable <= tokens(1_150));
    assert_eq!(engine.balance_of(&id("keeper")).unwrap(), tokens(100));

    let before = engine.balance_of(&id("u1")).unwrap();
    let claim = engine.claim(1, &id("u1"), end + 10).expect("claim");
    assert_eq!(claim.amount, claimable);
    assert_eq!(engine.balance_of(&id("u1")).unwrap(), before + claimable);
    assert_eq!(engine.get_round(1).unwrap().total_claimed, claimable);
    assert_eq!(
        engine.claim(1, &id("u1"), end + 11).unwrap_err(),
        EngineError::precondition("already claimed")
    );

    let stats = engine.protocol_stats().unwrap();
    assert_eq!(stats.total_content, 1);
    assert_eq!(stats.total_likes, 3);
    assert_eq!(stats.rounds_settled, 1);
    assert_eq!(stats.current_round_id, 2);
    assert!(engine.verify_journal().unwrap());
}

#[test]
fn operator_settles_without_incentive() {
    let engine = engine();
    seed(&engine, &[]);
    let receipt = engine.try_settle(&id("owner"), T0 + ROUND).expect("settled");
    assert!(receipt.incentive.is_none());
    assert_eq!(receipt.reward_pool, tokens(2_400));
    assert!(receipt.claims.is_empty());
}

#[test]
fn settlement_is_won_by_exactly_one_racing_caller() {
    let engine = Arc::new(engine());
    seed(&engine, &[]);
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.try_settle(&id(&format!("keeper-{i}")), T0 + ROUND + 1)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(result.kind(), ErrorKind::PreconditionFailed);
    }
    assert_eq!(engine.current_round_id().unwrap(), 2);

    let paid: u128 = (0..callers)
        .map(|i| engine.balance_of(&id(&format!("keeper-{i}"))).unwrap())
        .sum();
    assert_eq!(paid, tokens(100));
}

#[test]
fn second_settle_in_same_instant_fails() {
    let engine = engine();
    seed(&engine, &[]);
    engine.try_settle(&id("a"), T0 + ROUND).expect("first");
    let err = engine.try_settle(&id("b"), T0 + ROUND).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn claims_expire_and_are_forfeited_at_next_settlement() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000), ("u2", 1_000)]);
    let content = upload(&engine, "u1", "QmVideo", T0 + 1);
    engine.like_content(&id("u2"), &content.id, T0 + 2).unwrap();

    let settled_at = T0 + ROUND;
    engine.try_settle(&id("owner"), settled_at).unwrap();
    let record = engine.get_claim(1, &id("u1")).unwrap().expect("claim record");
    assert_eq!(record.expires_at, settled_at + WEEK);

    let late = settled_at + WEEK + 1;
    let err = engine.claim(1, &id("u1"), late).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert_eq!(engine.get_claimable(1, &id("u1"), late).unwrap(), 0);

    let pool_before = engine.ledger_summary().unwrap().reward_pool_balance;
    let supply_before = engine.ledger_summary().unwrap().total_supply;
    let receipt = engine.try_settle(&id("owner"), late).unwrap();
    assert_eq!(receipt.forfeited.len(), 1);
    let summary = engine.ledger_summary().unwrap();
    assert_eq!(summary.reward_pool_balance, pool_before - record.amount);
    assert_eq!(summary.total_supply, supply_before - record.amount);
    assert_eq!(summary.reserved_for_claims, 0);
    assert_eq!(engine.claim(1, &id("u1"), late).unwrap_err().kind(), ErrorKind::Expired);
}

#[test]
fn open_claims_are_excluded_from_next_pool() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000), ("u2", 1_000)]);
    let content = upload(&engine, "u1", "QmVideo", T0 + 1);
    engine.like_content(&id("u2"), &content.id, T0 + 2).unwrap();

    let first = engine.try_settle(&id("owner"), T0 + ROUND).unwrap();
    let reserved = first.claims[0].amount;
    let second = engine.try_settle(&id("owner"), T0 + 2 * ROUND).unwrap();
    assert_eq!(second.reward_pool, first.reward_pool - reserved);
}

#[test]
fn blacklisted_sender_transfer_changes_nothing() {
    let engine = engine();
    seed(&engine, &[("mallory", 5_000)]);
    engine
        .set_blacklist(&id("owner"), &id("mallory"), true, T0)
        .unwrap();

    let err = engine
        .transfer(&id("mallory"), &id("bob"), tokens(10), T0 + 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(engine.balance_of(&id("mallory")).unwrap(), tokens(5_000));
    assert_eq!(engine.balance_of(&id("bob")).unwrap(), 0);
}

#[test]
fn liking_twice_is_rejected_without_side_effects() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000), ("u2", 1_000)]);
    let content = upload(&engine, "u1", "QmVideo", T0 + 1);

    engine.like_content(&id("u2"), &content.id, T0 + 2).unwrap();
    let balance = engine.balance_of(&id("u2")).unwrap();
    let err = engine.like_content(&id("u2"), &content.id, T0 + 3).unwrap_err();
    assert_eq!(err, EngineError::precondition("already liked"));
    assert_eq!(engine.get_content(&content.id).unwrap().like_count, 1);
    assert_eq!(engine.balance_of(&id("u2")).unwrap(), balance);

    let own = engine.like_content(&id("u1"), &content.id, T0 + 3).unwrap_err();
    assert_eq!(own.kind(), ErrorKind::AccessDenied);
}

#[test]
fn registration_requires_permit_and_open_round() {
    let engine = engine();
    seed(&engine, &[("u1", 120_000)]);
    let err = engine
        .register_content(&id("u1"), "QmA", "title", "", T0 + 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    engine.burn_for_upload(&id("u1"), T0 + 1).unwrap();
    let empty = engine
        .register_content(&id("u1"), "QmA", " ", "", T0 + 1)
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);
    assert_eq!(engine.account(&id("u1"), T0 + 1).unwrap().state.burn_permits, 1);

    let ended = engine
        .register_content(&id("u1"), "QmA", "title", "", T0 + ROUND)
        .unwrap_err();
    assert_eq!(ended.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn content_from_settled_round_cannot_be_liked() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000), ("u2", 1_000)]);
    let content = upload(&engine, "u1", "QmVideo", T0 + 1);
    engine.try_settle(&id("owner"), T0 + ROUND).unwrap();

    let err = engine
        .like_content(&id("u2"), &content.id, T0 + ROUND + 5)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(
        engine
            .list_contents(&ContentFilter {
                round_id: Some(1),
                uploader: None,
            })
            .unwrap()
            .len(),
        1
    );
    assert_eq!(engine.round_participants(1).unwrap(), vec![id("u1")]);
}

#[test]
fn admin_changes_apply_to_later_calls() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000), ("u2", 1_000)]);
    let content = upload(&engine, "u1", "QmVideo", T0 + 1);

    let err = engine
        .set_parameter(&id("owner"), LedgerParameter::LikeCost, tokens(1_001), T0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    engine
        .set_parameter(&id("owner"), LedgerParameter::LikeCost, tokens(5), T0)
        .unwrap();

    let receipt = engine.like_content(&id("u2"), &content.id, T0 + 2).unwrap();
    assert_eq!(receipt.cost, tokens(5));
    assert!(engine
        .journal_since(0, usize::MAX)
        .unwrap()
        .iter()
        .any(|entry| matches!(entry.event, EngineEvent::ParameterUpdated { .. })));
}

#[test]
fn ledger_pause_blocks_burns_and_claims() {
    let engine = engine();
    seed(&engine, &[("u1", 60_000)]);
    engine.set_ledger_paused(&id("owner"), true, T0).unwrap();
    assert_eq!(
        engine.burn_for_upload(&id("u1"), T0).unwrap_err().kind(),
        ErrorKind::AccessDenied
    );
    engine.set_ledger_paused(&id("owner"), false, T0).unwrap();
    assert!(engine.burn_for_upload(&id("u1"), T0).is_ok());
}

//! Many callers hammering one engine from several threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tally_governance::{GovernanceConfig, GovernanceEngine, GovernanceError, GovernanceEvent};
use tally_nullables::{NullClock, NullLedger};
use tally_types::{AccountId, Timestamp, TokenAmount};

fn account(seed: u8) -> AccountId {
    AccountId::new([seed; 20])
}

fn engine_with(
    balances: impl IntoIterator<Item = (AccountId, u128)>,
) -> (Arc<NullLedger>, GovernanceEngine) {
    let ledger = Arc::new(NullLedger::with_balances(balances));
    let engine = GovernanceEngine::new(
        GovernanceConfig::default(),
        ledger.clone(),
        Arc::new(NullClock::new(0)),
    )
    .unwrap();
    (ledger, engine)
}

#[test]
fn same_account_racing_votes_count_once() {
    let (_, engine) = engine_with([(account(1), 100)]);
    let id = engine.create_proposal(account(1), "race", "", 3600).unwrap();

    let successes = AtomicUsize::new(0);
    let duplicates = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for i in 0..16 {
            let engine = &engine;
            let successes = &successes;
            let duplicates = &duplicates;
            s.spawn(move || match engine.vote(account(1), id, i % 2 == 0) {
                Ok(_) => {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
                Err(GovernanceError::AlreadyVoted { .. }) => {
                    duplicates.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {e}"),
            });
        }
    });

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(duplicates.load(Ordering::SeqCst), 15);
    let p = engine.get_proposal(id).unwrap();
    assert_eq!(p.vote_count(), 1);
    assert_eq!(p.total_votes(), TokenAmount::new(100));
}

#[test]
fn concurrent_voters_lose_no_tally_updates() {
    let voters: Vec<AccountId> = (1..=64).map(account).collect();
    let (_, engine) = engine_with(voters.iter().map(|&a| (a, 10)));
    let id = engine.create_proposal(voters[0], "many", "", 3600).unwrap();

    std::thread::scope(|s| {
        for chunk in voters.chunks(8) {
            let engine = &engine;
            s.spawn(move || {
                for (i, voter) in chunk.iter().enumerate() {
                    engine.vote(*voter, id, i % 4 != 0).unwrap();
                }
            });
        }
    });

    let p = engine.get_proposal(id).unwrap();
    assert_eq!(p.vote_count(), 64);
    assert_eq!(p.for_votes, TokenAmount::new(480));
    assert_eq!(p.against_votes, TokenAmount::new(160));

    let vote_events = engine
        .events()
        .events()
        .iter()
        .filter(|e| matches!(e.event, GovernanceEvent::VoteCast { .. }))
        .count();
    assert_eq!(vote_events, 64);
}

#[test]
fn weight_never_observes_half_applied_delegation() {
    // Delegators flip between two delegatees while readers sum both
    // delegatees' power. Each delegator's balance must land on exactly one
    // side for every consistent view of the registry.
    let delegators: Vec<AccountId> = (10..20).map(account).collect();
    let left = account(1);
    let right = account(2);
    let (_, engine) = engine_with(delegators.iter().map(|&a| (a, 1)));
    for d in &delegators {
        engine.delegate(*d, left).unwrap();
    }

    std::thread::scope(|s| {
        let engine = &engine;
        let delegators = &delegators;
        s.spawn(move || {
            for round in 0..200 {
                for d in delegators {
                    let to = if round % 2 == 0 { right } else { left };
                    engine.delegate(*d, to).unwrap();
                }
            }
        });
        s.spawn(move || {
            for _ in 0..500 {
                let l = engine.weight_breakdown(&left).unwrap();
                let r = engine.weight_breakdown(&right).unwrap();
                assert!(l.delegated_balance.raw() <= 10);
                assert!(r.delegated_balance.raw() <= 10);
                assert_eq!(l.delegators as u128, l.delegated_balance.raw());
                assert_eq!(r.delegators as u128, r.delegated_balance.raw());
            }
        });
    });

    let total = engine.get_votes(&left).unwrap().raw() + engine.get_votes(&right).unwrap().raw();
    assert_eq!(total, 10);
}

#[test]
fn delegation_and_voting_interleave_safely() {
    let (ledger, engine) = engine_with((1..=8).map(|i| (account(i), 5)));
    let id = engine.create_proposal(account(1), "mixed", "", 3600).unwrap();

    std::thread::scope(|s| {
        let engine = &engine;
        let ledger = &ledger;
        s.spawn(move || {
            for i in 5..=8 {
                engine.delegate(account(i), account(1)).unwrap();
            }
        });
        s.spawn(move || {
            for i in 1..=4 {
                ledger.mint(account(i), 1, Timestamp::new(0));
                engine.vote(account(i), id, true).unwrap();
            }
        });
    });

    let p = engine.get_proposal(id).unwrap();
    assert_eq!(p.vote_count(), 4);
    let recorded: u128 = p.receipts.values().map(|r| r.weight.raw()).sum();
    assert_eq!(p.for_votes.raw(), recorded);
    // Own 6 each, plus between 0 and 20 delegated to account 1.
    assert!((24..=44).contains(&recorded));
}

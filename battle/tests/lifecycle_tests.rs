//! Battle lifecycle scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use dareduel_battle::{
    BattleError, BattleLifecycle, BothMissed, BothMissedPolicy, MatchSide,
};
use dareduel_ledger::{Ledger, LedgerError, RetryPolicy};
use dareduel_nullables::{NullClock, NullStore};
use dareduel_store::{BattleStore, Settlement};
use dareduel_types::{
    BattleStatus, Coins, Dare, Outcome, PlayerDisposition, UserContext, UserId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const T0: u64 = 1_709_899_200; // 2024-03-08T12:00:00Z

struct Harness {
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
    lifecycle: Arc<BattleLifecycle<NullStore>>,
}

fn harness(policy: BothMissedPolicy) -> Harness {
    let store = Arc::new(NullStore::new());
    let clock = Arc::new(NullClock::new(T0));
    let ledger = Arc::new(Ledger::new(
        store.clone(),
        clock.clone(),
        RetryPolicy::new(5, Duration::from_millis(1)),
    ));
    Harness {
        store,
        clock,
        lifecycle: Arc::new(BattleLifecycle::new(ledger, policy)),
    }
}

impl Harness {
    async fn player(&self, name: &str, coins: u64) -> UserContext {
        let id = UserId::parse(name).unwrap();
        self.lifecycle
            .ledger()
            .open_account(&id, name, Coins::new(coins))
            .await
            .unwrap();
        UserContext::new(id, name)
    }

    fn balance(&self, ctx: &UserContext) -> u64 {
        self.lifecycle.ledger().balance(&ctx.user_id).unwrap().raw()
    }

    async fn matched(&self, a: &UserContext, b: &UserContext, stake: u64) -> dareduel_store::Battle {
        self.lifecycle
            .create_from_match(&side(a, "run 5k"), &side(b, "no sugar"), Coins::new(stake))
            .await
            .unwrap()
    }
}

fn side(ctx: &UserContext, dare: &str) -> MatchSide {
    MatchSide {
        user_id: ctx.user_id.clone(),
        dare: Dare::single(dare).unwrap(),
    }
}

fn dare(text: &str) -> Dare {
    Dare::single(text).unwrap()
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invite_accept_escrows_both_stakes() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;

    let invite = h
        .lifecycle
        .create_from_invite(&x, &y.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();
    assert_eq!(invite.status, BattleStatus::Pending);
    assert_eq!(invite.wager_pot, Coins::ZERO);
    assert_eq!(h.balance(&x), 100);

    let active = h
        .lifecycle
        .accept_invite(&y, &invite.id, dare("plank"), Coins::new(20))
        .await
        .unwrap();
    assert_eq!(active.status, BattleStatus::Active);
    assert_eq!(active.wager_pot, Coins::new(40));
    assert_eq!(active.escrowed_total(), Coins::new(40));
    assert!(active.started_at.is_some());
    assert_eq!(active.player2_dare, Some(dare("plank")));
    assert_eq!(h.balance(&x), 80);
    assert_eq!(h.balance(&y), 80);
}

#[tokio::test]
async fn accept_with_insufficient_funds_leaves_invite_pending() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let poor = h.player("poor", 5).await;
    let invite = h
        .lifecycle
        .create_from_invite(&x, &poor.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();
    let commits = h.store.commit_count();

    let err = h
        .lifecycle
        .accept_invite(&poor, &invite.id, dare("plank"), Coins::new(20))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "insufficient_funds");
    match err.as_ledger() {
        Some(LedgerError::InsufficientFunds { user, .. }) => assert_eq!(user, &poor.user_id),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.store.commit_count(), commits);
    let stored = h.store.get_battle(&invite.id).unwrap().value;
    assert_eq!(stored.status, BattleStatus::Pending);
    assert!(stored.stakes.is_empty());
    assert_eq!(h.balance(&x), 100);
    assert_eq!(h.balance(&poor), 5);
}

#[tokio::test]
async fn accept_checks_identity_and_stake() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let z = h.player("z", 100).await;
    let invite = h
        .lifecycle
        .create_from_invite(&x, &y.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .accept_invite(&x, &invite.id, dare("plank"), Coins::new(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_invitee");

    let err = h
        .lifecycle
        .accept_invite(&z, &invite.id, dare("plank"), Coins::new(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_participant");

    let err = h
        .lifecycle
        .accept_invite(&y, &invite.id, dare("plank"), Coins::new(10))
        .await
        .unwrap_err();
    assert!(matches!(err, BattleError::StakeMismatch { .. }));
}

#[tokio::test]
async fn duplicate_accept_debits_once() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let invite = h
        .lifecycle
        .create_from_invite(&x, &y.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();

    for _ in 0..2 {
        let b = h
            .lifecycle
            .accept_invite(&y, &invite.id, dare("plank"), Coins::new(20))
            .await
            .unwrap();
        assert_eq!(b.wager_pot, Coins::new(40));
    }
    assert_eq!(h.balance(&y), 80);
}

#[tokio::test]
async fn declined_invite_cannot_be_accepted() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let invite = h
        .lifecycle
        .create_from_invite(&x, &y.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();

    let declined = h.lifecycle.decline_invite(&y, &invite.id).await.unwrap();
    assert_eq!(declined.status, BattleStatus::Declined);
    assert!(declined.ended_at.is_some());
    // Declining again is a no-op.
    h.lifecycle.decline_invite(&y, &invite.id).await.unwrap();

    let err = h
        .lifecycle
        .accept_invite(&y, &invite.id, dare("plank"), Coins::new(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "already_resolved");
    assert_eq!(h.balance(&y), 100);
}

#[tokio::test]
async fn invite_requires_two_existing_players() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let err = h
        .lifecycle
        .create_from_invite(&x, &x.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "self_challenge");

    let ghost = UserId::parse("ghost").unwrap();
    let err = h
        .lifecycle
        .create_from_invite(&x, &ghost, dare("pushups"), Coins::new(20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn match_creates_funded_active_battle() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;

    let battle = h.matched(&x, &y, 20).await;

    assert_eq!(battle.status, BattleStatus::Active);
    assert_eq!(battle.wager_pot, Coins::new(40));
    assert_eq!(h.balance(&x), 80);
    assert_eq!(h.balance(&y), 80);
    assert_eq!(h.lifecycle.battles_for(&x.user_id).unwrap().len(), 1);
}

#[tokio::test]
async fn rematch_at_the_same_instant_gets_a_fresh_id() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;

    let first = h.matched(&x, &y, 20).await;
    let second = h.matched(&x, &y, 20).await;
    assert_ne!(first.id, second.id);
    assert_eq!(h.lifecycle.battles_for(&x.user_id).unwrap().len(), 2);
    assert_eq!(h.balance(&x), 60);
}

#[tokio::test]
async fn match_with_insufficient_funds_creates_no_battle() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 10).await;

    let err = h
        .lifecycle
        .create_from_match(&side(&x, "a"), &side(&y, "b"), Coins::new(20))
        .await
        .unwrap_err();
    match err.as_ledger() {
        Some(LedgerError::InsufficientFunds { user, .. }) => assert_eq!(user, &y.user_id),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.balance(&x), 100);
    assert!(h.lifecycle.battles_for(&x.user_id).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backlog_advances_with_each_submission() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h
        .lifecycle
        .create_from_match(
            &MatchSide {
                user_id: x.user_id.clone(),
                dare: Dare::backlog(["day one", "day two"]).unwrap(),
            },
            &side(&y, "no sugar"),
            Coins::new(20),
        )
        .await
        .unwrap();

    let first = h
        .lifecycle
        .submit_proof(&x, &battle.id, "media/1.jpg", "done", Some("day three".into()))
        .await
        .unwrap();
    assert_eq!(first.dare.as_deref(), Some("day one"));

    let stored = h.store.get_battle(&battle.id).unwrap().value;
    assert_eq!(
        stored.player1_dare,
        Dare::backlog(["day two", "day three"]).unwrap()
    );

    h.clock.advance(60);
    let single = h
        .lifecycle
        .submit_proof(&y, &battle.id, "media/2.jpg", "", Some("ignored".into()))
        .await
        .unwrap();
    assert_eq!(single.dare.as_deref(), Some("no sugar"));

    let subs = h.lifecycle.submissions(&battle.id, &x.user_id).unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].id, first.id);
}

#[tokio::test]
async fn submissions_need_an_active_battle() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let invite = h
        .lifecycle
        .create_from_invite(&x, &y.user_id, dare("pushups"), Coins::new(20))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .submit_proof(&x, &invite.id, "media/1.jpg", "", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "wrong_status");

    let err = h
        .lifecycle
        .submit_proof(&x, &invite.id, "  ", "", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}

// ---------------------------------------------------------------------------
// Resolution and payout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missed_day_pays_the_opponent_once() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;

    let payout = h
        .lifecycle
        .record_missed_day(&battle.id, &y.user_id)
        .await
        .unwrap();
    assert_eq!(payout.winner, x.user_id);
    assert_eq!(payout.coins, Coins::new(40));
    assert_eq!(h.balance(&x), 120);
    assert_eq!(h.balance(&y), 80);

    // The winner claiming after the sweep paid them is a benign no-op.
    let claimed = h.lifecycle.claim_payout(&x, &battle.id).await.unwrap();
    assert_eq!(claimed.winner, x.user_id);
    assert_eq!(claimed.coins, Coins::new(40));
    assert_eq!(claimed.balance, Coins::new(120));
    let again = h.lifecycle.claim_payout(&x, &battle.id).await.unwrap();
    assert_eq!(again, claimed);
    assert_eq!(h.balance(&x), 120);

    let err = h.lifecycle.claim_payout(&y, &battle.id).await.unwrap_err();
    assert!(err.is_already_paid());
    let err = h
        .lifecycle
        .record_missed_day(&battle.id, &y.user_id)
        .await
        .unwrap_err();
    assert!(err.is_already_paid());
    assert_eq!(h.balance(&x), 120);

    let stored = h.store.get_battle(&battle.id).unwrap().value;
    assert_eq!(stored.status, BattleStatus::Completed);
    assert_eq!(
        stored.outcome,
        Some(Outcome::Won {
            winner: x.user_id.clone()
        })
    );
    assert!(matches!(stored.settlement, Some(Settlement::Paid { .. })));

    let stats = h.lifecycle.stats();
    assert_eq!(stats.battles_started, 1);
    assert_eq!(stats.forfeits, 1);
    assert_eq!(stats.payouts, 1);
    assert_eq!(stats.refunds, 0);
}

#[tokio::test]
async fn only_the_stored_winner_can_claim() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;

    let err = h.lifecycle.claim_payout(&x, &battle.id).await.unwrap_err();
    assert_eq!(err.code(), "wrong_status");

    h.lifecycle
        .resolve_forfeit(&battle.id, &x.user_id)
        .await
        .unwrap();
    let err = h.lifecycle.claim_payout(&y, &battle.id).await.unwrap_err();
    assert_eq!(err.code(), "not_winner");

    // The winner is set at most once.
    let err = h
        .lifecycle
        .resolve_forfeit(&battle.id, &y.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "already_resolved");

    let payout = h.lifecycle.claim_payout(&x, &battle.id).await.unwrap();
    assert_eq!(payout.balance, Coins::new(120));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claim_and_sweep_pay_exactly_once() {
    for _ in 0..20 {
        let h = harness(BothMissedPolicy::Refund);
        let x = h.player("x", 100).await;
        let y = h.player("y", 100).await;
        let battle = h.matched(&x, &y, 20).await;
        h.lifecycle
            .resolve_forfeit(&battle.id, &x.user_id)
            .await
            .unwrap();

        let claim = {
            let lifecycle = h.lifecycle.clone();
            let x = x.clone();
            let id = battle.id;
            tokio::spawn(async move { lifecycle.claim_payout(&x, &id).await })
        };
        let sweep = {
            let lifecycle = h.lifecycle.clone();
            let loser = y.user_id.clone();
            let id = battle.id;
            tokio::spawn(async move { lifecycle.record_missed_day(&id, &loser).await })
        };
        let claimed = claim.await.unwrap();
        let swept = sweep.await.unwrap();

        // The winner's claim succeeds whichever side paid.
        assert_eq!(claimed.unwrap().balance, Coins::new(120));
        assert!(matches!(&swept, Ok(_)) || matches!(&swept, Err(e) if e.is_already_paid()), "{swept:?}");
        assert_eq!(h.lifecycle.stats().payouts, 1);
        assert_eq!(h.balance(&x), 120);
        assert_eq!(h.balance(&y), 80);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_resolutions_of_an_active_battle_settle_once() {
    for _ in 0..20 {
        let h = harness(BothMissedPolicy::Refund);
        let x = h.player("x", 100).await;
        let y = h.player("y", 100).await;
        let battle = h.matched(&x, &y, 20).await;

        let forfeit = {
            let lifecycle = h.lifecycle.clone();
            let loser = y.user_id.clone();
            let id = battle.id;
            tokio::spawn(async move { lifecycle.record_missed_day(&id, &loser).await.map(|_| ()) })
        };
        let draw = {
            let lifecycle = h.lifecycle.clone();
            let id = battle.id;
            tokio::spawn(async move { lifecycle.record_both_missed(&id).await.map(|_| ()) })
        };
        let results = [forfeit.await.unwrap(), draw.await.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let resolved = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.code() == "already_resolved"))
            .count();
        assert_eq!((ok, resolved), (1, 1), "{results:?}");

        let stored = h.store.get_battle(&battle.id).unwrap().value;
        assert_eq!(stored.status, BattleStatus::Completed);
        match (&stored.outcome, &stored.settlement) {
            (Some(Outcome::Won { winner }), Some(Settlement::Paid { winner: paid, .. })) => {
                assert_eq!(winner, &x.user_id);
                assert_eq!(paid, &x.user_id);
                assert_eq!((h.balance(&x), h.balance(&y)), (120, 80));
            }
            (Some(Outcome::Draw), Some(Settlement::Refunded { .. })) => {
                assert_eq!((h.balance(&x), h.balance(&y)), (100, 100));
            }
            other => panic!("inconsistent resolution: {other:?}"),
        }
        assert_eq!(stored.wager_pot, Coins::ZERO);

        let stats = h.lifecycle.stats();
        assert_eq!(stats.forfeits + stats.refunds, 1);
        assert_eq!(stats.payouts + stats.refunds, 1);
    }
}

#[tokio::test]
async fn both_missed_refunds_by_default() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;

    let outcome = h.lifecycle.record_both_missed(&battle.id).await.unwrap();
    assert_eq!(outcome, BothMissed::Refunded(Coins::new(40)));
    assert_eq!(h.balance(&x), 100);
    assert_eq!(h.balance(&y), 100);

    let stored = h.store.get_battle(&battle.id).unwrap().value;
    assert_eq!(stored.outcome, Some(Outcome::Draw));
    assert!(matches!(stored.settlement, Some(Settlement::Refunded { .. })));

    let err = h.lifecycle.record_both_missed(&battle.id).await.unwrap_err();
    assert_eq!(err.code(), "already_resolved");
    assert_eq!(h.balance(&x), 100);
}

#[tokio::test]
async fn both_missed_can_keep_the_battle_running() {
    let h = harness(BothMissedPolicy::KeepActive);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;

    let outcome = h.lifecycle.record_both_missed(&battle.id).await.unwrap();
    assert_eq!(outcome, BothMissed::KeptActive);
    let stored = h.store.get_battle(&battle.id).unwrap().value;
    assert_eq!(stored.status, BattleStatus::Active);
    assert_eq!(stored.wager_pot, Coins::new(40));
}

// ---------------------------------------------------------------------------
// Personal dispositions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispositions_are_per_player() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;
    h.lifecycle
        .submit_proof(&x, &battle.id, "media/x1.jpg", "day 1", None)
        .await
        .unwrap();

    let err = h
        .lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Pinned)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "wrong_status");

    h.lifecycle
        .record_missed_day(&battle.id, &y.user_id)
        .await
        .unwrap();

    let pinned = h
        .lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Pinned)
        .await
        .unwrap();
    assert_eq!(pinned.player1_status, PlayerDisposition::Pinned);
    assert_eq!(pinned.player2_status, PlayerDisposition::None);

    let pins = h.lifecycle.pins(&x.user_id).unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].submissions.len(), 1);
    assert!(h.lifecycle.pins(&y.user_id).unwrap().is_empty());

    h.lifecycle
        .resolve_personal(&y, &battle.id, PlayerDisposition::Deleted)
        .await
        .unwrap();
    assert!(h.lifecycle.battles_for(&y.user_id).unwrap().is_empty());
    assert_eq!(h.lifecycle.battles_for(&x.user_id).unwrap().len(), 1);

    let err = h
        .lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_disposition");
}

#[tokio::test]
async fn leaving_pinned_takes_the_pin_down() {
    let h = harness(BothMissedPolicy::Refund);
    let x = h.player("x", 100).await;
    let y = h.player("y", 100).await;
    let battle = h.matched(&x, &y, 20).await;
    h.lifecycle
        .submit_proof(&x, &battle.id, "media/x1.jpg", "day 1", None)
        .await
        .unwrap();
    h.lifecycle
        .resolve_forfeit(&battle.id, &x.user_id)
        .await
        .unwrap();

    h.lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Pinned)
        .await
        .unwrap();
    assert_eq!(h.lifecycle.pins(&x.user_id).unwrap().len(), 1);

    let deleted = h
        .lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Deleted)
        .await
        .unwrap();
    assert_eq!(deleted.player1_status, PlayerDisposition::Deleted);
    assert!(h.lifecycle.pins(&x.user_id).unwrap().is_empty());

    // Re-pinning restores it; archiving removes it again.
    h.lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Pinned)
        .await
        .unwrap();
    assert_eq!(h.lifecycle.pins(&x.user_id).unwrap().len(), 1);
    h.lifecycle
        .resolve_personal(&x, &battle.id, PlayerDisposition::Archived)
        .await
        .unwrap();
    assert!(h.lifecycle.pins(&x.user_id).unwrap().is_empty());
}

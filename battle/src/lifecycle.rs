//! The battle state machine.
//!
//! Every operation that changes a battle runs as one ledger transaction, so
//! a status change and the coin movement it implies are committed together
//! or not at all. Forfeiture is the one deliberate exception: completing the
//! battle and paying the winner are two transactions, and the payout half is
//! guarded by the winner check and the settlement marker so that the sweep
//! and an explicit claim can race without paying twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use dareduel_ledger::{Ledger, LedgerError};
use dareduel_store::{Battle, DuelStore, ProfilePin, Settlement, StoreError, Submission};
use dareduel_types::{
    BattleId, BattleOrigin, BattleStatus, Coins, Dare, DuelError, Outcome, PlayerDisposition,
    SubmissionId, Timestamp, UserContext, UserId,
};

use crate::{BattleError, BothMissedPolicy};

/// One side of a mutually accepted match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSide {
    pub user_id: UserId,
    pub dare: Dare,
}

/// Result of a successful payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub battle_id: BattleId,
    pub winner: UserId,
    pub coins: Coins,
    /// Winner's balance after the credit.
    pub balance: Coins,
}

/// What happened to a battle both players missed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BothMissed {
    Refunded(Coins),
    KeptActive,
}

/// Running totals since startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    pub battles_started: u64,
    pub forfeits: u64,
    pub payouts: u64,
    pub refunds: u64,
}

#[derive(Default)]
struct Counters {
    battles_started: AtomicU64,
    forfeits: AtomicU64,
    payouts: AtomicU64,
    refunds: AtomicU64,
}

pub struct BattleLifecycle<S: ?Sized> {
    ledger: Arc<Ledger<S>>,
    both_missed: BothMissedPolicy,
    sequence: AtomicU64,
    counters: Counters,
}

impl<S: DuelStore + ?Sized> BattleLifecycle<S> {
    pub fn new(ledger: Arc<Ledger<S>>, both_missed: BothMissedPolicy) -> Self {
        let seed = ledger.clock().now().as_secs();
        Self {
            ledger,
            both_missed,
            sequence: AtomicU64::new(seed),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> LifecycleStats {
        let c = &self.counters;
        LifecycleStats {
            battles_started: c.battles_started.load(Ordering::Relaxed),
            forfeits: c.forfeits.load(Ordering::Relaxed),
            payouts: c.payouts.load(Ordering::Relaxed),
            refunds: c.refunds.load(Ordering::Relaxed),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn both_missed_policy(&self) -> BothMissedPolicy {
        self.both_missed
    }

    fn next_battle_id(&self, a: &UserId, b: &UserId, now: Timestamp) -> BattleId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        BattleId::derive(&[
            a.as_bytes(),
            b.as_bytes(),
            &now.as_secs().to_be_bytes(),
            &seq.to_be_bytes(),
        ])
    }

    fn next_submission_id(&self, battle: &BattleId, user: &UserId, now: Timestamp) -> SubmissionId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        SubmissionId::derive(&[
            battle.as_bytes(),
            user.as_bytes(),
            &now.as_secs().to_be_bytes(),
            &seq.to_be_bytes(),
        ])
    }

    // ── Creation ──────────────────────────────────────────────────────────

    /// Write a pending invite from the caller to `invitee`. Nothing is
    /// escrowed until the invite is accepted.
    pub async fn create_from_invite(
        &self,
        ctx: &UserContext,
        invitee: &UserId,
        dare: Dare,
        stake: Coins,
    ) -> Result<Battle, BattleError> {
        let inviter = &ctx.user_id;
        if inviter == invitee {
            return Err(BattleError::SelfChallenge(inviter.clone()));
        }

        let battle = self
            .ledger
            .transact("create_from_invite", |txn| {
                txn.account(inviter)?;
                txn.account(invitee)?;
                let now = txn.now();
                let battle = Battle {
                    id: self.next_battle_id(inviter, invitee, now),
                    origin: BattleOrigin::Invite,
                    player1: inviter.clone(),
                    player2: invitee.clone(),
                    player1_dare: dare.clone(),
                    player2_dare: None,
                    status: BattleStatus::Pending,
                    player1_status: PlayerDisposition::None,
                    player2_status: PlayerDisposition::None,
                    stake_coins: stake,
                    stakes: Vec::new(),
                    wager_pot: Coins::ZERO,
                    outcome: None,
                    settlement: None,
                    created_at: now,
                    started_at: None,
                    updated_at: now,
                    ended_at: None,
                };
                txn.insert_battle(battle.clone());
                Ok::<_, BattleError>(battle)
            })
            .await?;

        tracing::info!(battle = %battle.id, inviter = %inviter, invitee = %invitee, %stake, "invite created");
        Ok(battle)
    }

    /// Accept a pending invite: escrow both stakes jointly and activate.
    ///
    /// Accepting an invite the caller already accepted returns the active
    /// battle unchanged.
    pub async fn accept_invite(
        &self,
        ctx: &UserContext,
        battle_id: &BattleId,
        dare: Dare,
        stake: Coins,
    ) -> Result<Battle, BattleError> {
        let acceptor = &ctx.user_id;
        let (battle, activated) = self
            .ledger
            .transact("accept_invite", |txn| {
                let (inviter, required) = {
                    let b = txn.battle(battle_id)?;
                    if &b.player2 != acceptor {
                        return Err(if &b.player1 == acceptor {
                            BattleError::NotInvitee {
                                user: acceptor.clone(),
                                battle: *battle_id,
                            }
                        } else {
                            BattleError::NotParticipant {
                                user: acceptor.clone(),
                                battle: *battle_id,
                            }
                        });
                    }
                    match b.status {
                        BattleStatus::Pending => {}
                        BattleStatus::Active => return Ok((b.clone(), false)),
                        BattleStatus::Completed | BattleStatus::Declined => {
                            return Err(BattleError::AlreadyResolved(*battle_id))
                        }
                    }
                    if stake != b.stake_coins {
                        return Err(BattleError::StakeMismatch {
                            required: b.stake_coins,
                            offered: stake,
                        });
                    }
                    (b.player1.clone(), b.stake_coins)
                };

                txn.escrow_joint(
                    battle_id,
                    &[(acceptor.clone(), required), (inviter, required)],
                )?;

                let now = txn.now();
                let b = txn.battle_mut(battle_id)?;
                b.player2_dare = Some(dare.clone());
                b.status = BattleStatus::Active;
                b.started_at = Some(now);
                Ok((b.clone(), true))
            })
            .await?;

        if activated {
            self.counters.battles_started.fetch_add(1, Ordering::Relaxed);
            tracing::info!(battle = %battle_id, acceptor = %acceptor, pot = %battle.wager_pot, "invite accepted");
        }
        Ok(battle)
    }

    /// Decline (invitee) or withdraw (inviter) a pending invite.
    pub async fn decline_invite(
        &self,
        ctx: &UserContext,
        battle_id: &BattleId,
    ) -> Result<Battle, BattleError> {
        let user = &ctx.user_id;
        let battle = self
            .ledger
            .transact("decline_invite", |txn| {
                let b = txn.battle(battle_id)?;
                if !b.is_participant(user) {
                    return Err(BattleError::NotParticipant {
                        user: user.clone(),
                        battle: *battle_id,
                    });
                }
                match b.status {
                    BattleStatus::Pending => {}
                    BattleStatus::Declined => return Ok(b.clone()),
                    BattleStatus::Active | BattleStatus::Completed => {
                        return Err(BattleError::AlreadyResolved(*battle_id))
                    }
                }
                let now = txn.now();
                let b = txn.battle_mut(battle_id)?;
                b.status = BattleStatus::Declined;
                b.ended_at = Some(now);
                Ok(b.clone())
            })
            .await?;

        tracing::info!(battle = %battle_id, by = %user, "invite declined");
        Ok(battle)
    }

    /// Create an active battle for a mutually accepted match, escrowing both
    /// stakes in the same transaction that writes the battle.
    pub async fn create_from_match(
        &self,
        first: &MatchSide,
        second: &MatchSide,
        stake: Coins,
    ) -> Result<Battle, BattleError> {
        if first.user_id == second.user_id {
            return Err(BattleError::SelfChallenge(first.user_id.clone()));
        }

        let battle = self
            .ledger
            .transact("create_from_match", |txn| {
                let now = txn.now();
                let id = self.next_battle_id(&first.user_id, &second.user_id, now);
                txn.insert_battle(Battle {
                    id,
                    origin: BattleOrigin::Match,
                    player1: first.user_id.clone(),
                    player2: second.user_id.clone(),
                    player1_dare: first.dare.clone(),
                    player2_dare: Some(second.dare.clone()),
                    status: BattleStatus::Active,
                    player1_status: PlayerDisposition::None,
                    player2_status: PlayerDisposition::None,
                    stake_coins: stake,
                    stakes: Vec::new(),
                    wager_pot: Coins::ZERO,
                    outcome: None,
                    settlement: None,
                    created_at: now,
                    started_at: Some(now),
                    updated_at: now,
                    ended_at: None,
                });
                txn.escrow_joint(
                    &id,
                    &[
                        (first.user_id.clone(), stake),
                        (second.user_id.clone(), stake),
                    ],
                )?;
                Ok::<_, BattleError>(txn.battle(&id)?.clone())
            })
            .await?;

        self.counters.battles_started.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            battle = %battle.id,
            player1 = %battle.player1,
            player2 = %battle.player2,
            pot = %battle.wager_pot,
            "match battle created"
        );
        Ok(battle)
    }

    // ── Daily proof ───────────────────────────────────────────────────────

    /// Append a proof-of-compliance submission. For backlog dares the
    /// answered dare is popped and `next_dare` appended in the same
    /// transaction as the submission.
    pub async fn submit_proof(
        &self,
        ctx: &UserContext,
        battle_id: &BattleId,
        media_ref: &str,
        caption: &str,
        next_dare: Option<String>,
    ) -> Result<Submission, BattleError> {
        if media_ref.trim().is_empty() {
            return Err(DuelError::InvalidMediaRef("media reference is empty".into()).into());
        }
        let user = &ctx.user_id;

        let submission = self
            .ledger
            .transact("submit_proof", |txn| {
                let slot = {
                    let b = txn.battle(battle_id)?;
                    let slot = b.slot_of(user).ok_or_else(|| BattleError::NotParticipant {
                        user: user.clone(),
                        battle: *battle_id,
                    })?;
                    if b.status != BattleStatus::Active {
                        return Err(BattleError::wrong_status(
                            *battle_id,
                            b.status,
                            BattleStatus::Active,
                        ));
                    }
                    slot
                };

                let now = txn.now();
                let b = txn.battle_mut(battle_id)?;
                let dare = b
                    .dare_mut(slot)
                    .ok_or_else(|| DuelError::InvalidDare("no dare recorded for player".into()))?;
                let answered = dare.current().map(str::to_string);
                let consumed = dare.advance(next_dare.clone())?;

                let submission = Submission {
                    id: self.next_submission_id(battle_id, user, now),
                    battle_id: *battle_id,
                    user_id: user.clone(),
                    media_ref: media_ref.to_string(),
                    caption: caption.to_string(),
                    dare: consumed.or(answered),
                    submitted_at: now,
                };
                txn.append_submission(submission.clone());
                Ok(submission)
            })
            .await?;

        tracing::debug!(battle = %battle_id, user = %user, submission = %submission.id, "proof submitted");
        Ok(submission)
    }

    // ── Resolution ────────────────────────────────────────────────────────

    /// Complete an active battle in favour of `winner`. The winner is set at
    /// most once: repeating the call with the same winner is a no-op, any
    /// other resolution of a completed battle is `AlreadyResolved`.
    pub async fn resolve_forfeit(
        &self,
        battle_id: &BattleId,
        winner: &UserId,
    ) -> Result<Battle, BattleError> {
        let (battle, completed) = self
            .ledger
            .transact("resolve_forfeit", |txn| {
                let b = txn.battle(battle_id)?;
                if !b.is_participant(winner) {
                    return Err(BattleError::NotParticipant {
                        user: winner.clone(),
                        battle: *battle_id,
                    });
                }
                if b.status == BattleStatus::Completed && b.winner() == Some(winner) {
                    return Ok((b.clone(), false));
                }
                if !b.status.can_transition_to(BattleStatus::Completed) {
                    return Err(if b.status.is_terminal() {
                        BattleError::AlreadyResolved(*battle_id)
                    } else {
                        BattleError::wrong_status(*battle_id, b.status, BattleStatus::Active)
                    });
                }

                let now = txn.now();
                let b = txn.battle_mut(battle_id)?;
                b.status = BattleStatus::Completed;
                b.outcome = Some(Outcome::Won {
                    winner: winner.clone(),
                });
                b.ended_at = Some(now);
                Ok((b.clone(), true))
            })
            .await?;

        if completed {
            self.counters.forfeits.fetch_add(1, Ordering::Relaxed);
            tracing::info!(battle = %battle_id, winner = %winner, "battle completed");
        }
        Ok(battle)
    }

    /// One player missed a day: the other wins and is paid the pot.
    pub async fn record_missed_day(
        &self,
        battle_id: &BattleId,
        missed: &UserId,
    ) -> Result<Payout, BattleError> {
        let battle = self.get_battle(battle_id)?;
        let winner = battle
            .opponent_of(missed)
            .cloned()
            .ok_or_else(|| BattleError::NotParticipant {
                user: missed.clone(),
                battle: *battle_id,
            })?;

        tracing::info!(battle = %battle_id, missed = %missed, "missed day, forfeiting");
        self.resolve_forfeit(battle_id, &winner).await?;
        self.pay_winner(battle_id, &winner, "record_missed_day").await
    }

    /// Both players missed a day. Applies the configured [`BothMissedPolicy`].
    pub async fn record_both_missed(&self, battle_id: &BattleId) -> Result<BothMissed, BattleError> {
        if self.both_missed == BothMissedPolicy::KeepActive {
            tracing::debug!(battle = %battle_id, "both players missed, keeping battle active");
            return Ok(BothMissed::KeptActive);
        }

        let refunded = self
            .ledger
            .transact("record_both_missed", |txn| {
                let b = txn.battle(battle_id)?;
                if !b.status.can_transition_to(BattleStatus::Completed) {
                    return Err(if b.status.is_terminal() {
                        BattleError::AlreadyResolved(*battle_id)
                    } else {
                        BattleError::wrong_status(*battle_id, b.status, BattleStatus::Active)
                    });
                }
                let now = txn.now();
                let b = txn.battle_mut(battle_id)?;
                b.status = BattleStatus::Completed;
                b.outcome = Some(Outcome::Draw);
                b.ended_at = Some(now);
                Ok(txn.refund(battle_id)?)
            })
            .await?;

        self.counters.refunds.fetch_add(1, Ordering::Relaxed);
        tracing::info!(battle = %battle_id, %refunded, "both players missed, battle drawn");
        Ok(BothMissed::Refunded(refunded))
    }

    /// Explicit claim by the stored winner.
    ///
    /// A winner who was already paid (by the sweep or an earlier claim) gets
    /// the stored payout back and nothing moves. Anyone else claiming a
    /// settled battle gets `AlreadyPaid`.
    pub async fn claim_payout(
        &self,
        ctx: &UserContext,
        battle_id: &BattleId,
    ) -> Result<Payout, BattleError> {
        let user = &ctx.user_id;
        {
            let b = self.get_battle(battle_id)?;
            if !b.is_participant(user) {
                return Err(BattleError::NotParticipant {
                    user: user.clone(),
                    battle: *battle_id,
                });
            }
            if let Some(payout) = self.settled_payout(&b, user)? {
                return Ok(payout);
            }
            if b.settlement.is_none() && b.status != BattleStatus::Completed {
                return Err(BattleError::wrong_status(
                    *battle_id,
                    b.status,
                    BattleStatus::Completed,
                ));
            }
        }
        match self.pay_winner(battle_id, user, "claim_payout").await {
            Err(e) if e.is_already_paid() => {
                // Lost the race to a concurrent settlement; re-read it.
                let b = self.get_battle(battle_id)?;
                self.settled_payout(&b, user)?.ok_or(e)
            }
            other => other,
        }
    }

    /// The stored payout, if `battle` was already paid to `user`.
    fn settled_payout(
        &self,
        battle: &Battle,
        user: &UserId,
    ) -> Result<Option<Payout>, BattleError> {
        match &battle.settlement {
            Some(Settlement::Paid { winner, coins, .. }) if winner == user => {
                tracing::debug!(battle = %battle.id, winner = %user, "claim on a battle already paid to the claimant");
                Ok(Some(Payout {
                    battle_id: battle.id,
                    winner: winner.clone(),
                    coins: *coins,
                    balance: self.ledger.balance(user)?,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Pay the whole pot to `winner`. The ledger re-checks the stored winner
    /// and the settlement marker inside the transaction.
    pub(crate) async fn pay_winner(
        &self,
        battle_id: &BattleId,
        winner: &UserId,
        op: &'static str,
    ) -> Result<Payout, BattleError> {
        let payout = self
            .ledger
            .transact(op, |txn| {
                let pot = txn.battle(battle_id)?.wager_pot;
                let balance = txn.payout(battle_id, winner, pot)?;
                Ok::<_, LedgerError>(Payout {
                    battle_id: *battle_id,
                    winner: winner.clone(),
                    coins: pot,
                    balance,
                })
            })
            .await?;
        self.counters.payouts.fetch_add(1, Ordering::Relaxed);
        tracing::info!(battle = %battle_id, winner = %winner, coins = %payout.coins, "pot paid out");
        Ok(payout)
    }

    /// Set the caller's own disposition of a finished battle. Pinning also
    /// snapshots the caller's submissions onto their profile; moving away
    /// from `Pinned` takes the snapshot down again.
    pub async fn resolve_personal(
        &self,
        ctx: &UserContext,
        battle_id: &BattleId,
        disposition: PlayerDisposition,
    ) -> Result<Battle, BattleError> {
        if disposition == PlayerDisposition::None {
            return Err(BattleError::InvalidDisposition(disposition));
        }
        let user = &ctx.user_id;

        let battle = self
            .ledger
            .transact("resolve_personal", |txn| {
                let (slot, previous) = {
                    let b = txn.battle(battle_id)?;
                    let slot = b.slot_of(user).ok_or_else(|| BattleError::NotParticipant {
                        user: user.clone(),
                        battle: *battle_id,
                    })?;
                    let allowed = match disposition {
                        PlayerDisposition::Pinned => b.status == BattleStatus::Completed,
                        _ => b.status.is_terminal(),
                    };
                    if !allowed {
                        return Err(BattleError::wrong_status(
                            *battle_id,
                            b.status,
                            BattleStatus::Completed,
                        ));
                    }
                    (slot, b.disposition(slot))
                };

                let now = txn.now();
                if previous == PlayerDisposition::Pinned && disposition != PlayerDisposition::Pinned {
                    txn.delete_pin(user, battle_id);
                }
                if disposition == PlayerDisposition::Pinned {
                    let submissions = txn
                        .store()
                        .submissions_for(battle_id, user)
                        .map_err(LedgerError::from)?;
                    txn.put_pin(ProfilePin {
                        user_id: user.clone(),
                        battle_id: *battle_id,
                        submissions,
                        pinned_at: now,
                    });
                }
                let b = txn.battle_mut(battle_id)?;
                b.set_disposition(slot, disposition);
                Ok(b.clone())
            })
            .await?;

        tracing::info!(battle = %battle_id, user = %user, disposition = disposition.as_str(), "personal disposition set");
        Ok(battle)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn get_battle(&self, battle_id: &BattleId) -> Result<Battle, BattleError> {
        match self.ledger.store().get_battle(battle_id) {
            Ok(stored) => Ok(stored.value),
            Err(StoreError::NotFound(_)) => Err(LedgerError::BattleNotFound(*battle_id).into()),
            Err(e) => Err(LedgerError::from(e).into()),
        }
    }

    /// The user's battles, newest first, without the ones they deleted.
    pub fn battles_for(&self, user: &UserId) -> Result<Vec<Battle>, BattleError> {
        let battles = self
            .ledger
            .store()
            .battles_for_player(user)
            .map_err(LedgerError::from)?;
        Ok(battles
            .into_iter()
            .filter(|b| {
                b.slot_of(user)
                    .is_some_and(|slot| b.disposition(slot) != PlayerDisposition::Deleted)
            })
            .collect())
    }

    /// One player's submissions in a battle, most recent first.
    pub fn submissions(
        &self,
        battle_id: &BattleId,
        user: &UserId,
    ) -> Result<Vec<Submission>, BattleError> {
        Ok(self
            .ledger
            .store()
            .submissions_for(battle_id, user)
            .map_err(LedgerError::from)?)
    }

    pub fn pins(&self, user: &UserId) -> Result<Vec<ProfilePin>, BattleError> {
        Ok(self
            .ledger
            .store()
            .pins_for(user)
            .map_err(LedgerError::from)?)
    }
}

//! Daily forfeit sweep.
//!
//! For every active battle, each player's most recent submission is mapped
//! to a calendar day under the configured UTC offset. A player missed if
//! that day is strictly before `today`, or if they never submitted. One
//! miss forfeits the battle to the other side; two misses go to the
//! [`BothMissedPolicy`](crate::BothMissedPolicy).
//!
//! A battle that started on `today` or later is not due yet.
//!
//! The sweep also finishes payouts for battles that were completed with a
//! winner but never settled, which happens when the node stops between the
//! two halves of a forfeit.

use std::sync::Arc;

use chrono::FixedOffset;
use serde::Serialize;

use dareduel_ledger::LedgerError;
use dareduel_store::{Battle, DuelStore};
use dareduel_types::{BattleStatus, CalendarDay, UserId};

use crate::{BattleError, BattleLifecycle, BothMissed};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub not_due: u64,
    pub forfeits: u64,
    pub draws: u64,
    pub kept_active: u64,
    /// Completed-but-unpaid battles settled by this run.
    pub recovered_payouts: u64,
    pub failures: u64,
}

enum Verdict {
    NotDue,
    BothSubmitted,
    Missed(UserId),
    BothMissed,
}

pub struct ForfeitSweep<S: ?Sized> {
    lifecycle: Arc<BattleLifecycle<S>>,
    offset: FixedOffset,
}

impl<S: DuelStore + ?Sized> ForfeitSweep<S> {
    pub fn new(lifecycle: Arc<BattleLifecycle<S>>, offset: FixedOffset) -> Self {
        Self { lifecycle, offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn missed(&self, battle: &Battle, user: &UserId, today: CalendarDay) -> Result<bool, BattleError> {
        let latest = self
            .lifecycle
            .ledger()
            .store()
            .latest_submission(&battle.id, user)
            .map_err(LedgerError::from)?;
        Ok(match latest {
            Some(s) => s.submitted_at.calendar_day(self.offset) < today,
            None => true,
        })
    }

    fn judge(&self, battle: &Battle, today: CalendarDay) -> Result<Verdict, BattleError> {
        let started = battle.started_at.unwrap_or(battle.created_at);
        if started.calendar_day(self.offset) >= today {
            return Ok(Verdict::NotDue);
        }
        let p1 = self.missed(battle, &battle.player1, today)?;
        let p2 = self.missed(battle, &battle.player2, today)?;
        Ok(match (p1, p2) {
            (false, false) => Verdict::BothSubmitted,
            (true, false) => Verdict::Missed(battle.player1.clone()),
            (false, true) => Verdict::Missed(battle.player2.clone()),
            (true, true) => Verdict::BothMissed,
        })
    }

    /// Evaluate every active battle against `today` once.
    ///
    /// Per-battle failures are logged and counted; they do not stop the run.
    pub async fn run_once(&self, today: CalendarDay) -> Result<SweepReport, BattleError> {
        let store = self.lifecycle.ledger().store();
        let active = store
            .battles_with_status(BattleStatus::Active)
            .map_err(LedgerError::from)?;
        let mut report = SweepReport::default();

        for battle in &active {
            report.scanned += 1;
            let verdict = match self.judge(battle, today) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(battle = %battle.id, error = %e, "sweep could not evaluate battle");
                    report.failures += 1;
                    continue;
                }
            };

            let result = match verdict {
                Verdict::NotDue => {
                    report.not_due += 1;
                    Ok(())
                }
                Verdict::BothSubmitted => Ok(()),
                Verdict::Missed(user) => self
                    .lifecycle
                    .record_missed_day(&battle.id, &user)
                    .await
                    .map(|_| report.forfeits += 1),
                Verdict::BothMissed => self
                    .lifecycle
                    .record_both_missed(&battle.id)
                    .await
                    .map(|outcome| match outcome {
                        BothMissed::Refunded(_) => report.draws += 1,
                        BothMissed::KeptActive => report.kept_active += 1,
                    }),
            };

            match result {
                Ok(()) => {}
                // A concurrent claim or resolution got there first.
                Err(e) if e.is_already_paid() || matches!(e, BattleError::AlreadyResolved(_)) => {
                    tracing::debug!(battle = %battle.id, error = %e, "battle already settled");
                }
                Err(e) => {
                    tracing::warn!(battle = %battle.id, error = %e, "sweep failed to resolve battle");
                    report.failures += 1;
                }
            }
        }

        let unpaid = store
            .battles_with_status(BattleStatus::Completed)
            .map_err(LedgerError::from)?
            .into_iter()
            .filter(|b| b.settlement.is_none());
        for battle in unpaid {
            let Some(winner) = battle.winner().cloned() else {
                continue;
            };
            match self
                .lifecycle
                .pay_winner(&battle.id, &winner, "sweep_recovery")
                .await
            {
                Ok(_) => report.recovered_payouts += 1,
                Err(e) if e.is_already_paid() => {}
                Err(e) => {
                    tracing::warn!(battle = %battle.id, error = %e, "sweep failed to settle completed battle");
                    report.failures += 1;
                }
            }
        }

        tracing::info!(
            day = %today,
            scanned = report.scanned,
            forfeits = report.forfeits,
            draws = report.draws,
            recovered = report.recovered_payouts,
            failures = report.failures,
            "forfeit sweep finished"
        );
        Ok(report)
    }
}

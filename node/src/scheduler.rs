//! Daily forfeit sweep scheduling.
//!
//! The sweep runs once a day at `sweep_hour` local time under the
//! configured UTC offset and judges the calendar day that just ended, so a
//! proof submitted any time during a day counts for that day.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use dareduel_battle::{BattleError, ForfeitSweep, SweepReport};
use dareduel_store::DuelStore;
use dareduel_types::time::next_daily_run;
use dareduel_types::{CalendarDay, Clock, Timestamp};

use crate::metrics::NodeMetrics;

pub struct SweepScheduler<S: ?Sized> {
    sweep: ForfeitSweep<S>,
    clock: Arc<dyn Clock>,
    hour: u32,
    metrics: Arc<NodeMetrics>,
}

impl<S: DuelStore + ?Sized + 'static> SweepScheduler<S> {
    pub fn new(
        sweep: ForfeitSweep<S>,
        clock: Arc<dyn Clock>,
        hour: u32,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            sweep,
            clock,
            hour,
            metrics,
        }
    }

    /// The day a run scheduled at `at` judges: the one before it.
    pub fn judged_day(&self, at: Timestamp) -> CalendarDay {
        at.calendar_day(self.sweep.offset()).pred()
    }

    /// Run the sweep for `day` and record it.
    pub async fn run_for(&self, day: CalendarDay) -> Result<SweepReport, BattleError> {
        let started = tokio::time::Instant::now();
        let report = self.sweep.run_once(day).await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.metrics.sweep_runs.inc();
        self.metrics.sweep_duration_ms.observe(elapsed_ms);
        tracing::debug!(day = %day, elapsed_ms, "sweep run recorded");
        Ok(report)
    }

    /// Sleep until each daily run time and sweep, until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let offset = self.sweep.offset();
        let mut last_run: Option<Timestamp> = None;
        loop {
            let now = self.clock.now();
            let from = last_run.map_or(now, |last| last.max(now));
            let next = next_daily_run(from, self.hour, offset);
            let wait = Duration::from_secs(next.as_secs().saturating_sub(now.as_secs()));
            tracing::debug!(next = next.as_secs(), wait_secs = wait.as_secs(), "next forfeit sweep scheduled");

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("sweep scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    last_run = Some(next);
                    if let Err(e) = self.run_for(self.judged_day(next)).await {
                        tracing::error!(error = %e, "forfeit sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dareduel_battle::{BattleLifecycle, BothMissedPolicy, MatchSide};
    use dareduel_ledger::{Ledger, RetryPolicy};
    use dareduel_nullables::{NullClock, NullStore};
    use dareduel_store::Battle;
    use dareduel_types::time::utc_offset;
    use dareduel_types::{BattleStatus, Coins, Dare, UserContext, UserId};

    const T0: u64 = 1_709_899_200; // 2024-03-08T12:00:00Z
    const MAR_10: u64 = 1_710_028_800; // 2024-03-10T00:00:00Z
    const DAY: u64 = 86_400;

    struct Fixture {
        clock: Arc<NullClock>,
        lifecycle: Arc<BattleLifecycle<NullStore>>,
        metrics: Arc<NodeMetrics>,
        x: UserContext,
        battle: Battle,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(NullClock::new(T0));
        let ledger = Arc::new(Ledger::new(
            Arc::new(NullStore::new()),
            clock.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        ));
        let lifecycle = Arc::new(BattleLifecycle::new(ledger.clone(), BothMissedPolicy::Refund));
        let mut sides = Vec::new();
        for (name, dare) in [("x", "journal"), ("y", "stretch")] {
            let id = UserId::parse(name).unwrap();
            ledger.open_account(&id, name, Coins::new(100)).await.unwrap();
            sides.push(MatchSide {
                user_id: id,
                dare: Dare::single(dare).unwrap(),
            });
        }
        let battle = lifecycle
            .create_from_match(&sides[0], &sides[1], Coins::new(20))
            .await
            .unwrap();
        Fixture {
            clock,
            lifecycle,
            metrics: Arc::new(NodeMetrics::new().unwrap()),
            x: UserContext::new(sides[0].user_id.clone(), "x"),
            battle,
        }
    }

    fn scheduler(f: &Fixture, hour: u32) -> SweepScheduler<NullStore> {
        SweepScheduler::new(
            ForfeitSweep::new(f.lifecycle.clone(), utc_offset(0).unwrap()),
            f.clock.clone(),
            hour,
            f.metrics.clone(),
        )
    }

    #[tokio::test]
    async fn a_run_judges_the_previous_day() {
        let f = fixture().await;
        let s = scheduler(&f, 0);
        let judged = s.judged_day(Timestamp::new(MAR_10 + DAY));
        assert_eq!(judged, CalendarDay::from_ymd(2024, 3, 10).unwrap());
    }

    #[tokio::test]
    async fn a_run_is_timed_and_counted_once() {
        let f = fixture().await;
        let s = scheduler(&f, 0);
        let report = s
            .run_for(CalendarDay::from_ymd(2024, 3, 8).unwrap())
            .await
            .unwrap();
        assert_eq!(report.not_due, 1);
        assert_eq!(f.metrics.sweep_runs.get(), 1);
        assert_eq!(f.metrics.sweep_duration_ms.get_sample_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_run_forfeits_the_silent_player() {
        let f = fixture().await;
        f.clock.set(MAR_10 + 12 * 3600);
        f.lifecycle
            .submit_proof(&f.x, &f.battle.id, "media/x.jpg", "", None)
            .await
            .unwrap();

        // Ten seconds before midnight at the end of 2024-03-10.
        f.clock.set(MAR_10 + DAY - 10);
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(scheduler(&f, 0).run(rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(f.metrics.sweep_runs.get(), 1);
        let battle = f.lifecycle.get_battle(&f.battle.id).unwrap();
        assert_eq!(battle.status, BattleStatus::Completed);
        assert_eq!(f.lifecycle.ledger().balance(&f.x.user_id).unwrap(), Coins::new(120));

        // The clock has not moved, but the same slot is not swept twice.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.metrics.sweep_runs.get(), 1);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_an_idle_scheduler() {
        let f = fixture().await;
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(scheduler(&f, 3).run(rx));
        tokio::task::yield_now().await;
        tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(f.metrics.sweep_runs.get(), 0);
    }
}

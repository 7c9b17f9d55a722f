//! Prometheus metrics for the node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] which the RPC `/metrics`
//! endpoint encodes in the text exposition format. Most counters mirror
//! running totals kept by the subsystems themselves and are brought up to
//! date by [`NodeMetrics::refresh`].

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

use dareduel_battle::LifecycleStats;
use dareduel_matchmaking::MatchStats;

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub matches_proposed: IntCounter,
    pub battles_created: IntCounter,
    pub payouts: IntCounter,
    pub refunds: IntCounter,
    pub forfeits: IntCounter,
    /// Optimistic-concurrency conflicts seen by the ledger, retried or not.
    pub transaction_conflicts: IntCounter,
    pub sweep_runs: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub queue_depth: IntGauge,
    pub live_sessions: IntGauge,
    pub connected_clients: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub sweep_duration_ms: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
}

/// Advance a counter to `total`. Counters never go backwards.
fn catch_up(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let matches_proposed = counter(
            &registry,
            "dareduel_matches_proposed_total",
            "Match sessions opened by the matchmaker",
        )?;
        let battles_created = counter(
            &registry,
            "dareduel_battles_created_total",
            "Battles that became active, from invites or matches",
        )?;
        let payouts = counter(
            &registry,
            "dareduel_payouts_total",
            "Pots paid out to winners",
        )?;
        let refunds = counter(
            &registry,
            "dareduel_refunds_total",
            "Pots refunded after both players missed a day",
        )?;
        let forfeits = counter(
            &registry,
            "dareduel_forfeits_total",
            "Battles completed by a missed day",
        )?;
        let transaction_conflicts = counter(
            &registry,
            "dareduel_transaction_conflicts_total",
            "Ledger commits rejected by a version conflict",
        )?;
        let sweep_runs = counter(
            &registry,
            "dareduel_sweep_runs_total",
            "Completed forfeit sweep runs",
        )?;

        let queue_depth = gauge(
            &registry,
            "dareduel_queue_depth",
            "Unmatched requests waiting in the match queue",
        )?;
        let live_sessions = gauge(
            &registry,
            "dareduel_live_sessions",
            "Match sessions awaiting both accepts",
        )?;
        let connected_clients = gauge(
            &registry,
            "dareduel_connected_clients",
            "Clients attached to the matchmaker",
        )?;

        let sweep_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "dareduel_sweep_duration_ms",
                "Wall time of one forfeit sweep run in milliseconds"
            )
            .buckets(vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0, 60_000.0]),
            registry
        )?;

        Ok(Self {
            registry,
            matches_proposed,
            battles_created,
            payouts,
            refunds,
            forfeits,
            transaction_conflicts,
            sweep_runs,
            queue_depth,
            live_sessions,
            connected_clients,
            sweep_duration_ms,
        })
    }

    /// Copy the subsystems' running totals into the exported metrics.
    pub fn refresh(&self, matches: &MatchStats, battles: &LifecycleStats, conflicts: u64) {
        catch_up(&self.matches_proposed, matches.matches_proposed);
        catch_up(&self.battles_created, battles.battles_started);
        catch_up(&self.payouts, battles.payouts);
        catch_up(&self.refunds, battles.refunds);
        catch_up(&self.forfeits, battles.forfeits);
        catch_up(&self.transaction_conflicts, conflicts);

        self.queue_depth.set(matches.queue_depth as i64);
        self.live_sessions.set(matches.live_sessions as i64);
        self.connected_clients.set(matches.connected_clients as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_under_one_registry() {
        let metrics = NodeMetrics::new().unwrap();
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"dareduel_queue_depth".to_string()));
        assert!(names.contains(&"dareduel_transaction_conflicts_total".to_string()));
    }

    #[test]
    fn refresh_catches_counters_up_without_going_back() {
        let metrics = NodeMetrics::new().unwrap();
        let matches = MatchStats {
            queue_depth: 3,
            matches_proposed: 4,
            ..MatchStats::default()
        };
        let battles = LifecycleStats {
            battles_started: 2,
            payouts: 1,
            ..LifecycleStats::default()
        };
        metrics.refresh(&matches, &battles, 7);
        assert_eq!(metrics.matches_proposed.get(), 4);
        assert_eq!(metrics.battles_created.get(), 2);
        assert_eq!(metrics.transaction_conflicts.get(), 7);
        assert_eq!(metrics.queue_depth.get(), 3);

        let drained = MatchStats::default();
        metrics.refresh(&drained, &battles, 7);
        assert_eq!(metrics.matches_proposed.get(), 4);
        assert_eq!(metrics.queue_depth.get(), 0);
    }
}

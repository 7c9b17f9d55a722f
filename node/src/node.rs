//! The DareDuel node: owns storage, the ledger and the battle lifecycle,
//! and runs the matchmaker, the daily sweep and the servers as tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use dareduel_battle::{BattleLifecycle, ForfeitSweep};
use dareduel_ledger::Ledger;
use dareduel_matchmaking::{Matchmaker, MatchmakerHandle};
use dareduel_rpc::{RpcServer, RpcState};
use dareduel_store_lmdb::LmdbStore;
use dareduel_types::{Clock, SystemClock};
use dareduel_websocket::WebSocketServer;

use crate::config::NodeConfig;
use crate::game_bridge::LedgerGameCreator;
use crate::metrics::NodeMetrics;
use crate::scheduler::SweepScheduler;
use crate::shutdown::ShutdownController;
use crate::NodeError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DuelNode {
    pub config: NodeConfig,
    pub store: Arc<LmdbStore>,
    pub lifecycle: Arc<BattleLifecycle<LmdbStore>>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    clock: Arc<dyn Clock>,
    matchmaker: Option<MatchmakerHandle>,
    task_handles: Vec<JoinHandle<()>>,
}

impl DuelNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a node that reads time from `clock`.
    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;

        let store = Arc::new(LmdbStore::open(&config.data_dir, config.lmdb_map_size())?);
        let ledger = Arc::new(Ledger::new(
            store.clone(),
            clock.clone(),
            config.retry_policy(),
        ));
        let lifecycle = Arc::new(BattleLifecycle::new(ledger, config.both_missed_policy));
        let metrics = Arc::new(NodeMetrics::new()?);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            both_missed = ?config.both_missed_policy,
            "DareDuel node initialised"
        );

        Ok(Self {
            config,
            store,
            lifecycle,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            clock,
            matchmaker: None,
            task_handles: Vec::new(),
        })
    }

    /// Handle to the running matchmaker, once [`start`](Self::start) has run.
    pub fn matchmaker(&self) -> Option<&MatchmakerHandle> {
        self.matchmaker.as_ref()
    }

    /// Spawn every subsystem. Returns once they are running.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.matchmaker.is_some() {
            return Err(NodeError::Config("node already started".into()));
        }
        let offset = self.config.utc_offset()?;

        // Matchmaker
        let creator = Arc::new(LedgerGameCreator::new(self.lifecycle.clone()));
        let (matchmaker, mm_handle) = Matchmaker::spawn(
            self.config.match_config(),
            creator,
            self.clock.clone(),
            self.shutdown.subscribe(),
        );
        self.task_handles.push(mm_handle);
        self.matchmaker = Some(matchmaker.clone());

        // Daily forfeit sweep
        let scheduler = SweepScheduler::new(
            ForfeitSweep::new(self.lifecycle.clone(), offset),
            self.clock.clone(),
            self.config.sweep_hour,
            self.metrics.clone(),
        );
        let shutdown_rx_sweep = self.shutdown.subscribe();
        self.task_handles
            .push(tokio::spawn(scheduler.run(shutdown_rx_sweep)));

        // Metrics refresh
        let metrics = self.metrics.clone();
        let lifecycle = self.lifecycle.clone();
        let mm = matchmaker.clone();
        let period = Duration::from_secs(self.config.metrics_refresh_secs.max(1));
        let mut shutdown_rx_metrics = self.shutdown.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx_metrics.recv() => {
                        tracing::debug!("metrics refresh task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match mm.stats().await {
                            Ok(stats) => metrics.refresh(
                                &stats,
                                &lifecycle.stats(),
                                lifecycle.ledger().conflict_count(),
                            ),
                            Err(e) => tracing::debug!(error = %e, "matchmaker stats unavailable"),
                        }
                    }
                }
            }
        }));

        if self.config.enable_rpc {
            let rpc_state = RpcState {
                lifecycle: self.lifecycle.clone(),
                signup_grant: self.config.signup_grant(),
                media_base_url: self.config.media_base_url.clone(),
                registry: self.metrics.registry.clone(),
            };
            let rpc_server = RpcServer::new(self.config.rpc_port, rpc_state);
            self.spawn_server("rpc", rpc_server.start());
        }

        if self.config.enable_websocket {
            let ws_server = WebSocketServer::new(self.config.websocket_port, matchmaker);
            self.spawn_server("websocket", async move { ws_server.start().await });
        }

        tracing::info!(
            rpc = self.config.enable_rpc,
            rpc_port = self.config.rpc_port,
            websocket = self.config.enable_websocket,
            websocket_port = self.config.websocket_port,
            sweep_hour = self.config.sweep_hour,
            "DareDuel node started"
        );
        Ok(())
    }

    /// Run a server until it exits or shutdown begins.
    fn spawn_server<F, E>(&mut self, name: &'static str, server: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!(server = name, "server shutting down");
                }
                result = server => match result {
                    Ok(()) => tracing::info!(server = name, "server exited"),
                    Err(e) => tracing::error!(server = name, error = %e, "server failed"),
                },
            }
        }));
    }

    /// Copy current subsystem totals into the exported metrics.
    pub async fn refresh_metrics(&self) {
        let Some(mm) = &self.matchmaker else {
            return;
        };
        if let Ok(stats) = mm.stats().await {
            self.metrics.refresh(
                &stats,
                &self.lifecycle.stats(),
                self.lifecycle.ledger().conflict_count(),
            );
        }
    }

    /// Signal every task, wait for them and flush storage.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("DareDuel node stopping");

        // Final snapshot while the matchmaker can still answer.
        self.refresh_metrics().await;

        self.shutdown.shutdown();
        self.matchmaker = None;

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        if let Err(e) = self.store.env().force_sync() {
            tracing::warn!("LMDB force_sync failed: {e}");
        } else {
            tracing::info!("LMDB flushed to disk");
        }

        tracing::info!("DareDuel node stopped");
        Ok(())
    }
}

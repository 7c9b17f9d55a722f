use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] dareduel_ledger::LedgerError),

    #[error("battle error: {0}")]
    Battle(#[from] dareduel_battle::BattleError),

    #[error("store error: {0}")]
    Store(#[from] dareduel_store::StoreError),

    #[error("lmdb error: {0}")]
    Lmdb(#[from] dareduel_store_lmdb::LmdbError),

    #[error("matchmaker error: {0}")]
    Match(#[from] dareduel_matchmaking::MatchError),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC server error: {0}")]
    Rpc(String),

    #[error("WebSocket server error: {0}")]
    WebSocket(String),
}

impl From<dareduel_rpc::RpcError> for NodeError {
    fn from(e: dareduel_rpc::RpcError) -> Self {
        Self::Rpc(e.to_string())
    }
}

impl From<dareduel_websocket::WsError> for NodeError {
    fn from(e: dareduel_websocket::WsError) -> Self {
        Self::WebSocket(e.to_string())
    }
}

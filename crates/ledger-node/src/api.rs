//! HTTP control and inspection API for a running node.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{ContractAction, ContractOutcome, EscrowContract, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    error::{NodeError, NodeResult},
    node::Node,
    observer::ChainSnapshot,
};

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

#[derive(Deserialize)]
struct TxIn {
    from: String,
    to: String,
    amount: u64,
    /// Forward to peers instead of buffering locally.
    #[serde(default)]
    gossip: bool,
}

#[derive(Serialize, Deserialize)]
pub struct TxAccepted {
    pub accepted: bool,
    pub tx: Transaction,
    pub mined: Option<u64>,
    pub peers: usize,
}

#[derive(Serialize, Deserialize)]
pub struct MineResult {
    pub index: u64,
    pub nonce: u64,
    pub hash: String,
    pub tx_count: usize,
}

#[derive(Deserialize)]
struct ContractIn {
    buyer: String,
    seller: String,
    amount: u64,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        let status = match &err {
            NodeError::UnknownContract(_) => StatusCode::NOT_FOUND,
            NodeError::Chain(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(node: Node) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/pending", get(pending))
        .route("/tx", post(submit_tx))
        .route("/mine", post(mine))
        .route("/contracts", get(list_contracts).post(open_contract))
        .route("/contracts/{id}", get(get_contract))
        .route("/contracts/{id}/{action}", post(contract_action))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serve the API on `addr` until the process exits.
pub async fn serve(node: Node, addr: SocketAddr) -> NodeResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::Bind { addr, source })?;
    info!("ledger api listening on http://{addr}");
    axum::serve(listener, router(node)).await?;
    Ok(())
}

async fn chain(State(node): State<Node>) -> Json<ChainSnapshot> {
    Json(node.snapshot().await)
}

async fn head(State(node): State<Node>) -> Json<Head> {
    let height = node.chain_len().await.saturating_sub(1) as u64;
    Json(Head {
        height,
        hash: node.tip_hash().await,
    })
}

async fn pending(State(node): State<Node>) -> Json<Vec<Transaction>> {
    Json(node.pending().await)
}

async fn submit_tx(State(node): State<Node>, Json(tx): Json<TxIn>) -> ApiResult<TxAccepted> {
    let gossip = tx.gossip;
    let tx = Transaction::new(tx.from, tx.to, tx.amount);
    let (mined, peers) = if gossip {
        (None, node.gossip_transaction(tx.clone()).await)
    } else {
        let mined = node.on_transaction(tx.clone()).await?;
        (mined.map(|b| b.index), 0)
    };
    Ok(Json(TxAccepted {
        accepted: true,
        tx,
        mined,
        peers,
    }))
}

async fn mine(State(node): State<Node>) -> ApiResult<MineResult> {
    let block = node.mine_and_publish().await?;
    Ok(Json(MineResult {
        index: block.index,
        nonce: block.nonce,
        hash: block.hash,
        tx_count: block.transactions.len(),
    }))
}

async fn list_contracts(State(node): State<Node>) -> Json<Vec<EscrowContract>> {
    Json(node.contracts().await)
}

async fn open_contract(
    State(node): State<Node>,
    Json(input): Json<ContractIn>,
) -> ApiResult<EscrowContract> {
    if input.amount == 0 {
        return Err(ApiError::bad_request("amount must be positive"));
    }
    Ok(Json(
        node.open_contract(input.buyer, input.seller, input.amount)
            .await,
    ))
}

async fn get_contract(
    State(node): State<Node>,
    Path(id): Path<String>,
) -> ApiResult<EscrowContract> {
    node.contract(&id)
        .await
        .map(Json)
        .ok_or_else(|| NodeError::UnknownContract(id).into())
}

async fn contract_action(
    State(node): State<Node>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<ContractOutcome> {
    let action: ContractAction = action.parse().map_err(ApiError::bad_request)?;
    Ok(Json(node.perform_contract_action(&id, action).await?))
}

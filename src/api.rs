//! API privada da carteira.
//!
//! Servidor HTTP local em `port + 1`, fora do alcance do gossip. O
//! cliente de carteira constrói transações, consulta saídas não gastas e
//! saldos por endereço.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{Amount, NodeError, Result};
use tracing::info;

use crate::network;
use crate::node::Node;

#[derive(Debug, Deserialize)]
struct TransactionRequest {
    outputs: Vec<RequestedOutput>,
    #[serde(default)]
    fee: Amount,
}

#[derive(Debug, Deserialize)]
struct RequestedOutput {
    amount: Amount,
    address: String,
}

/// Arranca o servidor da carteira em `127.0.0.1:(porta do gossip + 1)`
///
/// # Errors
///
/// Retorna erro se o bind ou o servidor falharem
pub async fn serve(node: Node) -> Result<()> {
    let port = node.config().port + 1;
    let app = Router::new()
        .route("/transaction", post(add_transaction))
        .route("/unspent", get(unspent))
        .route("/balances", get(balances))
        .with_state(node);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| NodeError::Io(format!("wallet bind on {port}: {e}")))?;
    info!("💼 Wallet API listening on 127.0.0.1:{port}");

    axum::serve(listener, app)
        .await
        .map_err(|e| NodeError::Io(e.to_string()))
}

/// `POST /transaction`: constrói, assina, difunde
async fn add_transaction(
    State(node): State<Node>,
    Json(request): Json<TransactionRequest>,
) -> Json<Value> {
    let requested: Vec<(Amount, String)> = request
        .outputs
        .iter()
        .map(|output| (output.amount, output.address.clone()))
        .collect();

    // Snapshot-and-release: o broadcast acontece fora do lock
    let result = {
        let mut state = node.state();
        state
            .chain
            .create_transaction(node.keypair(), &requested, request.fee)
    };

    match result {
        Ok(tx) => {
            network::broadcast(&node, &json!({ "transaction": tx })).await;
            Json(json!({ "msg": "OK" }))
        }
        Err(NodeError::InsufficientFunds) => Json(json!({ "error": "Insufficient funds!" })),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

/// `GET /unspent`: despejo do conjunto de UTXOs
async fn unspent(State(node): State<Node>) -> Json<Value> {
    let utxos = node.state().chain.ledger().utxos().clone();
    Json(json!({ "unspent": utxos }))
}

/// `GET /balances`: soma por endereço
async fn balances(State(node): State<Node>) -> Json<Value> {
    let balances = node.state().chain.ledger().balances();
    Json(json!({ "balances": balances }))
}

//! Classificação e encaminhamento das mensagens do gossip.
//!
//! O payload é um objeto JSON com exatamente uma tag reconhecida, na
//! ordem de verificação: `peer`, `ping`, `request_blockchain`,
//! `transaction`, `block`. Payloads com mais de uma tag ou sem nenhuma
//! são descartados. Cada ligação transporta um pedido e no máximo uma
//! resposta.

use galena_core::{Block, BlockOutcome, Transaction};
use serde_json::{json, Value};
use shared::{NodeError, Result};
use tracing::{debug, info, warn};

use crate::network;
use crate::node::Node;

/// Tags reconhecidas, na ordem de verificação
const TAGS: [&str; 5] = [
    "peer",
    "ping",
    "request_blockchain",
    "transaction",
    "block",
];

/// Mensagem de gossip já classificada
#[derive(Debug)]
pub enum Payload {
    /// Um peer anuncia o seu URL; com `list_peers` pede a nossa lista
    Peer { url: String, list_peers: bool },
    /// Pedido de sinal de vida
    Ping,
    /// Pedido da cadeia principal completa
    RequestBlockchain,
    /// Transação propagada pela rede
    Transaction(Transaction),
    /// Bloco propagado pela rede
    Block(Block),
}

/// Classifica um payload pela tag presente.
///
/// # Errors
///
/// Retorna erro de decodificação se o payload não for um objeto, não
/// tiver nenhuma tag reconhecida, tiver mais de uma, ou se o corpo da
/// tag não desserializar
pub fn classify(value: &Value) -> Result<Payload> {
    let object = value
        .as_object()
        .ok_or_else(|| NodeError::Decode("payload is not an object".to_string()))?;

    let present: Vec<&str> = TAGS
        .iter()
        .filter(|tag| object.contains_key(**tag))
        .copied()
        .collect();

    let tag = match present.as_slice() {
        [] => {
            return Err(NodeError::Decode(format!(
                "no recognised tag in {:?}",
                object.keys().collect::<Vec<_>>()
            )))
        }
        [tag] => *tag,
        _ => {
            return Err(NodeError::Decode(format!(
                "multiple recognised tags: {present:?}"
            )))
        }
    };

    match tag {
        "peer" => {
            let url = object["peer"]
                .as_str()
                .ok_or_else(|| NodeError::Decode("peer URL is not a string".to_string()))?
                .to_string();
            let list_peers = object
                .get("list_peers")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(Payload::Peer { url, list_peers })
        }
        "ping" => Ok(Payload::Ping),
        "request_blockchain" => Ok(Payload::RequestBlockchain),
        "transaction" => {
            let tx = serde_json::from_value(object["transaction"].clone())?;
            Ok(Payload::Transaction(tx))
        }
        "block" => {
            let block = serde_json::from_value(object["block"].clone())?;
            Ok(Payload::Block(block))
        }
        _ => unreachable!("tag list is exhaustive"),
    }
}

/// Executa a ação de uma mensagem classificada e devolve a resposta a
/// enviar, se houver
pub async fn handle(node: &Node, payload: Payload) -> Option<Value> {
    match payload {
        Payload::Ping => Some(json!({ "pong": true })),

        Payload::RequestBlockchain => {
            let blocks = node.state().chain.blocks().to_vec();
            Some(json!({ "blocks": blocks }))
        }

        Payload::Peer { url, list_peers } => {
            let already_had = url == node.self_url() || node.has_peer(&url);
            network::add_peer(node, &url).await;

            let reply = list_peers.then(|| json!({ "peers": node.peers_snapshot() }));
            if !already_had {
                network::propagate(node, &url).await;
            }
            reply
        }

        Payload::Transaction(tx) => {
            let result = node.state().chain.submit_transaction(tx.clone());
            match result {
                Ok(()) => {
                    info!("💸 Accepted transaction from {}...", &tx.from[..10.min(tx.from.len())]);
                    network::broadcast(node, &json!({ "transaction": tx })).await;
                }
                Err(e) => debug!("Rejected transaction: {e}"),
            }
            None
        }

        Payload::Block(block) => {
            let outcome = {
                let mut state = node.state();
                let outcome = state.chain.handle_block(block.clone());
                if matches!(
                    outcome,
                    BlockOutcome::Extended | BlockOutcome::Reorganized
                ) {
                    // Sob o mutex: o minerador abandona a pesquisa atual
                    node.signal_tip_changed();
                }
                outcome
            };

            match outcome {
                BlockOutcome::Extended | BlockOutcome::Reorganized => {
                    info!("🧱 New chain tip: {}", node.chain_summary());
                    network::broadcast(node, &json!({ "block": block })).await;
                }
                BlockOutcome::Stashed => debug!("Stashed fork block {}", block.id),
                BlockOutcome::Dropped(reason) => {
                    warn!("Dropped block {}: {reason}", block.id);
                }
            }
            None
        }
    }
}

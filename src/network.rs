//! Overlay de gossip sobre TCP.
//!
//! Cada mensagem é um payload JSON numa única linha; a ligação fecha
//! depois de no máximo uma troca (um pedido, uma resposta). Peers que
//! recusam ligação são podados de forma preguiçosa na altura do envio;
//! não há heartbeat periódico.

use rand::seq::SliceRandom;
use serde_json::{json, Value};
use shared::{NodeError, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::node::Node;

/// Timeout de ligação e de espera por resposta
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Extrai `host:port` de um URL `tcp://host:port`
fn host_port(url: &str) -> &str {
    url.strip_prefix("tcp://").unwrap_or(url)
}

async fn connect(url: &str) -> Result<TcpStream> {
    timeout(IO_TIMEOUT, TcpStream::connect(host_port(url)))
        .await
        .map_err(|_| NodeError::Network(format!("timeout connecting to {url}")))?
        .map_err(|e| NodeError::Network(format!("connect to {url}: {e}")))
}

async fn write_value(stream: &mut TcpStream, value: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_value(stream: &mut TcpStream) -> Result<Value> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = timeout(IO_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| NodeError::Network("timeout waiting for payload".to_string()))??;
    if read == 0 {
        return Err(NodeError::Network("peer closed connection".to_string()));
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Abre uma ligação, envia um payload e fecha
pub async fn send_to(url: &str, value: &Value) -> Result<()> {
    let mut stream = connect(url).await?;
    write_value(&mut stream, value).await
}

/// Abre uma ligação, envia um pedido e espera por uma resposta
pub async fn request(url: &str, value: &Value) -> Result<Value> {
    let mut stream = connect(url).await?;
    write_value(&mut stream, value).await?;
    read_value(&mut stream).await
}

/// Tenta adicionar um peer: liga, envia `{ping}` e espera `{pong}`.
/// O próprio endereço é ignorado; falhas ficam no log e o peer fora do
/// conjunto.
pub async fn add_peer(node: &Node, url: &str) {
    if url == node.self_url() {
        // Não vale a pena ligar a nós próprios
        return;
    }

    match request(url, &json!({ "ping": true })).await {
        Ok(reply) if reply.get("pong").is_some() => {
            if node.add_peer_url(url) {
                info!("📡 Adding new peer: {url}");
            }
        }
        Ok(reply) => warn!("Peer {url} answered ping with {reply}"),
        Err(e) => debug!("Could not add peer {url}: {e}"),
    }
}

/// Anuncia um peer recém-aprendido a todos os outros
pub async fn propagate(node: &Node, new_url: &str) {
    for url in node.peers_snapshot() {
        if url == new_url {
            continue;
        }
        debug!("Sending {new_url} to {url}");
        if let Err(e) = send_to(&url, &json!({ "peer": new_url })).await {
            debug!("Propagation to {url} failed: {e}");
        }
    }
}

/// Envia um payload a todos os peers, podando os que recusarem ligação
pub async fn broadcast(node: &Node, value: &Value) {
    for url in node.peers_snapshot() {
        if let Err(e) = send_to(&url, value).await {
            warn!("🔌 Pruning unreachable peer {url}: {e}");
            node.remove_peer_url(&url);
        }
    }
}

/// Envia um pedido a um peer escolhido uniformemente ao acaso e devolve
/// a resposta
///
/// # Errors
///
/// `NoPeers` com o conjunto vazio; erros de transporte da única tentativa
pub async fn request_random(node: &Node, value: &Value) -> Result<Value> {
    let peers = node.peers_snapshot();
    let url = peers
        .choose(&mut rand::thread_rng())
        .ok_or(NodeError::NoPeers)?
        .clone();
    request(&url, value).await
}

/// Anuncia-se a um peer ao acaso e funde a lista de peers devolvida.
/// Em caso de recusa tenta outro peer, por ordem aleatória.
///
/// # Errors
///
/// `NoPeers` com o conjunto vazio; erro de rede se todos recusarem
pub async fn update_peers(node: &Node) -> Result<()> {
    let mut peers = node.peers_snapshot();
    if peers.is_empty() {
        return Err(NodeError::NoPeers);
    }
    peers.shuffle(&mut rand::thread_rng());

    let announce = json!({ "peer": node.self_url(), "list_peers": true });
    for url in &peers {
        match request(url, &announce).await {
            Ok(reply) => {
                if let Some(list) = reply.get("peers").and_then(Value::as_array) {
                    for peer in list.iter().filter_map(Value::as_str) {
                        if peer != node.self_url() && !node.has_peer(peer) {
                            add_peer(node, peer).await;
                        }
                    }
                }
                return Ok(());
            }
            Err(e) => debug!("Peer update via {url} failed, trying another: {e}"),
        }
    }

    Err(NodeError::Network(
        "all peers refused the peer-list request".to_string(),
    ))
}

/// Lê a lista inicial de peers: um URL por linha, aparado, linhas em
/// branco ignoradas, o próprio endereço removido
#[must_use]
pub fn load_bootstrap(path: &str, self_url: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != self_url)
            .map(String::from)
            .collect(),
        Err(e) => {
            warn!("Bootstrap file {path} not readable ({e}); starting with no peers");
            Vec::new()
        }
    }
}

/// Loop de aceitação do gossip na porta configurada
///
/// # Errors
///
/// Retorna erro apenas se o bind falhar
pub async fn serve(node: Node) -> Result<()> {
    let addr = format!("{}:{}", node.config().bind_address, node.config().port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| NodeError::Network(format!("bind {addr}: {e}")))?;
    info!("🌐 Gossip listening on {addr}");
    serve_on(node, listener).await
}

/// Loop de aceitação sobre um listener já ligado
pub async fn serve_on(node: Node, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, remote) = listener
            .accept()
            .await
            .map_err(|e| NodeError::Network(format!("accept: {e}")))?;

        let node = node.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&node, stream).await {
                // Erros de transporte e de decodificação morrem aqui
                debug!("Connection from {remote}: {e}");
            }
        });
    }
}

/// Uma ligação transporta um pedido e no máximo uma resposta
async fn handle_connection(node: &Node, mut stream: TcpStream) -> Result<()> {
    let value = read_value(&mut stream).await?;
    let payload = dispatch::classify(&value)?;

    if let Some(reply) = dispatch::handle(node, payload).await {
        write_value(&mut stream, &reply).await?;
    }
    Ok(())
}

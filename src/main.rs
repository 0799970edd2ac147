use clap::Parser;
use galena_core::{Block, Miner};
use rand::Rng;
use serde_json::{json, Value};
use shared::{KeyPair, NodeConfig, NodeError};
use tracing::{error, info, warn, Level};

mod api;
mod dispatch;
mod network;
mod node;

use node::Node;

#[derive(Parser)]
#[command(name = "galena")]
#[command(about = "Galena - minimal peer-to-peer cryptocurrency node")]
#[command(version)]
struct Cli {
    /// Run as the genesis node: fixed port, empty network tolerated,
    /// no blockchain fetch on startup
    #[arg(long)]
    gen: bool,

    /// Gossip port (default: 1234 with --gen, random 1025-9999 otherwise)
    #[arg(short, long)]
    port: Option<u16>,

    /// Proof-of-work difficulty in leading zero bits
    #[arg(long, default_value_t = 20)]
    difficulty: u32,

    /// Mining reward per block
    #[arg(long, default_value_t = 1000)]
    reward: u64,

    /// File with one bootstrap peer URL per line
    #[arg(long, default_value = "known_good.txt")]
    bootstrap_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> shared::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let port = cli.port.unwrap_or_else(|| {
        if cli.gen {
            1234
        } else {
            rand::thread_rng().gen_range(1025..=9999)
        }
    });

    let config = NodeConfig {
        genesis: cli.gen,
        port,
        bind_address: "0.0.0.0".to_string(),
        difficulty: cli.difficulty,
        mining_reward: cli.reward,
        bootstrap_file: cli.bootstrap_file,
    };

    // O par de chaves vive pelo tempo de vida do processo; nada persiste
    let keypair = KeyPair::generate();
    info!("🔑 Address: <{}...>", &keypair.address()[..10]);

    let miner = Miner::new(keypair.address().to_string());
    let node = Node::new(config, keypair, miner.preemption_latch());

    bootstrap_peers(&node).await;
    if !node.config().genesis {
        fetch_blockchain(&node).await;
    }

    let api_node = node.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_node).await {
            error!("Wallet API died: {e}");
        }
    });

    let miner_node = node.clone();
    let runtime = tokio::runtime::Handle::current();
    std::thread::spawn(move || mine_forever(&miner_node, &miner, &runtime));

    info!("🚀 Node up as {}", node.self_url());
    tokio::select! {
        result = network::serve(node.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal, stopping node");
            Ok(())
        }
    }
}

/// Lista inicial menos o próprio endereço, depois troca de listas com um
/// peer ao acaso
async fn bootstrap_peers(node: &Node) {
    for url in network::load_bootstrap(&node.config().bootstrap_file, node.self_url()) {
        node.add_peer_url(&url);
    }

    match network::update_peers(node).await {
        Ok(()) => info!("👥 Peers: {:?}", node.peers_snapshot()),
        Err(NodeError::NoPeers) if node.config().genesis => {
            info!("🌱 Genesis node doesn't have any peers. (OK)");
        }
        Err(e) => warn!("Peer discovery failed: {e}"),
    }
}

/// Sincronização de arranque: pede a cadeia a um peer ao acaso e adota-a
/// se for mais longa do que a local (vazia, num arranque a frio)
async fn fetch_blockchain(node: &Node) {
    let reply = match network::request_random(node, &json!({ "request_blockchain": true })).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Could not fetch blockchain: {e}");
            return;
        }
    };

    let blocks: Vec<Block> =
        match serde_json::from_value(reply.get("blocks").cloned().unwrap_or(Value::Null)) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Malformed blockchain reply: {e}");
                return;
            }
        };

    let adopted = node.state().chain.adopt_chain(blocks);
    match adopted {
        Ok(()) => info!("⛓️ Updated blockchain: {}", node.chain_summary()),
        Err(e) => info!("Keeping local chain: {e}"),
    }
}

/// Loop da thread de mineração: snapshot sob o mutex, pesquisa fora
/// dele, commit e broadcast no fim. A pesquisa é abandonada quando o
/// latch de preempção liga.
fn mine_forever(node: &Node, miner: &Miner, runtime: &tokio::runtime::Handle) {
    loop {
        // Assemble: snapshot da ponta, das pendentes e das taxas
        let (tip, pending, fees, params) = {
            let state = node.state();
            (
                state.chain.tip(),
                state.chain.pending().to_vec(),
                state.chain.pending_fees(),
                state.chain.params(),
            )
        };

        let mut candidate = miner.assemble(&tip, &pending, fees, params.mining_reward);
        if miner.search(&mut candidate, params.difficulty).is_none() {
            // Preempted: a ponta mudou, recomeça sobre a nova
            continue;
        }

        // Found: commit sob o mutex; se a ponta tiver mudado entretanto,
        // o candidato é abandonado como numa preempção
        let committed = node.state().chain.commit_mined(candidate.clone());
        if committed {
            info!("⛏️ Mined new block: {}", node.chain_summary());
            runtime.block_on(network::broadcast(node, &json!({ "block": candidate })));
        }
    }
}

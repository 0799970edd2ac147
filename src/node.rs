//! Estado partilhado do nó.
//!
//! Cadeia, ledger, pendentes e conjunto de peers vivem sob um único
//! mutex; todos os pontos de entrada (handlers de rede, minerador,
//! carteira) seguram um handle clonável. O latch `tip_changed` é a única
//! comunicação com a thread de mineração fora do mutex.

use galena_core::{Chain, ChainParams};
use shared::{KeyPair, NodeConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Estado guardado pelo mutex do nó
pub struct State {
    /// Motor de blockchain: cadeia principal, forks, ledger, pendentes
    pub chain: Chain,
    /// URLs dos peers conhecidos; o próprio nó nunca é membro
    pub peers: HashSet<String>,
}

/// Handle clonável para o estado partilhado do nó
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    tip_changed: Arc<AtomicBool>,
    keypair: KeyPair,
    config: NodeConfig,
    self_url: String,
}

impl Node {
    /// Cria o nó com o par de chaves gerado no arranque e o latch de
    /// preempção partilhado com o minerador
    #[must_use]
    pub fn new(config: NodeConfig, keypair: KeyPair, tip_changed: Arc<AtomicBool>) -> Self {
        let self_url = format!("tcp://{}:{}", config.bind_address, config.port);
        let params = ChainParams {
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    chain: Chain::new(params),
                    peers: HashSet::new(),
                }),
                tip_changed,
                keypair,
                config,
                self_url,
            }),
        }
    }

    /// Adquire o lock do estado partilhado. Nunca segurar através de I/O:
    /// tirar snapshot, largar, e só depois falar com a rede.
    pub fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("state mutex poisoned")
    }

    /// Liga o latch de preempção do minerador; chamado sob o mutex por
    /// qualquer handler que aceite um bloco remoto na ponta
    pub fn signal_tip_changed(&self) {
        self.inner.tip_changed.store(true, Ordering::SeqCst);
    }

    /// Par de chaves do nó
    #[must_use]
    pub fn keypair(&self) -> &KeyPair {
        &self.inner.keypair
    }

    /// Configuração do nó
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// URL com que o nó se anuncia aos peers
    #[must_use]
    pub fn self_url(&self) -> &str {
        &self.inner.self_url
    }

    /// Snapshot do conjunto de peers, para fan-out fora do lock
    #[must_use]
    pub fn peers_snapshot(&self) -> Vec<String> {
        self.state().peers.iter().cloned().collect()
    }

    /// Verifica se um peer já é conhecido
    #[must_use]
    pub fn has_peer(&self, url: &str) -> bool {
        self.state().peers.contains(url)
    }

    /// Regista um peer; devolve `true` se era desconhecido
    pub fn add_peer_url(&self, url: &str) -> bool {
        if url == self.self_url() {
            return false;
        }
        self.state().peers.insert(url.to_string())
    }

    /// Remove um peer que recusou ligação
    pub fn remove_peer_url(&self, url: &str) {
        self.state().peers.remove(url);
    }

    /// Resumo legível da cadeia, estilo `[4] 1a2b3<-4c5d6<-...`
    #[must_use]
    pub fn chain_summary(&self) -> String {
        let state = self.state();
        let blocks = state.chain.blocks();
        let hashes: Vec<String> = blocks
            .iter()
            .map(|b| b.hash().to_string()[..5].to_string())
            .collect();
        format!("[{}] {}", blocks.len(), hashes.join("<-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> Node {
        let keypair = KeyPair::generate();
        Node::new(
            NodeConfig::default(),
            keypair,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_self_is_never_a_peer() {
        let node = test_node();
        let self_url = node.self_url().to_string();

        assert!(!node.add_peer_url(&self_url));
        assert!(node.peers_snapshot().is_empty());
    }

    #[test]
    fn test_peer_set_membership() {
        let node = test_node();

        assert!(node.add_peer_url("tcp://10.0.0.1:4000"));
        assert!(!node.add_peer_url("tcp://10.0.0.1:4000"));
        assert!(node.has_peer("tcp://10.0.0.1:4000"));

        node.remove_peer_url("tcp://10.0.0.1:4000");
        assert!(!node.has_peer("tcp://10.0.0.1:4000"));
    }

    #[test]
    fn test_chain_summary_of_empty_chain() {
        let node = test_node();
        assert_eq!(node.chain_summary(), "[0] ");
    }
}

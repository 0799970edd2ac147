//! Tipos compartilhados entre os módulos do nó Galena

use serde::{Deserialize, Serialize};

/// Alias para endereço: chave pública Ed25519 em hexadecimal (64 chars)
pub type Address = String;

/// Alias para identificador único de saída de transação (UUID v4 textual)
pub type OutputId = String;

/// Alias para identificador único de bloco (UUID v4 textual)
pub type BlockId = String;

/// Alias para valor monetário
pub type Amount = u64;

/// Alias para timestamp Unix em segundos
pub type Timestamp = i64;

/// Configurações globais do nó
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Nó gênese: porta fixa, tolera rede vazia, não sincroniza no arranque
    pub genesis: bool,
    /// Porta do gossip; a API da carteira escuta em `port + 1`
    pub port: u16,
    /// Endereço de bind
    pub bind_address: String,
    /// Dificuldade do proof-of-work (bits zero iniciais exigidos)
    pub difficulty: u32,
    /// Recompensa por bloco minerado
    pub mining_reward: Amount,
    /// Ficheiro com a lista inicial de peers, um URL por linha
    pub bootstrap_file: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            genesis: false,
            port: 1234,
            bind_address: "0.0.0.0".to_string(),
            difficulty: 20,
            mining_reward: 1000,
            bootstrap_file: "known_good.txt".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::default();

        assert_eq!(config.port, 1234);
        assert_eq!(config.difficulty, 20);
        assert_eq!(config.mining_reward, 1000);
        assert!(!config.genesis);
    }
}

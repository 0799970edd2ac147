use serde::{Deserialize, Serialize};
use shared::{BlockId, Hash512, NodeError, Result, Timestamp};
use std::collections::HashSet;

use crate::canonical;
use crate::transaction::{Transaction, TxOutput};

/// Identificador sentinela do antecessor do primeiro bloco
pub const GENESIS_ID: &str = "0";

/// Bloco da cadeia.
///
/// O hash não é armazenado: deriva-se da imagem canônica sempre que é
/// preciso, de modo que nunca fica desatualizado durante uma promoção de
/// fork. Blocos referenciam o pai por `id` e por hash, nunca por ponteiro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Identificador fresco do bloco
    pub id: BlockId,
    /// Transações incluídas, em ordem
    pub transactions: Vec<Transaction>,
    /// Saída coinbase: recompensa + taxas para o minerador
    pub mine: TxOutput,
    /// Timestamp Unix em segundos
    pub timestamp: Timestamp,
    /// Identificador do bloco anterior (`"0"` para o primeiro)
    pub previous_block: BlockId,
    /// Hash do bloco anterior (`0` para o primeiro)
    pub previous_block_hash: Hash512,
    /// Nonce encontrado pela mineração
    pub nonce: u64,
}

impl Block {
    /// Calcula o hash SHA-512 da imagem canônica do bloco
    #[must_use]
    pub fn hash(&self) -> Hash512 {
        Hash512::sha512(&canonical::block_image(self))
    }

    /// Predicado de proof-of-work: `hash < 2^(512 - difficulty)`
    #[must_use]
    pub fn hash_complete(&self, difficulty: u32) -> bool {
        self.hash().meets_difficulty(difficulty)
    }

    /// Validação estrutural do bloco, independente do estado do ledger:
    /// proof-of-work, coinbase positiva, transações individualmente
    /// válidas e inputs disjuntos entre transações.
    ///
    /// # Errors
    ///
    /// Retorna erro se qualquer critério falhar
    pub fn validate_structure(&self, difficulty: u32) -> Result<()> {
        if !self.hash_complete(difficulty) {
            return Err(NodeError::InsufficientDifficulty);
        }

        if self.mine.amount == 0 {
            return Err(NodeError::InvalidBlock(
                "Zero value coinbase output".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for tx in &self.transactions {
            tx.validate_standalone()?;
            for input in &tx.inputs {
                if !seen.insert(input) {
                    return Err(NodeError::InvalidBlock(format!(
                        "Input {input} spent twice in block"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;
    use uuid::Uuid;

    fn empty_block(id: &str, parent: &str, parent_hash: Hash512) -> Block {
        Block {
            id: id.to_string(),
            transactions: vec![],
            mine: TxOutput::new(1000, "aa".repeat(32)),
            timestamp: 1_700_000_000,
            previous_block: parent.to_string(),
            previous_block_hash: parent_hash,
            nonce: 0,
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = empty_block("b1", GENESIS_ID, Hash512::zero());

        assert_eq!(block.hash(), block.hash());
        assert_eq!(block.hash(), block.clone().hash());
    }

    #[test]
    fn test_hash_covers_nonce() {
        let block = empty_block("b1", GENESIS_ID, Hash512::zero());
        let mut other = block.clone();
        other.nonce = 1;

        assert_ne!(block.hash(), other.hash());
    }

    #[test]
    fn test_hash_complete_at_zero_difficulty() {
        let block = empty_block("b1", GENESIS_ID, Hash512::zero());

        // Com dificuldade 0 qualquer hash serve; 512 é inatingível
        assert!(block.hash_complete(0));
        assert!(!block.hash_complete(512));
    }

    #[test]
    fn test_mining_finds_valid_nonce() {
        let mut block = empty_block("b1", GENESIS_ID, Hash512::zero());
        let difficulty = 8;

        for nonce in 0.. {
            block.nonce = nonce;
            if block.hash_complete(difficulty) {
                break;
            }
        }

        assert!(block.validate_structure(difficulty).is_ok());
    }

    #[test]
    fn test_duplicate_inputs_across_transactions_rejected() {
        let keypair = KeyPair::generate();
        let shared_input = Uuid::new_v4().to_string();

        let tx1 = Transaction::unsigned(
            vec![shared_input.clone()],
            vec![TxOutput::new(10, "bb".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(&keypair);
        let tx2 = Transaction::unsigned(
            vec![shared_input],
            vec![TxOutput::new(20, "cc".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(&keypair);

        let mut block = empty_block("b1", GENESIS_ID, Hash512::zero());
        block.transactions = vec![tx1, tx2];

        assert!(block.validate_structure(0).is_err());
    }

    #[test]
    fn test_zero_coinbase_rejected() {
        let mut block = empty_block("b1", GENESIS_ID, Hash512::zero());
        block.mine.amount = 0;

        assert!(block.validate_structure(0).is_err());
    }

    #[test]
    fn test_wire_round_trip() {
        let block = empty_block("b1", GENESIS_ID, Hash512::sha512(b"parent"));

        let encoded = serde_json::to_string(&block).unwrap();
        let decoded: Block = serde_json::from_str(&encoded).unwrap();

        assert_eq!(block, decoded);
        assert_eq!(block.hash(), decoded.hash());
    }
}

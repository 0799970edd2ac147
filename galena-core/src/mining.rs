use chrono::Utc;
use shared::{Address, Amount, Hash512};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::block::Block;
use crate::chain::Tip;
use crate::transaction::{Transaction, TxOutput};

/// Minerador local: monta candidatos sobre a ponta atual e procura o
/// nonce que satisfaz o proof-of-work.
///
/// O latch `tip_changed` é o único canal de preempção: quem aceitar um
/// bloco remoto na ponta liga o bit, e a pesquisa observa-o e limpa-o
/// entre nonces. Não há fila: qualquer número de mudanças de ponta exige
/// o mesmo abandono da pesquisa corrente.
pub struct Miner {
    address: Address,
    tip_changed: Arc<AtomicBool>,
}

impl Miner {
    /// Cria um minerador que recebe as recompensas em `address`
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tip_changed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle do latch de preempção, para os handlers da cadeia
    #[must_use]
    pub fn preemption_latch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.tip_changed)
    }

    /// Monta um bloco candidato: snapshot das transações pendentes e das
    /// taxas, coinbase fresca pagando `reward + fees` ao endereço local,
    /// timestamp de relógio de parede, nonce zero.
    #[must_use]
    pub fn assemble(
        &self,
        tip: &Tip,
        pending: &[Transaction],
        fees: Amount,
        reward: Amount,
    ) -> Block {
        Block {
            id: Uuid::new_v4().to_string(),
            transactions: pending.to_vec(),
            mine: TxOutput::new(reward + fees, self.address.clone()),
            timestamp: Utc::now().timestamp(),
            previous_block: tip.id.clone(),
            previous_block_hash: tip.hash,
            nonce: 0,
        }
    }

    /// Enumera nonces até satisfazer o predicado de proof-of-work.
    ///
    /// Devolve o hash encontrado, ou `None` se o latch de preempção foi
    /// ligado — observado (e limpo) a cada iteração, antes de calcular o
    /// hash seguinte.
    pub fn search(&self, block: &mut Block, difficulty: u32) -> Option<Hash512> {
        for nonce in 0..u64::MAX {
            if self.tip_changed.swap(false, Ordering::SeqCst) {
                return None;
            }

            block.nonce = nonce;
            let hash = block.hash();
            if hash.meets_difficulty(difficulty) {
                return Some(hash);
            }
        }
        None
    }
}

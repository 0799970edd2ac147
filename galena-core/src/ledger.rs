use serde::{Deserialize, Serialize};
use shared::{Address, Amount, NodeError, OutputId, Result};
use std::collections::{BTreeMap, HashSet};

use crate::block::Block;

/// Saída não gasta registada no ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub amount: Amount,
    pub address: Address,
}

/// Conjunto em memória das saídas não gastas.
///
/// As chaves vivem num `BTreeMap` para que a seleção de inputs seja
/// determinística dentro de um mesmo nó.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    utxos: BTreeMap<OutputId, Utxo>,
}

impl Ledger {
    /// Cria um ledger vazio
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aplica os efeitos de um bloco: remove os inputs de cada transação,
    /// insere as novas saídas e por fim a saída coinbase.
    ///
    /// # Panics
    ///
    /// A validação acontece antes da aplicação, portanto um input ausente
    /// aqui é uma violação de invariante e aborta o processo.
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            for input in &tx.inputs {
                assert!(
                    self.utxos.remove(input).is_some(),
                    "invariant violation: input {input} missing during block apply",
                );
            }
            for output in &tx.outputs {
                self.utxos.insert(
                    output.id.clone(),
                    Utxo {
                        amount: output.amount,
                        address: output.address.clone(),
                    },
                );
            }
        }

        self.utxos.insert(
            block.mine.id.clone(),
            Utxo {
                amount: block.mine.amount,
                address: block.mine.address.clone(),
            },
        );
    }

    /// Seleção gulosa de inputs: percorre as saídas de `owner` em ordem de
    /// chave, acumulando até cobrir `required`. Saídas em `excluded` (já
    /// prometidas por transações pendentes) são ignoradas.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` se o total disponível não chegar a `required`
    pub fn select_inputs(
        &self,
        owner: &str,
        required: Amount,
        excluded: &HashSet<OutputId>,
    ) -> Result<(Amount, Vec<OutputId>)> {
        let mut total = 0u64;
        let mut chosen = Vec::new();

        for (id, utxo) in &self.utxos {
            if utxo.address != owner || excluded.contains(id) {
                continue;
            }
            total = total
                .checked_add(utxo.amount)
                .ok_or_else(|| NodeError::InvalidTransaction("Input overflow".to_string()))?;
            chosen.push(id.clone());
            if total >= required {
                return Ok((total, chosen));
            }
        }

        Err(NodeError::InsufficientFunds)
    }

    /// Soma das saídas pertencentes a um endereço
    #[must_use]
    pub fn balance_of(&self, address: &str) -> Amount {
        self.utxos
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    /// Saldo por endereço, para a API da carteira
    #[must_use]
    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        let mut balances: BTreeMap<Address, Amount> = BTreeMap::new();
        for utxo in self.utxos.values() {
            *balances.entry(utxo.address.clone()).or_default() += utxo.amount;
        }
        balances
    }

    /// Soma de todas as saídas não gastas
    #[must_use]
    pub fn total_amount(&self) -> Amount {
        self.utxos.values().map(|utxo| utxo.amount).sum()
    }

    /// Verifica se uma saída existe
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.utxos.contains_key(id)
    }

    /// Obtém uma saída não gasta
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Utxo> {
        self.utxos.get(id)
    }

    /// Todas as saídas não gastas, para a API da carteira
    #[must_use]
    pub const fn utxos(&self) -> &BTreeMap<OutputId, Utxo> {
        &self.utxos
    }

    /// Número de saídas não gastas
    #[must_use]
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Verifica se o conjunto está vazio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::GENESIS_ID;
    use crate::transaction::{Transaction, TxOutput};
    use shared::{Hash512, KeyPair};

    fn block_with(transactions: Vec<Transaction>, mine: TxOutput) -> Block {
        Block {
            id: "b1".to_string(),
            transactions,
            mine,
            timestamp: 0,
            previous_block: GENESIS_ID.to_string(),
            previous_block_hash: Hash512::zero(),
            nonce: 0,
        }
    }

    #[test]
    fn test_apply_block_inserts_coinbase() {
        let mut ledger = Ledger::new();
        let mine = TxOutput::new(1000, "aa".repeat(32));
        let mine_id = mine.id.clone();

        ledger.apply_block(&block_with(vec![], mine));

        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&mine_id));
        assert_eq!(ledger.balance_of(&"aa".repeat(32)), 1000);
    }

    #[test]
    fn test_apply_block_spends_inputs_and_creates_outputs() {
        let keypair = KeyPair::generate();
        let mut ledger = Ledger::new();

        // Bloco 1 cria a saída que o bloco 2 gasta
        let mine1 = TxOutput::new(1000, keypair.address().to_string());
        let spent_id = mine1.id.clone();
        ledger.apply_block(&block_with(vec![], mine1));

        let tx = Transaction::unsigned(
            vec![spent_id.clone()],
            vec![TxOutput::new(900, "bb".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(&keypair);
        let out_id = tx.outputs[0].id.clone();

        let mine2 = TxOutput::new(1100, keypair.address().to_string());
        let mut block2 = block_with(vec![tx], mine2);
        block2.id = "b2".to_string();
        ledger.apply_block(&block2);

        // Input consumido, output e coinbase presentes
        assert!(!ledger.contains(&spent_id));
        assert!(ledger.contains(&out_id));
        assert_eq!(ledger.balance_of(&"bb".repeat(32)), 900);
    }

    #[test]
    fn test_amounts_are_conserved() {
        // Σ ledger == blocos × recompensa, com as taxas conservadas
        let keypair = KeyPair::generate();
        let reward = 1000u64;
        let mut ledger = Ledger::new();

        let mine1 = TxOutput::new(reward, keypair.address().to_string());
        let input_id = mine1.id.clone();
        ledger.apply_block(&block_with(vec![], mine1));
        assert_eq!(ledger.total_amount(), reward);

        // Gasta 1000: 900 transferidos, 100 de taxa, coinbase 1000 + 100
        let tx = Transaction::unsigned(
            vec![input_id],
            vec![TxOutput::new(900, "bb".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(&keypair);
        let mut block2 = block_with(vec![tx], TxOutput::new(reward + 100, keypair.address().to_string()));
        block2.id = "b2".to_string();
        ledger.apply_block(&block2);

        assert_eq!(ledger.total_amount(), 2 * reward);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_missing_input_aborts() {
        let mut ledger = Ledger::new();
        let tx = Transaction::unsigned(
            vec!["fantasma".to_string()],
            vec![TxOutput::new(10, "bb".repeat(32))],
            "aa".repeat(32),
        );

        ledger.apply_block(&block_with(vec![tx], TxOutput::new(1000, "cc".repeat(32))));
    }

    #[test]
    fn test_select_inputs_greedy() {
        let mut ledger = Ledger::new();
        let owner = "aa".repeat(32);
        for amount in [300u64, 400, 500] {
            let mine = TxOutput::new(amount, owner.clone());
            let mut block = block_with(vec![], mine);
            block.id = format!("b{amount}");
            ledger.apply_block(&block);
        }

        let (total, chosen) = ledger
            .select_inputs(&owner, 600, &HashSet::new())
            .unwrap();

        assert!(total >= 600);
        assert!(chosen.len() < 3);

        // Seleção determinística dentro do mesmo nó
        let (total2, chosen2) = ledger
            .select_inputs(&owner, 600, &HashSet::new())
            .unwrap();
        assert_eq!((total, &chosen), (total2, &chosen2));
    }

    #[test]
    fn test_select_inputs_insufficient_funds() {
        let mut ledger = Ledger::new();
        let owner = "aa".repeat(32);
        ledger.apply_block(&block_with(vec![], TxOutput::new(100, owner.clone())));

        let result = ledger.select_inputs(&owner, 200, &HashSet::new());
        assert!(matches!(result, Err(NodeError::InsufficientFunds)));
    }

    #[test]
    fn test_select_inputs_respects_exclusions() {
        let mut ledger = Ledger::new();
        let owner = "aa".repeat(32);
        let mine = TxOutput::new(100, owner.clone());
        let only_id = mine.id.clone();
        ledger.apply_block(&block_with(vec![], mine));

        let excluded: HashSet<OutputId> = [only_id].into_iter().collect();
        let result = ledger.select_inputs(&owner, 50, &excluded);
        assert!(matches!(result, Err(NodeError::InsufficientFunds)));
    }

    #[test]
    fn test_balances_by_address() {
        let mut ledger = Ledger::new();
        let alice = "aa".repeat(32);
        let bob = "bb".repeat(32);
        for (i, (amount, who)) in [(100u64, &alice), (200, &alice), (50, &bob)]
            .into_iter()
            .enumerate()
        {
            let mut block = block_with(vec![], TxOutput::new(amount, who.clone()));
            block.id = format!("b{i}");
            ledger.apply_block(&block);
        }

        let balances = ledger.balances();
        assert_eq!(balances[&alice], 300);
        assert_eq!(balances[&bob], 50);
    }
}

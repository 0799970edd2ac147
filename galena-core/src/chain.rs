use serde::{Deserialize, Serialize};
use shared::{Address, Amount, BlockId, Hash512, KeyPair, NodeError, OutputId, Result};
use std::collections::HashSet;

use crate::block::{Block, GENESIS_ID};
use crate::ledger::Ledger;
use crate::transaction::{Transaction, TxOutput};

/// Um segmento de fork: sequência não vazia de blocos encadeados por id,
/// validados mas fora da cadeia principal. Cada segmento guarda as suas
/// próprias cópias dos blocos.
pub type Segment = Vec<Block>;

/// Parâmetros de consenso da rede
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChainParams {
    /// Dificuldade do proof-of-work (bits zero iniciais)
    pub difficulty: u32,
    /// Recompensa por bloco minerado
    pub mining_reward: Amount,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            difficulty: 20,
            mining_reward: 1000,
        }
    }
}

/// Ponta atual da cadeia principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
    pub id: BlockId,
    pub hash: Hash512,
    pub height: usize,
}

/// Resultado de `handle_block`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Estendeu a ponta da cadeia principal
    Extended,
    /// Entrou no pool de perdedores e promoveu um fork mais longo
    Reorganized,
    /// Guardado no pool de perdedores à espera de mais blocos
    Stashed,
    /// Descartado
    Dropped(&'static str),
}

/// Estado partilhado do motor de blockchain: cadeia principal, pool de
/// segmentos perdedores, ledger de UTXOs, transações pendentes e taxas
/// acumuladas. Uma única instância vive sob o mutex do nó.
#[derive(Debug)]
pub struct Chain {
    main: Vec<Block>,
    losers: Vec<Segment>,
    ledger: Ledger,
    pending: Vec<Transaction>,
    pending_fees: Amount,
    params: ChainParams,
}

impl Chain {
    /// Cria uma cadeia vazia
    #[must_use]
    pub fn new(params: ChainParams) -> Self {
        Self {
            main: Vec::new(),
            losers: Vec::new(),
            ledger: Ledger::new(),
            pending: Vec::new(),
            pending_fees: 0,
            params,
        }
    }

    /// Parâmetros de consenso
    #[must_use]
    pub const fn params(&self) -> ChainParams {
        self.params
    }

    /// Ponta atual, com sentinela `("0", 0, 0)` para a cadeia vazia
    #[must_use]
    pub fn tip(&self) -> Tip {
        self.main.last().map_or_else(
            || Tip {
                id: GENESIS_ID.to_string(),
                hash: Hash512::zero(),
                height: 0,
            },
            |block| Tip {
                id: block.id.clone(),
                hash: block.hash(),
                height: self.main.len(),
            },
        )
    }

    /// Altura atual da cadeia principal
    #[must_use]
    pub fn height(&self) -> usize {
        self.main.len()
    }

    /// Blocos da cadeia principal
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.main
    }

    /// Segmentos do pool de perdedores
    #[must_use]
    pub fn losers(&self) -> &[Segment] {
        &self.losers
    }

    /// Ledger de saídas não gastas
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Transações pendentes de inclusão
    #[must_use]
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Total de taxas das transações pendentes
    #[must_use]
    pub const fn pending_fees(&self) -> Amount {
        self.pending_fees
    }

    /// Processa um bloco recebido da rede.
    ///
    /// 1. Sem proof-of-work válido, descarta.
    /// 2. Se encadeia na ponta e as transações validam contra o ledger,
    ///    aplica e estende a cadeia principal.
    /// 3. Senão, se a estrutura for válida isoladamente, entra na
    ///    resolução de forks.
    /// 4. Caso contrário, descarta.
    pub fn handle_block(&mut self, block: Block) -> BlockOutcome {
        if !block.hash_complete(self.params.difficulty) {
            return BlockOutcome::Dropped("proof-of-work incompleto");
        }

        if self.main.iter().any(|b| b.id == block.id) {
            return BlockOutcome::Dropped("bloco duplicado");
        }

        let tip = self.tip();
        if block.previous_block_hash == tip.hash
            && validate_block_in(&self.params, &self.ledger, &block).is_ok()
        {
            self.extend_main(block);
            return BlockOutcome::Extended;
        }

        // Validação provisória: estrutura e assinaturas apenas, sem
        // consultar o ledger. O bloco pode pertencer a um fork que ainda
        // não conseguimos reconstruir por inteiro.
        if block.validate_structure(self.params.difficulty).is_ok() {
            return self.resolve_fork(block);
        }

        BlockOutcome::Dropped("transações inválidas")
    }

    /// Regista uma transação vinda da rede no pool de pendentes.
    ///
    /// # Errors
    ///
    /// Retorna erro se a assinatura não conferir, se algum input não
    /// existir ou não pertencer ao remetente, se a taxa for negativa ou
    /// se um input já estiver prometido por outra transação pendente
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<()> {
        tx.validate_standalone()?;
        let fee = self.transaction_fee(&tx)?;

        let pledged: HashSet<&OutputId> =
            self.pending.iter().flat_map(|t| t.inputs.iter()).collect();
        if tx.inputs.iter().any(|input| pledged.contains(input)) {
            return Err(NodeError::InvalidTransaction(
                "Input already pledged by a pending transaction".to_string(),
            ));
        }

        self.pending_fees = self
            .pending_fees
            .checked_add(fee)
            .ok_or_else(|| NodeError::InvalidTransaction("Fee overflow".to_string()))?;
        self.pending.push(tx);
        Ok(())
    }

    /// Constrói, assina e regista uma transação da carteira local.
    ///
    /// Seleciona inputs do próprio endereço ignorando os já prometidos
    /// por pendentes; o troco volta para o remetente como saída extra.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` se o saldo disponível não cobrir valor + taxa
    pub fn create_transaction(
        &mut self,
        keypair: &KeyPair,
        requested: &[(Amount, Address)],
        fee: Amount,
    ) -> Result<Transaction> {
        if requested.is_empty() {
            return Err(NodeError::InvalidTransaction("No outputs".to_string()));
        }

        let mut amount = 0u64;
        for (value, _) in requested {
            if *value == 0 {
                return Err(NodeError::InvalidTransaction(
                    "Zero value output".to_string(),
                ));
            }
            amount = amount
                .checked_add(*value)
                .ok_or_else(|| NodeError::InvalidTransaction("Output overflow".to_string()))?;
        }
        let required = amount
            .checked_add(fee)
            .ok_or_else(|| NodeError::InvalidTransaction("Fee overflow".to_string()))?;

        let pledged: HashSet<OutputId> = self
            .pending
            .iter()
            .flat_map(|t| t.inputs.iter().cloned())
            .collect();
        let (total, inputs) = self
            .ledger
            .select_inputs(keypair.address(), required, &pledged)?;

        let mut outputs: Vec<TxOutput> = requested
            .iter()
            .map(|(value, address)| TxOutput::new(*value, address.clone()))
            .collect();
        let change = total - required;
        if change > 0 {
            outputs.push(TxOutput::new(change, keypair.address().to_string()));
        }

        let tx = Transaction::unsigned(inputs, outputs, keypair.address().to_string())
            .sign(keypair);

        self.pending.push(tx.clone());
        self.pending_fees += fee;
        Ok(tx)
    }

    /// Compromete um bloco minerado localmente. Devolve `false` se a
    /// ponta mudou entre a última observação do latch e a aquisição do
    /// lock; nesse caso o bloco é abandonado.
    pub fn commit_mined(&mut self, block: Block) -> bool {
        if block.previous_block_hash != self.tip().hash {
            return false;
        }
        self.extend_main(block);
        true
    }

    /// Substitui a cadeia local pela recebida no arranque, se for
    /// estritamente mais longa e inteiramente válida.
    ///
    /// # Errors
    ///
    /// Retorna erro se a cadeia recebida não for mais longa, tiver
    /// encadeamento quebrado ou blocos inválidos
    pub fn adopt_chain(&mut self, blocks: Vec<Block>) -> Result<()> {
        if blocks.len() <= self.main.len() {
            return Err(NodeError::InvalidBlock(
                "Received chain is not longer".to_string(),
            ));
        }

        let mut ledger = Ledger::new();
        let mut prev_id = GENESIS_ID.to_string();
        let mut prev_hash = Hash512::zero();

        for block in &blocks {
            if block.previous_block != prev_id || block.previous_block_hash != prev_hash {
                return Err(NodeError::InvalidBlock("Broken chain linkage".to_string()));
            }
            validate_block_in(&self.params, &ledger, block)?;
            ledger.apply_block(block);
            prev_id = block.id.clone();
            prev_hash = block.hash();
        }

        self.main = blocks;
        self.ledger = ledger;
        self.evict_stale_pending();
        self.prune_contained_segments();
        Ok(())
    }

    // --- internals -------------------------------------------------------

    fn extend_main(&mut self, block: Block) {
        self.ledger.apply_block(&block);
        self.main.push(block);
        self.evict_stale_pending();
        self.prune_contained_segments();
    }

    fn resolve_fork(&mut self, block: Block) -> BlockOutcome {
        self.add_to_losers(block);
        self.coalesce();

        let mut promoted = false;
        while self.try_promote() {
            promoted = true;
        }

        if promoted {
            self.prune_contained_segments();
            BlockOutcome::Reorganized
        } else {
            BlockOutcome::Stashed
        }
    }

    /// Insere `[B]` e, para cada segmento existente, as extensões
    /// `S ⧺ [B]` e `[B] ⧺ S` quando os ids encadeiam. Os originais são
    /// mantidos para que blocos futuros ainda os possam estender.
    fn add_to_losers(&mut self, block: Block) {
        let mut additions: Vec<Segment> = vec![vec![block.clone()]];

        for segment in &self.losers {
            let last = segment.last().expect("segments are non-empty");
            if block.previous_block == last.id {
                let mut extended = segment.clone();
                extended.push(block.clone());
                additions.push(extended);
            }

            let first = segment.first().expect("segments are non-empty");
            if first.previous_block == block.id {
                let mut extended = vec![block.clone()];
                extended.extend(segment.iter().cloned());
                additions.push(extended);
            }
        }

        for segment in additions {
            self.insert_segment(segment);
        }
    }

    /// Concatena pares de segmentos encadeados até ao ponto fixo
    fn coalesce(&mut self) {
        loop {
            let mut additions: Vec<Segment> = Vec::new();

            for s in &self.losers {
                for t in &self.losers {
                    let s_last = s.last().expect("segments are non-empty");
                    let t_first = t.first().expect("segments are non-empty");
                    if s_last.id == t_first.previous_block {
                        let mut joined = s.clone();
                        joined.extend(t.iter().cloned());
                        additions.push(joined);
                    }
                }
            }

            let before = self.losers.len();
            for segment in additions {
                self.insert_segment(segment);
            }
            if self.losers.len() == before {
                return;
            }
        }
    }

    /// Tenta promover um segmento que alcance estritamente mais longe do
    /// que o sufixo atual da cadeia principal a partir do mesmo pai.
    /// Empate de comprimento mantém a cadeia atual.
    fn try_promote(&mut self) -> bool {
        let height = self.main.len();

        for index in 0..self.losers.len() {
            let segment = &self.losers[index];
            if segment.len() < 2 {
                continue;
            }

            let parent_id = &segment[0].previous_block;
            let Some(parent_index) = self.main.iter().position(|b| &b.id == parent_id) else {
                continue;
            };

            let current_suffix = height - parent_index - 1;
            if segment.len() <= current_suffix {
                continue;
            }

            let segment = self.losers.remove(index);
            let displaced = self.main.split_off(parent_index + 1);
            self.main.extend(segment);
            if !displaced.is_empty() {
                self.insert_segment(displaced);
            }

            // Reconstrução do ledger a partir do ponto de divergência:
            // reaplicar a nova cadeia principal desde o início é a forma
            // simples de manter as taxas conservadas.
            self.rebuild_ledger();
            self.evict_stale_pending();
            return true;
        }

        false
    }

    /// Insere um segmento no pool, descartando duplicados e sequências
    /// com ids repetidos (um ciclo de ids tornaria `coalesce` divergente)
    fn insert_segment(&mut self, segment: Segment) {
        let mut seen = HashSet::new();
        if !segment.iter().all(|b| seen.insert(&b.id)) {
            return;
        }

        let duplicate = self.losers.iter().any(|existing| {
            existing.len() == segment.len()
                && existing
                    .iter()
                    .zip(&segment)
                    .all(|(a, b)| a.id == b.id)
        });
        if !duplicate {
            self.losers.push(segment);
        }
    }

    /// Remove do pool os segmentos cujos blocos já figuram contíguos na
    /// cadeia principal (um segmento nunca pode ser prefixo da principal)
    fn prune_contained_segments(&mut self) {
        let main_ids: Vec<&BlockId> = self.main.iter().map(|b| &b.id).collect();
        self.losers.retain(|segment| {
            let segment_ids: Vec<&BlockId> = segment.iter().map(|b| &b.id).collect();
            !main_ids
                .windows(segment_ids.len())
                .any(|window| window == segment_ids.as_slice())
        });
    }

    fn rebuild_ledger(&mut self) {
        let mut ledger = Ledger::new();
        for block in &self.main {
            ledger.apply_block(block);
        }
        self.ledger = ledger;
    }

    /// Taxa de uma transação contra o ledger atual, validando existência
    /// e posse dos inputs
    fn transaction_fee(&self, tx: &Transaction) -> Result<Amount> {
        let mut input_total = 0u64;
        for input in &tx.inputs {
            let utxo = self
                .ledger
                .get(input)
                .ok_or_else(|| NodeError::UtxoNotFound(input.clone()))?;
            if utxo.address != tx.from {
                return Err(NodeError::InvalidTransaction(format!(
                    "Input {input} not owned by sender"
                )));
            }
            input_total = input_total
                .checked_add(utxo.amount)
                .ok_or_else(|| NodeError::InvalidTransaction("Input overflow".to_string()))?;
        }

        input_total
            .checked_sub(tx.output_total()?)
            .ok_or_else(|| NodeError::InvalidTransaction("Negative fee".to_string()))
    }

    /// Mantém no pool apenas transações ainda válidas contra o ledger
    /// ("válida, ainda não incluída") e recalcula o total de taxas
    fn evict_stale_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let mut fees = 0u64;
        let mut kept = Vec::with_capacity(pending.len());

        for tx in pending {
            if let Ok(fee) = self.transaction_fee(&tx) {
                fees = fees.saturating_add(fee);
                kept.push(tx);
            }
        }

        self.pending = kept;
        self.pending_fees = fees;
    }
}

/// Validação completa de um bloco contra um ledger: estrutura, inputs
/// existentes e pertencentes aos remetentes, taxas não negativas e
/// coinbase igual a recompensa + taxas.
fn validate_block_in(params: &ChainParams, ledger: &Ledger, block: &Block) -> Result<()> {
    block.validate_structure(params.difficulty)?;

    let mut fees = 0u64;
    for tx in &block.transactions {
        let mut input_total = 0u64;
        for input in &tx.inputs {
            let utxo = ledger
                .get(input)
                .ok_or_else(|| NodeError::UtxoNotFound(input.clone()))?;
            if utxo.address != tx.from {
                return Err(NodeError::InvalidTransaction(format!(
                    "Input {input} not owned by sender"
                )));
            }
            input_total = input_total
                .checked_add(utxo.amount)
                .ok_or_else(|| NodeError::InvalidTransaction("Input overflow".to_string()))?;
        }

        let fee = input_total
            .checked_sub(tx.output_total()?)
            .ok_or_else(|| NodeError::InvalidTransaction("Negative fee".to_string()))?;
        fees = fees
            .checked_add(fee)
            .ok_or_else(|| NodeError::InvalidTransaction("Fee overflow".to_string()))?;
    }

    let expected = params
        .mining_reward
        .checked_add(fees)
        .ok_or_else(|| NodeError::InvalidBlock("Reward overflow".to_string()))?;
    if block.mine.amount != expected {
        return Err(NodeError::InvalidBlock(format!(
            "Coinbase pays {} instead of {expected}",
            block.mine.amount
        )));
    }

    Ok(())
}

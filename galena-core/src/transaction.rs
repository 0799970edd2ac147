use serde::{Deserialize, Serialize};
use shared::{verify_signature, Address, Amount, KeyPair, NodeError, OutputId, Result};
use std::collections::HashSet;
use uuid::Uuid;

use crate::canonical;

/// Saída de transação: um UTXO `(id, amount, address)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Identificador único da saída
    pub id: OutputId,
    /// Valor da saída
    pub amount: Amount,
    /// Endereço do destinatário
    pub address: Address,
}

impl TxOutput {
    /// Cria uma nova saída com identificador fresco
    #[must_use]
    pub fn new(amount: Amount, address: Address) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            address,
        }
    }
}

/// Transação de transferência de valor.
///
/// Os `inputs` referenciam saídas não gastas pertencentes a `from`; a
/// sua ordem é fixada na construção e preservada no wire, de modo que a
/// assinatura seja determinística.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Saídas gastas por esta transação
    pub inputs: Vec<OutputId>,
    /// Novas saídas criadas
    pub outputs: Vec<TxOutput>,
    /// Endereço do remetente (chave pública em hex)
    pub from: Address,
    /// Assinatura Ed25519 destacada, em hex, sobre a imagem sem este campo
    pub signature: String,
}

impl Transaction {
    /// Cria uma transação ainda não assinada
    #[must_use]
    pub fn unsigned(inputs: Vec<OutputId>, outputs: Vec<TxOutput>, from: Address) -> Self {
        Self {
            inputs,
            outputs,
            from,
            signature: String::new(),
        }
    }

    /// Assina a transação com o par de chaves do nó
    #[must_use]
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.signature = keypair.sign(&canonical::signing_image(&self));
        self
    }

    /// Verifica a assinatura sob `from` interpretado como chave pública.
    /// Devolve `false` para qualquer falha de formato ou de assinatura.
    #[must_use]
    pub fn verify(&self) -> bool {
        verify_signature(&self.from, &canonical::signing_image(self), &self.signature)
    }

    /// Soma dos valores das saídas
    ///
    /// # Errors
    ///
    /// Retorna erro se a soma transbordar
    pub fn output_total(&self) -> Result<Amount> {
        let mut total = 0u64;
        for output in &self.outputs {
            total = total.checked_add(output.amount).ok_or_else(|| {
                NodeError::InvalidTransaction("Output value overflow".to_string())
            })?;
        }
        Ok(total)
    }

    /// Validação estrutural, independente do estado do ledger
    ///
    /// # Errors
    ///
    /// Retorna erro se a transação violar os critérios básicos: inputs ou
    /// outputs vazios, inputs duplicados, saída de valor zero, overflow
    pub fn validate_basic(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(NodeError::InvalidTransaction(
                "Empty inputs or outputs".to_string(),
            ));
        }

        let distinct: HashSet<&OutputId> = self.inputs.iter().collect();
        if distinct.len() != self.inputs.len() {
            return Err(NodeError::InvalidTransaction(
                "Duplicate inputs".to_string(),
            ));
        }

        for output in &self.outputs {
            if output.amount == 0 {
                return Err(NodeError::InvalidTransaction(
                    "Zero value output".to_string(),
                ));
            }
        }

        self.output_total()?;

        Ok(())
    }

    /// Validação completa de uma transação isolada: estrutura e assinatura.
    /// O estado do ledger (existência e posse dos inputs) fica a cargo da
    /// cadeia.
    ///
    /// # Errors
    ///
    /// Retorna erro se a estrutura for inválida ou a assinatura não conferir
    pub fn validate_standalone(&self) -> Result<()> {
        self.validate_basic()?;
        if !self.verify() {
            return Err(NodeError::InvalidSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_transaction(keypair: &KeyPair) -> Transaction {
        Transaction::unsigned(
            vec!["input-1".to_string()],
            vec![TxOutput::new(900, "bb".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(keypair)
    }

    #[test]
    fn test_sign_then_verify() {
        let keypair = KeyPair::generate();
        let tx = signed_transaction(&keypair);

        assert!(tx.verify());
        assert!(tx.validate_standalone().is_ok());
    }

    #[test]
    fn test_mutation_after_signing_fails_verification() {
        let keypair = KeyPair::generate();
        let mut tx = signed_transaction(&keypair);

        tx.outputs[0].amount += 1;
        assert!(!tx.verify());
    }

    #[test]
    fn test_foreign_sender_fails_verification() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let mut tx = signed_transaction(&keypair);

        tx.from = other.address().to_string();
        assert!(!tx.verify());
    }

    #[test]
    fn test_zero_value_output_rejected() {
        let keypair = KeyPair::generate();
        let tx = Transaction::unsigned(
            vec!["input-1".to_string()],
            vec![TxOutput::new(0, "bb".repeat(32))],
            keypair.address().to_string(),
        )
        .sign(&keypair);

        assert!(tx.validate_basic().is_err());
    }

    #[test]
    fn test_duplicate_inputs_rejected() {
        let keypair = KeyPair::generate();
        let tx = Transaction::unsigned(
            vec!["input-1".to_string(), "input-1".to_string()],
            vec![TxOutput::new(10, "bb".repeat(32))],
            keypair.address().to_string(),
        );

        assert!(tx.validate_basic().is_err());
    }

    #[test]
    fn test_empty_transaction_rejected() {
        let tx = Transaction::unsigned(vec![], vec![], "aa".repeat(32));
        assert!(tx.validate_basic().is_err());
    }

    #[test]
    fn test_wire_round_trip() {
        let keypair = KeyPair::generate();
        let tx = signed_transaction(&keypair);

        let encoded = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&encoded).unwrap();

        assert_eq!(tx, decoded);
        assert!(decoded.verify());
    }
}

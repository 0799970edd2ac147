//! Imagem canônica de blocos e transações.
//!
//! A imagem é o array de bytes determinístico sobre o qual se calcula o
//! hash de proof-of-work e a assinatura Ed25519. Qualquer nó honesto
//! deriva exatamente os mesmos bytes, por isso a gramática é fixa:
//!
//! - objetos emitem os campos em ordem ascendente de nome: `{a:1,b:2}`
//! - sequências: `[v1,v2]`
//! - inteiros em base 10 (hashes incluídos, como inteiros de 512 bits)
//! - strings e byte-strings na sua forma textual hex/uuid, sem aspas
//!
//! O campo `hash` de um bloco e o campo `signature` de uma transação a
//! assinar são omitidos da respetiva imagem.

use crate::block::Block;
use crate::transaction::{Transaction, TxOutput};

/// Imagem canônica de um bloco, sem o campo `hash`
#[must_use]
pub fn block_image(block: &Block) -> Vec<u8> {
    let mut out = String::new();
    out.push('{');
    out.push_str(&format!("id:{},", block.id));
    out.push_str("mine:");
    write_output(&mut out, &block.mine);
    out.push_str(&format!(",nonce:{},", block.nonce));
    out.push_str(&format!("previous_block:{},", block.previous_block));
    out.push_str(&format!(
        "previous_block_hash:{},",
        block.previous_block_hash.to_decimal()
    ));
    out.push_str(&format!("timestamp:{},", block.timestamp));
    out.push_str("transactions:[");
    for (i, tx) in block.transactions.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_transaction(&mut out, tx, true);
    }
    out.push_str("]}");
    out.into_bytes()
}

/// Imagem canônica de uma transação completa, assinatura incluída
#[must_use]
pub fn transaction_image(tx: &Transaction) -> Vec<u8> {
    let mut out = String::new();
    write_transaction(&mut out, tx, true);
    out.into_bytes()
}

/// Imagem de assinatura: a transação sem o campo `signature`
#[must_use]
pub fn signing_image(tx: &Transaction) -> Vec<u8> {
    let mut out = String::new();
    write_transaction(&mut out, tx, false);
    out.into_bytes()
}

// Campos em ordem ascendente: from, inputs, outputs, signature. A ordem
// dos inputs é a ordem fixada na construção da transação.
fn write_transaction(out: &mut String, tx: &Transaction, include_signature: bool) {
    out.push('{');
    out.push_str(&format!("from:{},", tx.from));
    out.push_str("inputs:[");
    for (i, input) in tx.inputs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(input);
    }
    out.push_str("],outputs:[");
    for (i, output) in tx.outputs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_output(out, output);
    }
    out.push(']');
    if include_signature {
        out.push_str(&format!(",signature:{}", tx.signature));
    }
    out.push('}');
}

// A tripla (id, amount, address) de uma saída, como sequência aninhada
fn write_output(out: &mut String, output: &TxOutput) {
    out.push_str(&format!(
        "[{},{},{}]",
        output.id, output.amount, output.address
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            inputs: vec!["in-b".to_string(), "in-a".to_string()],
            outputs: vec![TxOutput {
                id: "out-1".to_string(),
                amount: 250,
                address: "cafe".to_string(),
            }],
            from: "beef".to_string(),
            signature: "00ff".to_string(),
        }
    }

    #[test]
    fn test_signing_image_omits_signature() {
        let tx = sample_transaction();
        let image = String::from_utf8(signing_image(&tx)).unwrap();

        assert_eq!(
            image,
            "{from:beef,inputs:[in-b,in-a],outputs:[[out-1,250,cafe]]}"
        );
        assert!(!image.contains("signature"));
    }

    #[test]
    fn test_transaction_image_includes_signature() {
        let tx = sample_transaction();
        let image = String::from_utf8(transaction_image(&tx)).unwrap();

        assert!(image.ends_with(",signature:00ff}"));
    }

    #[test]
    fn test_input_order_is_preserved() {
        // A sequência de inputs fixa na construção determina a imagem;
        // trocar a ordem produz bytes diferentes.
        let tx = sample_transaction();
        let mut swapped = tx.clone();
        swapped.inputs.reverse();

        assert_ne!(signing_image(&tx), signing_image(&swapped));
    }

    #[test]
    fn test_block_image_is_deterministic() {
        let block = Block {
            id: "b1".to_string(),
            transactions: vec![sample_transaction()],
            mine: TxOutput {
                id: "m1".to_string(),
                amount: 1000,
                address: "cafe".to_string(),
            },
            timestamp: 42,
            previous_block: "0".to_string(),
            previous_block_hash: shared::Hash512::zero(),
            nonce: 7,
        };

        assert_eq!(block_image(&block), block_image(&block.clone()));

        let image = String::from_utf8(block_image(&block)).unwrap();
        assert!(image.starts_with("{id:b1,mine:[m1,1000,cafe],nonce:7,"));
        assert!(image.contains("previous_block_hash:0,timestamp:42,"));
    }
}

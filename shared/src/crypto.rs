//! Serviço de chaves e assinaturas Ed25519.
//!
//! O endereço de um nó é a chave pública Ed25519 em hexadecimal (64
//! caracteres); apenas este módulo interpreta endereços como chaves.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::types::Address;

/// Par de chaves do nó, gerado uma vez no arranque e vivo até o fim do
/// processo.
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Gera um novo par de chaves a partir de uma seed aleatória de 32 bytes
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        let address = hex::encode(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Endereço público do nó (chave pública em hex)
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Assina uma mensagem e devolve a assinatura destacada em hex
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        hex::encode(signature.to_bytes())
    }
}

/// Verifica uma assinatura destacada contra um endereço.
///
/// Devolve `false` para qualquer falha: endereço que não é uma chave
/// pública válida, assinatura mal formatada ou que não confere. Nunca
/// propaga erro.
#[must_use]
pub fn verify_signature(address: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(address) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };

    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    verifying_key.verify_strict(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_address_is_hex_public_key() {
        let keypair = KeyPair::generate();

        assert_eq!(keypair.address().len(), 64);
        assert!(keypair.address().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let keypair = KeyPair::generate();
        let message = b"pagamento de 1000 para bob";

        let signature = keypair.sign(message);
        assert!(verify_signature(keypair.address(), message, &signature));
    }

    #[test]
    fn test_tampered_message_fails() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"amount=1000");

        assert!(!verify_signature(keypair.address(), b"amount=1100", &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let signature = alice.sign(b"msg");

        assert!(!verify_signature(bob.address(), b"msg", &signature));
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"msg");

        // Endereço que não é hex, hex curto demais, assinatura truncada
        assert!(!verify_signature("not-hex", b"msg", &signature));
        assert!(!verify_signature("abcd", b"msg", &signature));
        assert!(!verify_signature(keypair.address(), b"msg", "deadbeef"));
        assert!(!verify_signature(keypair.address(), b"msg", "zz"));
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;

/// Hash de 512 bits interpretado como inteiro sem sinal big-endian.
/// Identifica blocos e é a base do predicado de proof-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash512([u8; 64]);

impl Hash512 {
    /// Creates a zeroed hash (o valor inteiro `0`)
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 64])
    }

    /// Creates a hash from a 64-byte array
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Computes the SHA-512 hash of the provided data
    #[must_use]
    pub fn sha512(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 64];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Verifica se o hash satisfaz a dificuldade: `hash < 2^(512 - difficulty)`,
    /// o que equivale a exigir `difficulty` bits zero iniciais.
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zeros() >= difficulty
    }

    /// Counts the number of leading zero bits in the hash
    #[must_use]
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    /// Renderiza o hash como inteiro decimal (a forma textual usada na
    /// imagem canônica). Divisões sucessivas por 10 sobre o valor big-endian.
    #[must_use]
    pub fn to_decimal(&self) -> String {
        let mut value = self.0;
        if value.iter().all(|&b| b == 0) {
            return "0".to_string();
        }

        let mut digits = Vec::new();
        while value.iter().any(|&b| b != 0) {
            let mut remainder = 0u32;
            for byte in &mut value {
                let acc = remainder * 256 + u32::from(*byte);
                *byte = (acc / 10) as u8;
                remainder = acc % 10;
            }
            digits.push(char::from(b'0' + remainder as u8));
        }

        digits.iter().rev().collect()
    }

    /// Decodifica a forma hexadecimal de 128 caracteres
    ///
    /// # Errors
    ///
    /// Retorna erro se a string não for hex válido de exatamente 64 bytes
    pub fn from_hex(hex_string: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex_string).map_err(|e| e.to_string())?;
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| "expected 64 bytes".to_string())?;
        Ok(Self(array))
    }
}

impl fmt::Display for Hash512 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// No wire o hash viaja como string hexadecimal; a forma decimal é
// exclusiva da imagem canônica.
impl Serialize for Hash512 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash512 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hash_display() {
        let hash = Hash512::zero();
        assert_eq!(hash.to_string(), "0".repeat(128));
        assert_eq!(hash.to_decimal(), "0");
    }

    #[test]
    fn test_sha512_hashing() {
        let hash = Hash512::sha512(b"hello world");
        // Dados válidos devem produzir hash não-zero e determinístico
        assert_ne!(hash, Hash512::zero());
        assert_eq!(hash, Hash512::sha512(b"hello world"));
        assert_ne!(hash, Hash512::sha512(b"hello worlds"));
    }

    #[test]
    fn test_difficulty_check() {
        let mut bytes = [0u8; 64];
        bytes[2] = 0x01; // 23 bits zero iniciais
        let hash = Hash512::from_bytes(bytes);

        assert_eq!(hash.leading_zeros(), 23);
        assert!(hash.meets_difficulty(20));
        assert!(hash.meets_difficulty(23));
        assert!(!hash.meets_difficulty(24));
    }

    #[test]
    fn test_meets_difficulty_is_numeric_bound() {
        // hash < 2^(512 - D) exatamente quando os D bits altos são zero
        let mut bytes = [0u8; 64];
        bytes[0] = 0x80; // bit mais alto ligado
        assert!(!Hash512::from_bytes(bytes).meets_difficulty(1));
        assert!(Hash512::zero().meets_difficulty(512));
    }

    #[test]
    fn test_decimal_rendering() {
        let mut bytes = [0u8; 64];
        bytes[63] = 255;
        assert_eq!(Hash512::from_bytes(bytes).to_decimal(), "255");

        bytes[62] = 1; // 256 + 255
        assert_eq!(Hash512::from_bytes(bytes).to_decimal(), "511");
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = Hash512::sha512(b"galena");
        let parsed = Hash512::from_hex(&hash.to_string()).unwrap();
        assert_eq!(hash, parsed);
    }
}

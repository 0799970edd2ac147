use thiserror::Error;

/// Erros do nó Galena
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Transação inválida: {0}")]
    InvalidTransaction(String),

    #[error("Bloco inválido: {0}")]
    InvalidBlock(String),

    #[error("Assinatura inválida")]
    InvalidSignature,

    #[error("Dificuldade insuficiente")]
    InsufficientDifficulty,

    #[error("UTXO não encontrada: {0}")]
    UtxoNotFound(String),

    #[error("Fundos insuficientes")]
    InsufficientFunds,

    #[error("Nenhum peer disponível")]
    NoPeers,

    #[error("Erro de decodificação: {0}")]
    Decode(String),

    #[error("Erro de rede: {0}")]
    Network(String),

    #[error("Erro de I/O: {0}")]
    Io(String),
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

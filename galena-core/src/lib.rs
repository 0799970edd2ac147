pub mod block;
pub mod canonical;
pub mod chain;
pub mod ledger;
pub mod mining;
pub mod transaction;

// Re-exports principais
pub use block::{Block, GENESIS_ID};
pub use chain::{BlockOutcome, Chain, ChainParams, Segment, Tip};
pub use ledger::{Ledger, Utxo};
pub use mining::Miner;
pub use transaction::{Transaction, TxOutput};

// Re-exports de tipos compartilhados
pub use shared::{Hash512, NodeError, Result};

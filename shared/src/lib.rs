pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{verify_signature, KeyPair};
pub use error::NodeError;
pub use hash::Hash512;
pub use types::{Address, Amount, BlockId, NodeConfig, OutputId, Timestamp};

pub type Result<T> = std::result::Result<T, NodeError>;

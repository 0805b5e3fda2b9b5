pub mod actions;
pub mod core;
pub mod data;
pub mod eips;
pub mod error;
pub mod evm;
pub mod rpc;
pub mod utils;

pub use crate::actions::farming::FarmingPool;
pub use crate::core::config::{PoolConfig, SessionConfig};
pub use crate::core::session::WalletSession;
pub use crate::core::state::{Session, SessionState, SessionView};
pub use crate::eips::eip1193::{InjectedProvider, ProviderEvent, WalletProvider};
pub use crate::error::{AppError, ErrorKind, ErrorPayload};
pub use crate::rpc::client::ChainClient;
pub use crate::rpc::https::EthRpcProvider;

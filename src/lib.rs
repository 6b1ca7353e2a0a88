// DAO wallet core library

pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use blockchain::{Bytes32, Coin, CoinState, Program, SpendBundle, TransactionRecord};
pub use config::DaoConfig;
pub use errors::{DaoError, DaoResult};
pub use storage::{MemoryWalletStore, SledWalletStore, WalletInfo, WalletStore, WalletType};
pub use wallet::{DaoContext, DaoSpend, DaoState, DaoWallet, SharedDaoWallet};

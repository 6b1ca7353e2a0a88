use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{DaoError, DaoResult};


/// Stable wallet type identifiers shared with the host's wallet registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WalletType {
    StandardWallet = 0,
    Cat = 6,
    Dao = 14,
    DaoCat = 15,
}

impl WalletType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A wallet record as the host persists it; `data` is the wallet's own JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub id: u32,
    pub name: String,
    pub wallet_type: WalletType,
    pub data: String,
}

/// Persistence of wallet records, provided by the host
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn create_wallet(
        &self,
        name: &str,
        wallet_type: WalletType,
        data: &str,
    ) -> DaoResult<WalletInfo>;

    async fn update_wallet(&self, info: &WalletInfo) -> DaoResult<()>;

    async fn delete_wallet(&self, wallet_id: u32) -> DaoResult<()>;

    async fn get_wallet(&self, wallet_id: u32) -> DaoResult<Option<WalletInfo>>;

    async fn list_wallets(&self, wallet_type: WalletType) -> DaoResult<Vec<WalletInfo>>;
}

/// Volatile store for hosts that keep wallet records elsewhere
pub struct MemoryWalletStore {
    records: RwLock<BTreeMap<u32, WalletInfo>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn create_wallet(
        &self,
        name: &str,
        wallet_type: WalletType,
        data: &str,
    ) -> DaoResult<WalletInfo> {
        let mut records = self.records.write();
        // id 1 belongs to the host's standard wallet
        let id = records.keys().next_back().map_or(2, |last| last + 1);
        let info = WalletInfo {
            id,
            name: name.to_string(),
            wallet_type,
            data: data.to_string(),
        };
        records.insert(id, info.clone());
        Ok(info)
    }

    async fn update_wallet(&self, info: &WalletInfo) -> DaoResult<()> {
        let mut records = self.records.write();
        match records.get_mut(&info.id) {
            Some(existing) => {
                *existing = info.clone();
                Ok(())
            }
            None => Err(DaoError::Storage(format!("wallet {} does not exist", info.id))),
        }
    }

    async fn delete_wallet(&self, wallet_id: u32) -> DaoResult<()> {
        self.records.write().remove(&wallet_id);
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: u32) -> DaoResult<Option<WalletInfo>> {
        Ok(self.records.read().get(&wallet_id).cloned())
    }

    async fn list_wallets(&self, wallet_type: WalletType) -> DaoResult<Vec<WalletInfo>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|info| info.wallet_type == wallet_type)
            .cloned()
            .collect())
    }
}

/// Wallet records in a sled tree, keyed by big-endian wallet id
pub struct SledWalletStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledWalletStore {
    const TREE_NAME: &'static str = "wallets";

    pub fn open(path: &Path) -> DaoResult<Self> {
        info!("Opening wallet store at {}", path.display());
        Self::from_db(sled::open(path)?)
    }

    pub fn temporary() -> DaoResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> DaoResult<Self> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { db, tree })
    }

    fn next_id(&self) -> DaoResult<u32> {
        // offset keeps id 1 free for the host's standard wallet
        let raw = self.db.generate_id()? + 2;
        u32::try_from(raw).map_err(|_| DaoError::Storage("wallet id space exhausted".into()))
    }

    fn write(&self, info: &WalletInfo) -> DaoResult<()> {
        let value = serde_json::to_vec(info)?;
        self.tree.insert(info.id.to_be_bytes(), value)?;
        self.tree.flush()?;
        Ok(())
    }
}

#[async_trait]
impl WalletStore for SledWalletStore {
    async fn create_wallet(
        &self,
        name: &str,
        wallet_type: WalletType,
        data: &str,
    ) -> DaoResult<WalletInfo> {
        let info = WalletInfo {
            id: self.next_id()?,
            name: name.to_string(),
            wallet_type,
            data: data.to_string(),
        };
        self.write(&info)?;
        debug!("Created wallet record {} ({})", info.id, info.name);
        Ok(info)
    }

    async fn update_wallet(&self, info: &WalletInfo) -> DaoResult<()> {
        if !self.tree.contains_key(info.id.to_be_bytes())? {
            return Err(DaoError::Storage(format!("wallet {} does not exist", info.id)));
        }
        self.write(info)
    }

    async fn delete_wallet(&self, wallet_id: u32) -> DaoResult<()> {
        self.tree.remove(wallet_id.to_be_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: u32) -> DaoResult<Option<WalletInfo>> {
        match self.tree.get(wallet_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_wallets(&self, wallet_type: WalletType) -> DaoResult<Vec<WalletInfo>> {
        let mut wallets = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            let info: WalletInfo = serde_json::from_slice(&bytes)?;
            if info.wallet_type == wallet_type {
                wallets.push(info);
            }
        }
        Ok(wallets)
    }
}

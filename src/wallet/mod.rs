use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::blockchain::{Bytes32, Coin};
use crate::errors::{DaoError, DaoResult};
use crate::storage::{WalletInfo, WalletType};

pub mod dao_info;
pub mod interfaces;
pub mod lineage;
pub mod resync;
pub mod spend_builder;
pub mod test_helpers;

#[cfg(test)]
mod tests;

pub use dao_info::{DaoState, ProposalInfo, ProposalState, ProposalUpdate, TreasuryRules};
pub use interfaces::{DaoContext, TokenWalletKind, TokenWalletRef};
pub use lineage::{LineageProof, LineageTracker};
pub use resync::{ResyncOutcome, SpendKind};
pub use spend_builder::DaoSpend;

/// One lock per DAO object; distinct DAOs never contend
pub type SharedDaoWallet = Arc<Mutex<DaoWallet>>;

/// Wallet for a single DAO: tracks the treasury singleton, the voting
/// token wallet bound to it and the proposals it launched.
pub struct DaoWallet {
    info: WalletInfo,
    state: DaoState,
    ctx: DaoContext,
}

impl DaoWallet {
    /// Creates a new DAO: a wallet record, a voting token issuing `supply`
    /// and the treasury singleton, with the configured default rules.
    pub async fn create_new_dao(
        ctx: DaoContext,
        supply: u64,
        fee: u64,
        name: Option<String>,
    ) -> DaoResult<(Self, DaoSpend)> {
        let balance = ctx.ledger.confirmed_balance().await?;
        if balance < supply {
            return Err(DaoError::InsufficientFunds(format!(
                "creating {} voting tokens needs {} but the wallet holds {}",
                supply, supply, balance
            )));
        }
        let rules = ctx.config.default_rules(supply);
        rules.validate()?;

        let mut wallet = Self::create_record(ctx, DaoState::new(Bytes32::default()), name).await?;
        match wallet.generate_new_dao(rules, fee).await {
            Ok(spend) => {
                info!(
                    "Created DAO wallet {} for treasury {}",
                    wallet.id(),
                    spend.launcher_id
                );
                Ok((wallet, spend))
            }
            Err(e) => {
                wallet.discard_record().await;
                Err(e)
            }
        }
    }

    /// Tracks a DAO that already exists on chain, given its treasury id
    pub async fn create_for_existing_dao(
        ctx: DaoContext,
        treasury_id: Bytes32,
        name: Option<String>,
    ) -> DaoResult<Self> {
        if treasury_id.is_zero() {
            return Err(DaoError::Validation("treasury id must not be zero".into()));
        }
        let mut wallet = Self::create_record(ctx, DaoState::new(treasury_id), name).await?;
        match wallet.resync_treasury_state().await {
            Ok(outcome) => {
                info!(
                    "Imported DAO {} into wallet {} at coin {}",
                    treasury_id,
                    wallet.id(),
                    outcome.tip.coin_id()
                );
                Ok(wallet)
            }
            Err(e) => {
                wallet.discard_record().await;
                Err(e)
            }
        }
    }

    /// Rebuilds a wallet from its persisted record
    pub fn restore(ctx: DaoContext, info: WalletInfo) -> DaoResult<Self> {
        if info.wallet_type != WalletType::Dao {
            return Err(DaoError::Validation(format!(
                "wallet {} has type {:?}, not a DAO wallet",
                info.id, info.wallet_type
            )));
        }
        let state = DaoState::from_json(&info.data)?;
        debug!(
            "Restored DAO wallet {} with {} lineage entries",
            info.id,
            state.lineage.len()
        );
        Ok(DaoWallet { info, state, ctx })
    }

    pub fn into_shared(self) -> SharedDaoWallet {
        Arc::new(Mutex::new(self))
    }

    async fn create_record(
        ctx: DaoContext,
        state: DaoState,
        name: Option<String>,
    ) -> DaoResult<Self> {
        let name = match name {
            Some(name) => name,
            None => Self::generate_wallet_name(&ctx).await?,
        };
        let info = ctx
            .store
            .create_wallet(&name, WalletType::Dao, &state.to_json()?)
            .await?;
        Ok(DaoWallet { info, state, ctx })
    }

    async fn discard_record(&self) {
        if let Err(e) = self.ctx.store.delete_wallet(self.id()).await {
            error!("Failed to delete wallet record {}: {}", self.id(), e);
        }
    }

    /// `"<prefix> <n>"` numbered one past the highest existing DAO wallet name
    pub async fn generate_wallet_name(ctx: &DaoContext) -> DaoResult<String> {
        let prefix = format!("{} ", ctx.config.wallet_name_prefix);
        let highest = ctx
            .store
            .list_wallets(WalletType::Dao)
            .await?
            .iter()
            .filter_map(|w| w.name.strip_prefix(&prefix))
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{}{}", prefix, highest + 1))
    }

    /// Replaces the in-memory state, then writes it to the wallet record.
    /// A failed write leaves memory ahead of the store.
    pub async fn save_state(&mut self, state: DaoState) -> DaoResult<()> {
        self.state = state;
        let mut info = self.info.clone();
        info.data = self.state.to_json()?;
        self.ctx.store.update_wallet(&info).await?;
        self.info = info;
        Ok(())
    }

    /// Records new tallies or a new state for one of this DAO's proposals
    pub async fn apply_proposal_update(&mut self, update: ProposalUpdate) -> DaoResult<()> {
        let proposal_id = update.proposal_id;
        let mut next = self.state.clone();
        next.apply_proposal_update(update)?;
        self.save_state(next).await?;
        debug!("Proposal {} updated in wallet {}", proposal_id, self.id());
        Ok(())
    }

    pub async fn set_name(&mut self, name: &str) -> DaoResult<()> {
        let mut info = self.info.clone();
        info.name = name.to_string();
        self.ctx.store.update_wallet(&info).await?;
        self.info = info;
        Ok(())
    }

    /// Notification that a coin for this wallet was confirmed. A direct
    /// child of the current treasury coin with an unchanged inner puzzle
    /// extends the chain in place; anything else triggers a resync.
    pub async fn coin_added(&mut self, coin: Coin) -> DaoResult<()> {
        info!("DAO wallet {} notified of coin {}", self.id(), coin.coin_id());
        if !coin.is_singleton_output() {
            debug!("Ignoring even-amount coin {}", coin.coin_id());
            return Ok(());
        }
        if self.state.current_coin == Some(coin) {
            return Ok(());
        }

        if let (Some(current), Some(inner)) =
            (self.state.current_coin, self.state.current_inner_puzzle.clone())
        {
            let full = self.ctx.puzzles.curry_singleton(&self.state.treasury_id, &inner);
            if coin.parent_coin_info == current.coin_id() && coin.puzzle_hash == full.tree_hash() {
                let inner_hash = inner.tree_hash();
                let mut next = self.state.clone();
                next.lineage
                    .append(current.coin_id(), LineageProof::for_coin(&current, inner_hash))?;
                next.lineage
                    .append(coin.coin_id(), LineageProof::for_coin(&coin, inner_hash))?;
                next.current_coin = Some(coin);
                return self.save_state(next).await;
            }
        }

        self.resync_treasury_state().await.map(|_| ())
    }

    pub fn id(&self) -> u32 {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn wallet_type(&self) -> WalletType {
        WalletType::Dao
    }

    pub fn info(&self) -> &WalletInfo {
        &self.info
    }

    pub fn state(&self) -> &DaoState {
        &self.state
    }

    pub fn context(&self) -> &DaoContext {
        &self.ctx
    }

    pub fn treasury_id(&self) -> Bytes32 {
        self.state.treasury_id
    }

    pub fn token_wallet_id(&self) -> Option<u32> {
        self.state.token_wallet_id
    }

    // The DAO wallet holds no fungible value of its own; funds live in the
    // treasury singleton and the token wallets.

    pub fn get_confirmed_balance(&self) -> u64 {
        0
    }

    pub fn get_unconfirmed_balance(&self) -> u64 {
        0
    }

    pub fn get_spendable_balance(&self) -> u64 {
        0
    }

    pub fn get_max_send_amount(&self) -> u64 {
        0
    }

    pub fn get_frozen_amount(&self) -> u64 {
        0
    }

    pub fn get_pending_change_balance(&self) -> u64 {
        0
    }
}

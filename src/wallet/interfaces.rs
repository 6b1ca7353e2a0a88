//! Collaborators a DAO wallet consumes from its host: peers, puzzle
//! construction, token wallets, the standard wallet and record storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dao_info::TreasuryRules;
use crate::blockchain::{
    Announcement, Bytes32, Coin, CoinSpend, CoinState, Condition, Program, PuzzleSolution,
    SpendBundle,
};
use crate::config::DaoConfig;
use crate::errors::DaoResult;
use crate::storage::WalletStore;

/// Read-only chain queries against one full node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerQuery: Send + Sync {
    /// States of the coins created by spending `coin_id`; empty while unspent
    async fn fetch_children(&self, coin_id: &Bytes32) -> DaoResult<Vec<CoinState>>;

    /// Reveal and solution of `coin`'s spend, confirmed at `height`
    async fn fetch_puzzle_solution(&self, height: u32, coin: &Coin) -> DaoResult<PuzzleSolution>;
}

#[cfg_attr(test, mockall::automock)]
pub trait PeerPool: Send + Sync {
    fn full_node_peer(&self) -> Option<Arc<dyn PeerQuery>>;
}

/// Inputs of the treasury inner puzzle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreasuryParams {
    pub launcher_id: Bytes32,
    pub tail_hash: Bytes32,
    pub rules: TreasuryRules,
}

/// Inputs of a proposal inner puzzle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalParams {
    pub launcher_id: Bytes32,
    pub tail_hash: Bytes32,
    pub treasury_id: Bytes32,
    pub proposed_puzzle_hash: Bytes32,
}

/// Puzzle construction and inspection. Implementations are pure.
#[cfg_attr(test, mockall::automock)]
pub trait PuzzleLibrary: Send + Sync {
    fn launcher_puzzle(&self) -> Program;

    fn treasury_puzzle(&self, params: &TreasuryParams) -> Program;

    fn proposal_puzzle(&self, params: &ProposalParams) -> Program;

    /// Wraps `inner` in the singleton layer for `launcher_id`
    fn curry_singleton(&self, launcher_id: &Bytes32, inner: &Program) -> Program;

    fn inner_puzzle_from_singleton(&self, puzzle: &Program) -> Option<Program>;

    /// Treasury inner puzzle that results from spending `prior_inner` with
    /// `inner_solution`
    fn decode_new_inner_puzzle(
        &self,
        prior_inner: &Program,
        inner_solution: &Program,
    ) -> DaoResult<Program>;

    fn tail_from_treasury_puzzle(&self, inner: &Program) -> Option<Bytes32>;

    /// Issuance rule for the voting token: a one-time genesis keyed by the
    /// minting coin, later extendable by proposals of `launcher_id`
    fn generate_token_tail(&self, minting_coin_id: &Bytes32, launcher_id: &Bytes32) -> Program;

    /// Conditions `spend` produces when run
    fn conditions_for_spend(&self, spend: &CoinSpend) -> DaoResult<Vec<Condition>>;
}

/// What a token wallet is for. Set when the wallet is created and never
/// changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenWalletKind {
    /// Holds freely spendable tokens
    Standard,
    /// Holds tokens that can be locked into proposals
    Voting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWalletRef {
    pub wallet_id: u32,
    pub tail_hash: Bytes32,
    pub kind: TokenWalletKind,
}

/// A token mint requested during treasury creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIssuance {
    pub tail: Program,
    pub treasury_id: Bytes32,
    pub minting_coins: Vec<Coin>,
}

impl TokenIssuance {
    pub fn tail_hash(&self) -> Bytes32 {
        self.tail.tree_hash()
    }
}

/// The host's registry of token wallets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenWalletRegistry: Send + Sync {
    async fn find_by_tail(
        &self,
        tail_hash: &Bytes32,
        kind: TokenWalletKind,
    ) -> DaoResult<Option<TokenWalletRef>>;

    async fn wallet(&self, wallet_id: u32) -> DaoResult<Option<TokenWalletRef>>;

    /// The issuance program of `wallet_id`, when the registry holds it
    async fn tail_program(&self, wallet_id: u32) -> DaoResult<Option<Program>>;

    /// Creates a standard token wallet and mints `supply` under `issuance`
    async fn create_with_tail(
        &self,
        issuance: &TokenIssuance,
        supply: u64,
    ) -> DaoResult<TokenWalletRef>;

    /// Creates an empty voting wallet tracking `tail_hash`
    async fn create_voting_wallet(&self, tail_hash: &Bytes32) -> DaoResult<TokenWalletRef>;

    async fn remove_wallet(&self, wallet_id: u32) -> DaoResult<()>;
}

/// A payment the standard wallet should fund and sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub amount: u64,
    pub destination: Bytes32,
    pub fee: u64,
    /// Coin that must be spent first; its id seeds the new singleton
    pub origin_id: Bytes32,
    pub coins: Vec<Coin>,
    pub announcements_to_assert: Vec<Announcement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub spend_bundle: SpendBundle,
    pub amount: u64,
    pub fee_amount: u64,
    pub to_puzzle_hash: Bytes32,
}

/// The host's standard wallet
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerWallet: Send + Sync {
    async fn confirmed_balance(&self) -> DaoResult<u64>;

    /// Coins covering at least `amount`, skipping ids in `exclude`
    async fn select_coins(&self, amount: u64, exclude: &[Bytes32])
        -> DaoResult<Option<Vec<Coin>>>;

    async fn signed_transaction(&self, request: TransactionRequest)
        -> DaoResult<SignedTransaction>;
}

/// Everything a DAO wallet borrows from its host
#[derive(Clone)]
pub struct DaoContext {
    pub ledger: Arc<dyn LedgerWallet>,
    pub puzzles: Arc<dyn PuzzleLibrary>,
    pub tokens: Arc<dyn TokenWalletRegistry>,
    pub peers: Arc<dyn PeerPool>,
    pub store: Arc<dyn WalletStore>,
    pub config: DaoConfig,
}

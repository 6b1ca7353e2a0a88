//! In-memory stand-ins for the host collaborators a DAO wallet needs.
//! Puzzles are symbolic lists rather than compiled programs, but they hash,
//! curry and produce conditions consistently, so bundles built against them
//! can be checked and replayed onto `FakeFullNode`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use blstrs::{G2Projective, Scalar};
use group::Group;
use parking_lot::Mutex;

use super::interfaces::{
    DaoContext, LedgerWallet, PeerPool, PeerQuery, ProposalParams, PuzzleLibrary,
    SignedTransaction, TokenIssuance, TokenWalletKind, TokenWalletRef, TokenWalletRegistry,
    TransactionRequest, TreasuryParams,
};
use crate::blockchain::{
    sha256, Bytes32, Coin, CoinSpend, CoinState, Condition, Program, PuzzleSolution, SpendBundle,
};
use crate::config::DaoConfig;
use crate::crypto::Signature;
use crate::errors::{DaoError, DaoResult};
use crate::storage::{MemoryWalletStore, WalletInfo, WalletStore, WalletType};

const LAUNCHER_TAG: &[u8] = b"singleton_launcher";
const SINGLETON_TAG: &[u8] = b"singleton_top_layer";
const TREASURY_TAG: &[u8] = b"dao_treasury";
const PROPOSAL_TAG: &[u8] = b"dao_proposal";
const TAIL_TAG: &[u8] = b"genesis_by_id_or_proposal";
const P2_TAG: &[u8] = b"p2_conditions";

fn tagged(tag: &[u8], args: Vec<Program>) -> Program {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(Program::atom(tag));
    items.extend(args);
    Program::list(items)
}

fn tag_of(program: &Program) -> Option<&[u8]> {
    program.first().and_then(Program::as_atom)
}

/// Standard-wallet puzzle whose solution is the literal condition list
pub fn p2_puzzle(owner: Bytes32) -> Program {
    tagged(P2_TAG, vec![Program::from(owner)])
}

pub fn p2_solution(conditions: &[Condition]) -> Program {
    Program::list(conditions.iter().map(Condition::to_program).collect())
}

/// Deterministic non-identity signature
pub fn fake_signature(seed: u64) -> Signature {
    Signature::from(G2Projective::generator() * Scalar::from(seed))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FakePuzzleLibrary;

impl FakePuzzleLibrary {
    fn singleton_conditions(&self, spend: &CoinSpend) -> DaoResult<Vec<Condition>> {
        let malformed = || DaoError::ProtocolViolation("malformed singleton spend".into());
        let launcher_id = spend
            .puzzle_reveal
            .nth(1)
            .and_then(Program::as_bytes32)
            .ok_or_else(malformed)?;
        let inner = spend.puzzle_reveal.nth(2).ok_or_else(malformed)?;
        let inner_solution = spend.solution.nth(2).ok_or_else(malformed)?;
        let next_inner = match inner_solution.nth(4) {
            Some(next) if !next.is_nil() => next,
            _ => inner,
        };
        Ok(vec![Condition::CreateCoin {
            puzzle_hash: self.curry_singleton(&launcher_id, next_inner).tree_hash(),
            amount: spend.coin.amount,
        }])
    }
}

impl PuzzleLibrary for FakePuzzleLibrary {
    fn launcher_puzzle(&self) -> Program {
        Program::atom(LAUNCHER_TAG)
    }

    fn treasury_puzzle(&self, params: &TreasuryParams) -> Program {
        tagged(
            TREASURY_TAG,
            vec![
                Program::from(params.launcher_id),
                Program::from(params.tail_hash),
                Program::from(params.rules.supply),
                Program::from(params.rules.attendance_required),
                Program::from(params.rules.pass_percentage),
                Program::from(params.rules.proposal_timelock),
            ],
        )
    }

    fn proposal_puzzle(&self, params: &ProposalParams) -> Program {
        tagged(
            PROPOSAL_TAG,
            vec![
                Program::from(params.launcher_id),
                Program::from(params.tail_hash),
                Program::from(params.treasury_id),
                Program::from(params.proposed_puzzle_hash),
            ],
        )
    }

    fn curry_singleton(&self, launcher_id: &Bytes32, inner: &Program) -> Program {
        tagged(SINGLETON_TAG, vec![Program::from(*launcher_id), inner.clone()])
    }

    fn inner_puzzle_from_singleton(&self, puzzle: &Program) -> Option<Program> {
        if tag_of(puzzle) != Some(SINGLETON_TAG) {
            return None;
        }
        puzzle.nth(2).cloned()
    }

    fn decode_new_inner_puzzle(
        &self,
        _prior_inner: &Program,
        inner_solution: &Program,
    ) -> DaoResult<Program> {
        match inner_solution.nth(4) {
            Some(next) if !next.is_nil() => Ok(next.clone()),
            _ => Err(DaoError::ProtocolViolation(
                "inner solution names no new treasury puzzle".into(),
            )),
        }
    }

    fn tail_from_treasury_puzzle(&self, inner: &Program) -> Option<Bytes32> {
        if tag_of(inner) != Some(TREASURY_TAG) {
            return None;
        }
        inner.nth(2).and_then(Program::as_bytes32)
    }

    fn generate_token_tail(&self, minting_coin_id: &Bytes32, launcher_id: &Bytes32) -> Program {
        tagged(
            TAIL_TAG,
            vec![Program::from(*minting_coin_id), Program::from(*launcher_id)],
        )
    }

    fn conditions_for_spend(&self, spend: &CoinSpend) -> DaoResult<Vec<Condition>> {
        if spend.puzzle_reveal == self.launcher_puzzle() {
            let puzzle_hash = spend.solution.nth(0).and_then(Program::as_bytes32);
            let amount = spend.solution.nth(1).and_then(Program::as_u64);
            return match (puzzle_hash, amount) {
                (Some(puzzle_hash), Some(amount)) => Ok(vec![
                    Condition::CreateCoin {
                        puzzle_hash,
                        amount,
                    },
                    Condition::CreateCoinAnnouncement {
                        message: spend.solution.tree_hash().as_ref().to_vec(),
                    },
                ]),
                _ => Err(DaoError::ProtocolViolation("malformed launcher solution".into())),
            };
        }
        let tag = tag_of(&spend.puzzle_reveal);
        if tag == Some(SINGLETON_TAG) {
            return self.singleton_conditions(spend);
        }
        if tag != Some(P2_TAG) {
            return Err(DaoError::ProtocolViolation(format!(
                "unknown puzzle for coin {}",
                spend.coin.coin_id()
            )));
        }
        spend
            .solution
            .to_list()
            .ok_or_else(|| DaoError::ProtocolViolation("p2 solution is not a list".into()))?
            .into_iter()
            .map(|item| {
                Condition::from_program(item)
                    .ok_or_else(|| DaoError::ProtocolViolation("malformed condition".into()))
            })
            .collect()
    }
}

/// Standard wallet over a fixed set of coins
pub struct FakeLedgerWallet {
    owner: Bytes32,
    coins: Mutex<Vec<Coin>>,
    requests: Mutex<Vec<TransactionRequest>>,
    fail_signing: AtomicBool,
}

impl FakeLedgerWallet {
    pub fn new(owner: Bytes32) -> Self {
        Self {
            owner,
            coins: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fail_signing: AtomicBool::new(false),
        }
    }

    pub fn with_coins(owner: Bytes32, amounts: &[u64]) -> Self {
        let wallet = Self::new(owner);
        for (i, amount) in amounts.iter().enumerate() {
            let parent = sha256(&[owner.as_ref(), &(i as u64).to_be_bytes()[..]]);
            wallet.add_coin(Coin::new(parent, wallet.puzzle_hash(), *amount));
        }
        wallet
    }

    pub fn puzzle_hash(&self) -> Bytes32 {
        p2_puzzle(self.owner).tree_hash()
    }

    pub fn add_coin(&self, coin: Coin) {
        self.coins.lock().push(coin);
    }

    pub fn coins(&self) -> Vec<Coin> {
        self.coins.lock().clone()
    }

    pub fn requests(&self) -> Vec<TransactionRequest> {
        self.requests.lock().clone()
    }

    pub fn set_fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }

    /// Drops spent coins and picks up outputs paid to this wallet
    pub fn confirm(&self, bundle: &SpendBundle, additions: &[Coin]) {
        let removed: Vec<Bytes32> = bundle.removals().iter().map(Coin::coin_id).collect();
        let mut coins = self.coins.lock();
        coins.retain(|coin| !removed.contains(&coin.coin_id()));
        let own = self.puzzle_hash();
        coins.extend(additions.iter().filter(|coin| coin.puzzle_hash == own).copied());
    }
}

#[async_trait]
impl LedgerWallet for FakeLedgerWallet {
    async fn confirmed_balance(&self) -> DaoResult<u64> {
        Ok(self.coins.lock().iter().map(|coin| coin.amount).sum())
    }

    async fn select_coins(
        &self,
        amount: u64,
        exclude: &[Bytes32],
    ) -> DaoResult<Option<Vec<Coin>>> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for coin in self.coins.lock().iter() {
            if total >= amount && !selected.is_empty() {
                break;
            }
            if exclude.contains(&coin.coin_id()) {
                continue;
            }
            total += coin.amount;
            selected.push(*coin);
        }
        if selected.is_empty() || total < amount {
            return Ok(None);
        }
        Ok(Some(selected))
    }

    async fn signed_transaction(
        &self,
        request: TransactionRequest,
    ) -> DaoResult<SignedTransaction> {
        self.requests.lock().push(request.clone());
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(DaoError::Collaborator("signing refused".into()));
        }

        let total: u64 = request.coins.iter().map(|coin| coin.amount).sum();
        let needed = request.amount + request.fee;
        if total < needed {
            return Err(DaoError::InsufficientFunds(format!(
                "selected {} but the payment needs {}",
                total, needed
            )));
        }
        let origin = request
            .coins
            .iter()
            .find(|coin| coin.coin_id() == request.origin_id)
            .copied()
            .ok_or_else(|| DaoError::Validation("origin coin was not selected".into()))?;

        let mut conditions = vec![Condition::CreateCoin {
            puzzle_hash: request.destination,
            amount: request.amount,
        }];
        if total > needed {
            conditions.push(Condition::CreateCoin {
                puzzle_hash: self.puzzle_hash(),
                amount: total - needed,
            });
        }
        if request.fee > 0 {
            conditions.push(Condition::ReserveFee {
                amount: request.fee,
            });
        }
        for announcement in &request.announcements_to_assert {
            conditions.push(Condition::AssertCoinAnnouncement {
                announcement_id: announcement.name(),
            });
        }

        let puzzle = p2_puzzle(self.owner);
        let mut spends = vec![CoinSpend::new(origin, puzzle.clone(), p2_solution(&conditions))];
        spends.extend(
            request
                .coins
                .iter()
                .filter(|coin| coin.coin_id() != origin.coin_id())
                .map(|coin| CoinSpend::new(*coin, puzzle.clone(), p2_solution(&[]))),
        );
        let signature = fake_signature(spends.len() as u64);

        Ok(SignedTransaction {
            spend_bundle: SpendBundle::new(spends, signature),
            amount: request.amount,
            fee_amount: request.fee,
            to_puzzle_hash: request.destination,
        })
    }
}

/// Token wallet registry keeping wallets in a map
pub struct FakeTokenRegistry {
    wallets: Mutex<BTreeMap<u32, TokenWalletRef>>,
    tails: Mutex<HashMap<u32, Program>>,
    issuances: Mutex<Vec<(TokenIssuance, u64)>>,
    next_id: AtomicU32,
    fail_create: AtomicBool,
}

impl FakeTokenRegistry {
    pub fn new() -> Self {
        Self {
            wallets: Mutex::new(BTreeMap::new()),
            tails: Mutex::new(HashMap::new()),
            issuances: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(100),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, tail_hash: Bytes32, kind: TokenWalletKind) -> TokenWalletRef {
        let wallet = TokenWalletRef {
            wallet_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tail_hash,
            kind,
        };
        self.wallets.lock().insert(wallet.wallet_id, wallet.clone());
        wallet
    }

    /// Registers a wallet whose issuance program is known
    pub fn insert_with_tail(&self, tail: Program, kind: TokenWalletKind) -> TokenWalletRef {
        let wallet = self.insert(tail.tree_hash(), kind);
        self.tails.lock().insert(wallet.wallet_id, tail);
        wallet
    }

    pub fn wallets(&self) -> Vec<TokenWalletRef> {
        self.wallets.lock().values().cloned().collect()
    }

    pub fn issuances(&self) -> Vec<(TokenIssuance, u64)> {
        self.issuances.lock().clone()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

impl Default for FakeTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenWalletRegistry for FakeTokenRegistry {
    async fn find_by_tail(
        &self,
        tail_hash: &Bytes32,
        kind: TokenWalletKind,
    ) -> DaoResult<Option<TokenWalletRef>> {
        Ok(self
            .wallets
            .lock()
            .values()
            .find(|w| &w.tail_hash == tail_hash && w.kind == kind)
            .cloned())
    }

    async fn wallet(&self, wallet_id: u32) -> DaoResult<Option<TokenWalletRef>> {
        Ok(self.wallets.lock().get(&wallet_id).cloned())
    }

    async fn tail_program(&self, wallet_id: u32) -> DaoResult<Option<Program>> {
        Ok(self.tails.lock().get(&wallet_id).cloned())
    }

    async fn create_with_tail(
        &self,
        issuance: &TokenIssuance,
        supply: u64,
    ) -> DaoResult<TokenWalletRef> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DaoError::Collaborator("token wallet creation refused".into()));
        }
        self.issuances.lock().push((issuance.clone(), supply));
        Ok(self.insert_with_tail(issuance.tail.clone(), TokenWalletKind::Standard))
    }

    async fn create_voting_wallet(&self, tail_hash: &Bytes32) -> DaoResult<TokenWalletRef> {
        Ok(self.insert(*tail_hash, TokenWalletKind::Voting))
    }

    async fn remove_wallet(&self, wallet_id: u32) -> DaoResult<()> {
        self.wallets.lock().remove(&wallet_id);
        self.tails.lock().remove(&wallet_id);
        Ok(())
    }
}

/// Memory store whose record updates can be switched to fail
#[derive(Default)]
pub struct FlakyWalletStore {
    records: MemoryWalletStore,
    fail_updates: AtomicBool,
}

impl FlakyWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl WalletStore for FlakyWalletStore {
    async fn create_wallet(
        &self,
        name: &str,
        wallet_type: WalletType,
        data: &str,
    ) -> DaoResult<WalletInfo> {
        self.records.create_wallet(name, wallet_type, data).await
    }

    async fn update_wallet(&self, info: &WalletInfo) -> DaoResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DaoError::Storage("disk full".into()));
        }
        self.records.update_wallet(info).await
    }

    async fn delete_wallet(&self, wallet_id: u32) -> DaoResult<()> {
        self.records.delete_wallet(wallet_id).await
    }

    async fn get_wallet(&self, wallet_id: u32) -> DaoResult<Option<WalletInfo>> {
        self.records.get_wallet(wallet_id).await
    }

    async fn list_wallets(&self, wallet_type: WalletType) -> DaoResult<Vec<WalletInfo>> {
        self.records.list_wallets(wallet_type).await
    }
}

/// Chain view built from replayed bundles
#[derive(Default)]
pub struct FakeFullNode {
    children: Mutex<HashMap<Bytes32, Vec<CoinState>>>,
    spends: Mutex<HashMap<(u32, Bytes32), PuzzleSolution>>,
}

impl FakeFullNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `spend` as confirmed at `height`, creating `children`
    pub fn record_spend(&self, spend: &CoinSpend, children: Vec<Coin>, height: u32) {
        let coin_id = spend.coin.coin_id();
        {
            let mut all = self.children.lock();
            for states in all.values_mut() {
                for state in states.iter_mut().filter(|s| s.coin.coin_id() == coin_id) {
                    state.spent_height = Some(height);
                }
            }
            all.entry(coin_id).or_default().extend(
                children
                    .into_iter()
                    .map(|child| CoinState::new(child, None, Some(height))),
            );
        }
        self.spends.lock().insert(
            (height, coin_id),
            PuzzleSolution {
                puzzle_reveal: spend.puzzle_reveal.clone(),
                solution: spend.solution.clone(),
            },
        );
    }

    /// Confirms every spend of `bundle` at `height`; returns the additions
    pub fn apply_bundle(
        &self,
        bundle: &SpendBundle,
        puzzles: &dyn PuzzleLibrary,
        height: u32,
    ) -> DaoResult<Vec<Coin>> {
        let mut additions = Vec::new();
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.coin_id();
            let children: Vec<Coin> = puzzles
                .conditions_for_spend(spend)?
                .into_iter()
                .filter_map(|condition| match condition {
                    Condition::CreateCoin {
                        puzzle_hash,
                        amount,
                    } => Some(Coin::new(coin_id, puzzle_hash, amount)),
                    _ => None,
                })
                .collect();
            additions.extend(children.iter().copied());
            self.record_spend(spend, children, height);
        }
        Ok(additions)
    }
}

#[async_trait]
impl PeerQuery for FakeFullNode {
    async fn fetch_children(&self, coin_id: &Bytes32) -> DaoResult<Vec<CoinState>> {
        Ok(self.children.lock().get(coin_id).cloned().unwrap_or_default())
    }

    async fn fetch_puzzle_solution(&self, height: u32, coin: &Coin) -> DaoResult<PuzzleSolution> {
        self.spends
            .lock()
            .get(&(height, coin.coin_id()))
            .cloned()
            .ok_or_else(|| {
                DaoError::Collaborator(format!(
                    "no spend of {} at height {}",
                    coin.coin_id(),
                    height
                ))
            })
    }
}

pub struct FakePeerPool {
    peer: Option<Arc<FakeFullNode>>,
}

impl FakePeerPool {
    pub fn connected(node: Arc<FakeFullNode>) -> Self {
        Self { peer: Some(node) }
    }

    pub fn disconnected() -> Self {
        Self { peer: None }
    }
}

impl PeerPool for FakePeerPool {
    fn full_node_peer(&self) -> Option<Arc<dyn PeerQuery>> {
        self.peer.clone().map(|node| node as Arc<dyn PeerQuery>)
    }
}

/// A host wired from fakes, with a chain the tests can advance
pub struct FakeHost {
    pub ledger: Arc<FakeLedgerWallet>,
    pub puzzles: Arc<FakePuzzleLibrary>,
    pub tokens: Arc<FakeTokenRegistry>,
    pub node: Arc<FakeFullNode>,
    pub store: Arc<MemoryWalletStore>,
    pub config: DaoConfig,
    height: AtomicU32,
}

impl FakeHost {
    pub fn new(coin_amounts: &[u64]) -> Self {
        let owner = sha256(&[&b"fake host owner"[..]]);
        Self {
            ledger: Arc::new(FakeLedgerWallet::with_coins(owner, coin_amounts)),
            puzzles: Arc::new(FakePuzzleLibrary),
            tokens: Arc::new(FakeTokenRegistry::new()),
            node: Arc::new(FakeFullNode::new()),
            store: Arc::new(MemoryWalletStore::new()),
            config: DaoConfig::default(),
            height: AtomicU32::new(100),
        }
    }

    pub fn context(&self) -> DaoContext {
        self.context_with_peers(Arc::new(FakePeerPool::connected(Arc::clone(&self.node))))
    }

    pub fn offline_context(&self) -> DaoContext {
        self.context_with_peers(Arc::new(FakePeerPool::disconnected()))
    }

    fn context_with_peers(&self, peers: Arc<dyn PeerPool>) -> DaoContext {
        DaoContext {
            ledger: self.ledger.clone(),
            puzzles: self.puzzles.clone(),
            tokens: self.tokens.clone(),
            peers,
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }

    /// Confirms `bundle` in the next block; returns that block's height
    pub fn confirm(&self, bundle: &SpendBundle) -> DaoResult<u32> {
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let additions = self.node.apply_bundle(bundle, self.puzzles.as_ref(), height)?;
        self.ledger.confirm(bundle, &additions);
        Ok(height)
    }
}

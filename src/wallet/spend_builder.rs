use std::sync::Arc;

use log::{debug, error, info, warn};

use super::dao_info::{DaoState, ProposalInfo, TreasuryRules};
use super::interfaces::{
    ProposalParams, SignedTransaction, TokenIssuance, TokenWalletRef, TransactionRequest,
    TreasuryParams,
};
use super::lineage::LineageProof;
use super::DaoWallet;
use crate::blockchain::{
    Announcement, BundleSummary, Bytes32, Coin, CoinSpend, Program, SpendBundle,
    TransactionRecord,
};
use crate::errors::{DaoError, DaoResult};
use crate::utils::current_time;

/// A complete, consistent bundle launching a singleton, ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoSpend {
    pub launcher_id: Bytes32,
    /// Created by the launcher and spent in the same bundle
    pub eve_coin: Coin,
    /// The unspent singleton the bundle leaves behind
    pub singleton_coin: Coin,
    pub spend_bundle: SpendBundle,
    pub record: TransactionRecord,
}

struct SingletonLaunch {
    launcher: Coin,
    eve: Coin,
    child: Coin,
    spend_bundle: SpendBundle,
    summary: BundleSummary,
    funding: SignedTransaction,
}

/// `(1 0 inner_hash () 0)`: no amount change, same puzzle, no messages,
/// and the trailing 0 selects the add-funds path
fn treasury_eve_solution(inner_puzzle_hash: Bytes32) -> Program {
    Program::list(vec![
        Program::from(1u64),
        Program::from(0u64),
        Program::from(inner_puzzle_hash),
        Program::nil(),
        Program::from(0u64),
    ])
}

impl DaoWallet {
    /// Builds the bundle creating a new treasury: the funding spend, the
    /// singleton launcher and the eve spend. The full supply of voting
    /// tokens is always minted, under the bound wallet's tail when one is
    /// bound and under a fresh tail otherwise.
    pub async fn generate_new_dao(&mut self, rules: TreasuryRules, fee: u64) -> DaoResult<DaoSpend> {
        rules.validate()?;
        if let Some(current) = self.state.current_coin {
            return Err(DaoError::Validation(format!(
                "wallet already tracks treasury {} at coin {}",
                self.state.treasury_id,
                current.coin_id()
            )));
        }

        let coins = self.select_funding(fee).await?;
        let origin = coins[0];
        let funding_ids: Vec<Bytes32> = coins.iter().map(Coin::coin_id).collect();
        let minting_coins = self
            .ctx
            .ledger
            .select_coins(rules.supply, &funding_ids)
            .await?
            .filter(|selected| !selected.is_empty())
            .ok_or_else(|| {
                DaoError::InsufficientFunds(format!(
                    "no coins left to mint {} voting tokens",
                    rules.supply
                ))
            })?;
        if minting_coins[0].coin_id() == origin.coin_id() {
            return Err(DaoError::Validation(format!(
                "minting coin and origin coin are both {}",
                origin.coin_id()
            )));
        }

        let launcher = self.launcher_coin(&origin);
        let launcher_id = launcher.coin_id();
        let snapshot = self.state.clone();

        let tail = match self.bound_tail().await? {
            Some(tail) => tail,
            None => self
                .ctx
                .puzzles
                .generate_token_tail(&minting_coins[0].coin_id(), &launcher_id),
        };
        let mut pending = self.state.clone();
        pending.treasury_id = launcher_id;
        if let Err(e) = self.save_state(pending).await {
            self.restore_state(snapshot).await;
            return Err(e);
        }

        let issuance = TokenIssuance {
            tail,
            treasury_id: launcher_id,
            minting_coins,
        };
        let created = self.ctx.tokens.create_with_tail(&issuance, rules.supply).await;
        let token_wallet = match created {
            Ok(created) => created,
            Err(e) => {
                self.restore_state(snapshot).await;
                return Err(e);
            }
        };

        let finished = self
            .finish_treasury(launcher, origin.coin_id(), coins, rules, fee, &token_wallet)
            .await;
        match finished {
            Ok(spend) => Ok(spend),
            Err(e) => Err(self.abandon_launch(snapshot, token_wallet.wallet_id, e).await),
        }
    }

    async fn finish_treasury(
        &mut self,
        launcher: Coin,
        origin_id: Bytes32,
        coins: Vec<Coin>,
        rules: TreasuryRules,
        fee: u64,
        token_wallet: &TokenWalletRef,
    ) -> DaoResult<DaoSpend> {
        let launcher_id = launcher.coin_id();
        let inner = self.ctx.puzzles.treasury_puzzle(&TreasuryParams {
            launcher_id,
            tail_hash: token_wallet.tail_hash,
            rules,
        });
        let inner_hash = inner.tree_hash();
        let launch = self
            .launch_singleton(
                launcher,
                origin_id,
                coins,
                fee,
                &inner,
                treasury_eve_solution(inner_hash),
            )
            .await?;

        let mut next = self.state.clone();
        Self::record_launch_lineage(&mut next, &launch, inner_hash)?;
        next.treasury_id = launcher_id;
        next.token_wallet_id = Some(token_wallet.wallet_id);
        next.treasury_rules = Some(rules);
        next.current_coin = Some(launch.child);
        next.current_inner_puzzle = Some(inner);
        self.save_state(next).await?;

        info!(
            "Built treasury {} with token wallet {}",
            launcher_id, token_wallet.wallet_id
        );
        Ok(self.to_dao_spend(launch))
    }

    /// Builds the bundle launching a proposal singleton for
    /// `proposed_puzzle_hash`, bound to this treasury and its voting token.
    pub async fn generate_new_proposal(
        &mut self,
        proposed_puzzle_hash: Bytes32,
        fee: u64,
    ) -> DaoResult<DaoSpend> {
        if !self.state.has_treasury() {
            return Err(DaoError::Validation(
                "cannot create a proposal without a treasury".into(),
            ));
        }
        let wallet_id = self.state.token_wallet_id.ok_or_else(|| {
            DaoError::Validation("no token wallet is bound to this DAO".into())
        })?;
        let token_wallet = self.ctx.tokens.wallet(wallet_id).await?.ok_or_else(|| {
            DaoError::Validation(format!("token wallet {} has no known tail", wallet_id))
        })?;

        let coins = self.select_funding(fee).await?;
        let origin_id = coins[0].coin_id();
        let launcher = self.launcher_coin(&coins[0]);
        let launcher_id = launcher.coin_id();

        let inner = self.ctx.puzzles.proposal_puzzle(&ProposalParams {
            launcher_id,
            tail_hash: token_wallet.tail_hash,
            treasury_id: self.state.treasury_id,
            proposed_puzzle_hash,
        });
        let inner_hash = inner.tree_hash();
        let launch = self
            .launch_singleton(launcher, origin_id, coins, fee, &inner, Program::nil())
            .await?;

        let timelock = self
            .state
            .treasury_rules
            .map_or(self.ctx.config.proposal_timelock, |rules| rules.proposal_timelock);
        let mut next = self.state.clone();
        Self::record_launch_lineage(&mut next, &launch, inner_hash)?;
        next.add_proposal(ProposalInfo::created(launcher_id, inner, timelock))?;
        self.save_state(next).await?;

        info!(
            "Built proposal {} for treasury {}",
            launcher_id, self.state.treasury_id
        );
        Ok(self.to_dao_spend(launch))
    }

    async fn select_funding(&self, fee: u64) -> DaoResult<Vec<Coin>> {
        let amount = fee
            .checked_add(1)
            .ok_or_else(|| DaoError::Validation(format!("fee {} is too large", fee)))?;
        self.ctx
            .ledger
            .select_coins(amount, &[])
            .await?
            .filter(|selected| !selected.is_empty())
            .ok_or_else(|| {
                DaoError::InsufficientFunds(format!("no coins available to cover {}", amount))
            })
    }

    fn launcher_coin(&self, origin: &Coin) -> Coin {
        let launcher_hash = self.ctx.puzzles.launcher_puzzle().tree_hash();
        Coin::new(origin.coin_id(), launcher_hash, 1)
    }

    /// The issuance program of the bound token wallet, reused so a new
    /// treasury mints under the same tail
    async fn bound_tail(&self) -> DaoResult<Option<Program>> {
        let Some(wallet_id) = self.state.token_wallet_id else {
            return Ok(None);
        };
        let Some(bound) = self.ctx.tokens.wallet(wallet_id).await? else {
            warn!("Bound token wallet {} is unknown to the registry", wallet_id);
            return Ok(None);
        };
        match self.ctx.tokens.tail_program(wallet_id).await? {
            Some(tail) if tail.tree_hash() == bound.tail_hash => {
                info!("Reusing tail {} of token wallet {}", bound.tail_hash, wallet_id);
                Ok(Some(tail))
            }
            Some(_) => {
                warn!(
                    "Token wallet {} reports a tail not matching {}",
                    wallet_id, bound.tail_hash
                );
                Ok(None)
            }
            None => {
                warn!("Token wallet {} has no issuance program", wallet_id);
                Ok(None)
            }
        }
    }

    /// Funds `launcher`, spends it into the singleton for `inner` and spends
    /// the eve coin with `eve_inner_solution`, all in one bundle.
    async fn launch_singleton(
        &self,
        launcher: Coin,
        origin_id: Bytes32,
        coins: Vec<Coin>,
        fee: u64,
        inner: &Program,
        eve_inner_solution: Program,
    ) -> DaoResult<SingletonLaunch> {
        let puzzles = Arc::clone(&self.ctx.puzzles);
        let launcher_id = launcher.coin_id();
        let full_puzzle = puzzles.curry_singleton(&launcher_id, inner);
        let full_hash = full_puzzle.tree_hash();

        let launcher_solution = Program::list(vec![
            Program::from(full_hash),
            Program::from(1u64),
            Program::nil(),
        ]);
        let announcement = Announcement::new(
            launcher_id,
            launcher_solution.tree_hash().as_ref().to_vec(),
        );

        let funding = self
            .ctx
            .ledger
            .signed_transaction(TransactionRequest {
                amount: 1,
                destination: launcher.puzzle_hash,
                fee,
                origin_id,
                coins,
                announcements_to_assert: vec![announcement],
            })
            .await?;

        let launcher_spend = CoinSpend::new(launcher, puzzles.launcher_puzzle(), launcher_solution);

        let eve = Coin::new(launcher_id, full_hash, 1);
        let eve_solution = Program::list(vec![
            Program::list(vec![
                Program::from(launcher.parent_coin_info),
                Program::from(launcher.amount),
            ]),
            Program::from(1u64),
            eve_inner_solution,
        ]);
        let eve_spend = CoinSpend::new(eve, full_puzzle, eve_solution);

        let spend_bundle = SpendBundle::aggregate(vec![
            funding.spend_bundle.clone(),
            SpendBundle::unsigned(vec![eve_spend]),
            SpendBundle::unsigned(vec![launcher_spend]),
        ]);
        let summary = spend_bundle.check_consistency(|spend| puzzles.conditions_for_spend(spend))?;

        let child = Coin::new(eve.coin_id(), full_hash, 1);
        if !summary.additions.contains(&child) {
            return Err(DaoError::ProtocolViolation(format!(
                "eve spend of {} does not recreate the singleton",
                launcher_id
            )));
        }
        debug!(
            "Singleton {} launched: {} spends, fee {}",
            launcher_id,
            spend_bundle.coin_spends.len(),
            summary.fee
        );

        Ok(SingletonLaunch {
            launcher,
            eve,
            child,
            spend_bundle,
            summary,
            funding,
        })
    }

    fn record_launch_lineage(
        state: &mut DaoState,
        launch: &SingletonLaunch,
        inner_hash: Bytes32,
    ) -> DaoResult<()> {
        let launcher = &launch.launcher;
        state.lineage.append(
            launcher.coin_id(),
            LineageProof::new(launcher.parent_coin_info, launcher.puzzle_hash, launcher.amount),
        )?;
        state.lineage.append(
            launch.eve.coin_id(),
            LineageProof::for_coin(&launch.eve, inner_hash),
        )?;
        Ok(())
    }

    fn to_dao_spend(&self, launch: SingletonLaunch) -> DaoSpend {
        let record = TransactionRecord {
            name: launch.spend_bundle.name(),
            created_at_time: current_time(),
            to_puzzle_hash: launch.funding.to_puzzle_hash,
            amount: launch.funding.amount,
            fee_amount: launch.funding.fee_amount,
            spend_bundle: launch.spend_bundle.clone(),
            additions: launch.summary.additions,
            removals: launch.spend_bundle.removals(),
            wallet_id: self.id(),
        };
        DaoSpend {
            launcher_id: launch.launcher.coin_id(),
            eve_coin: launch.eve,
            singleton_coin: launch.child,
            spend_bundle: launch.spend_bundle,
            record,
        }
    }

    /// Undoes a treasury launch that failed after its token wallet was
    /// created: the wallet is removed and the pre-launch state restored.
    async fn abandon_launch(
        &mut self,
        snapshot: DaoState,
        token_wallet_id: u32,
        cause: DaoError,
    ) -> DaoError {
        warn!(
            "Treasury construction failed after minting into wallet {}: {}",
            token_wallet_id, cause
        );
        if snapshot.token_wallet_id == Some(token_wallet_id) {
            warn!("Keeping token wallet {}, it was bound before the launch", token_wallet_id);
        } else if let Err(e) = self.ctx.tokens.remove_wallet(token_wallet_id).await {
            error!("Failed to remove token wallet {}: {}", token_wallet_id, e);
        }
        self.restore_state(snapshot).await;
        DaoError::PartialConstruction {
            wallet_id: token_wallet_id,
            source: Box::new(cause),
        }
    }

    async fn restore_state(&mut self, snapshot: DaoState) {
        if let Err(e) = self.save_state(snapshot).await {
            error!("Failed to persist restored state of wallet {}: {}", self.id(), e);
        }
    }
}

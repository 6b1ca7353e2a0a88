use log::{debug, error, info, warn};

use super::interfaces::{PeerQuery, TokenWalletKind, TokenWalletRef};
use super::lineage::LineageProof;
use super::DaoWallet;
use crate::blockchain::{Bytes32, Coin, CoinState};
use crate::errors::{DaoError, DaoResult};

/// How the tip's parent was spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKind {
    /// The spend recreated the singleton with the same puzzle
    Eve,
    /// The spend moved the treasury to a new inner puzzle
    StateChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncOutcome {
    pub tip: Coin,
    pub hops: usize,
    pub spend_kind: SpendKind,
    pub token_wallet: TokenWalletRef,
}

/// The last two coins of a singleton chain
struct ChainWalk {
    prior: CoinState,
    tip: CoinState,
    hops: usize,
}

/// Follows odd-amount children from the launcher until a coin has none
async fn walk_to_tip(peer: &dyn PeerQuery, treasury_id: Bytes32) -> DaoResult<ChainWalk> {
    let mut frontier: Option<CoinState> = None;
    let mut prior_frontier: Option<CoinState> = None;
    let mut hops = 0;

    loop {
        let frontier_id = frontier
            .as_ref()
            .map_or(treasury_id, |state| state.coin.coin_id());
        let children = peer.fetch_children(&frontier_id).await?;
        if children.is_empty() {
            break;
        }
        let mut odd = children
            .into_iter()
            .filter(|state| state.coin.is_singleton_output());
        let child = odd.next().ok_or_else(|| {
            DaoError::ProtocolViolation(format!(
                "spend of {} created no odd-amount child",
                frontier_id
            ))
        })?;
        if odd.next().is_some() {
            return Err(DaoError::ProtocolViolation(format!(
                "spend of {} created more than one odd-amount child",
                frontier_id
            )));
        }
        debug!("Treasury hop {}: {} -> {}", hops + 1, frontier_id, child.coin.coin_id());
        prior_frontier = frontier.replace(child);
        hops += 1;
    }

    match (prior_frontier, frontier) {
        (_, None) => Err(DaoError::NotYetConfirmed(treasury_id)),
        (None, Some(tip)) => Err(DaoError::ProtocolViolation(format!(
            "eve coin {} of treasury {} was never spent",
            tip.coin.coin_id(),
            treasury_id
        ))),
        (Some(prior), Some(tip)) => Ok(ChainWalk { prior, tip, hops }),
    }
}

impl DaoWallet {
    /// Walks the treasury singleton from its launcher to the newest coin and
    /// records it as current. Every chain read happens before the state is
    /// touched. A voting wallet created for a resync whose state cannot be
    /// stored is removed again.
    pub async fn resync_treasury_state(&mut self) -> DaoResult<ResyncOutcome> {
        let treasury_id = self.state.treasury_id;
        if !self.state.has_treasury() {
            return Err(DaoError::Validation("wallet has no treasury to resync".into()));
        }
        let peer = self.ctx.peers.full_node_peer().ok_or_else(|| {
            DaoError::TransientNetwork(
                "could not find any peers to request puzzle and solution from".into(),
            )
        })?;

        let ChainWalk { prior, tip, hops } = walk_to_tip(peer.as_ref(), treasury_id).await?;
        let height = tip.created_height.ok_or_else(|| {
            DaoError::ProtocolViolation(format!(
                "treasury coin {} has no creation height",
                tip.coin.coin_id()
            ))
        })?;
        let parent_spend = peer.fetch_puzzle_solution(height, &prior.coin).await?;

        let puzzles = &self.ctx.puzzles;
        let prior_inner = puzzles
            .inner_puzzle_from_singleton(&parent_spend.puzzle_reveal)
            .ok_or_else(|| {
                DaoError::ProtocolViolation(format!(
                    "spend of {} is not a singleton spend",
                    prior.coin.coin_id()
                ))
            })?;

        let (current_inner, spend_kind) =
            if parent_spend.puzzle_reveal.tree_hash() == tip.coin.puzzle_hash {
                (prior_inner.clone(), SpendKind::Eve)
            } else {
                let inner_solution = parent_spend
                    .solution
                    .rest()
                    .and_then(|rest| rest.rest())
                    .and_then(|rest| rest.first())
                    .ok_or_else(|| {
                        DaoError::ProtocolViolation(format!(
                            "spend of {} carries no inner solution",
                            prior.coin.coin_id()
                        ))
                    })?;
                let next = puzzles
                    .decode_new_inner_puzzle(&prior_inner, inner_solution)
                    .map_err(|e| {
                        DaoError::ProtocolViolation(format!(
                            "cannot decode treasury puzzle after spend of {}: {}",
                            prior.coin.coin_id(),
                            e
                        ))
                    })?;
                (next, SpendKind::StateChange)
            };

        let tail_hash = puzzles.tail_from_treasury_puzzle(&prior_inner).ok_or_else(|| {
            DaoError::ProtocolViolation("treasury puzzle does not commit to a token tail".into())
        })?;

        let mut next = self.state.clone();
        next.lineage.append(
            prior.coin.coin_id(),
            LineageProof::for_coin(&prior.coin, prior_inner.tree_hash()),
        )?;
        next.lineage.append(
            tip.coin.coin_id(),
            LineageProof::for_coin(&tip.coin, current_inner.tree_hash()),
        )?;
        next.current_coin = Some(tip.coin);
        next.current_inner_puzzle = Some(current_inner);

        let (token_wallet, created) = self.voting_wallet_for_tail(tail_hash).await?;
        next.token_wallet_id = Some(token_wallet.wallet_id);
        let previous = self.state.clone();
        if let Err(e) = self.save_state(next).await {
            if created {
                warn!(
                    "Removing voting wallet {} after failed resync of {}",
                    token_wallet.wallet_id, treasury_id
                );
                let removed = self.ctx.tokens.remove_wallet(token_wallet.wallet_id).await;
                if let Err(remove_err) = removed {
                    error!(
                        "Failed to remove voting wallet {}: {}",
                        token_wallet.wallet_id, remove_err
                    );
                }
                self.state = previous;
            }
            return Err(e);
        }

        info!(
            "Treasury {} resynced to {} after {} hops ({:?})",
            treasury_id,
            tip.coin.coin_id(),
            hops,
            spend_kind
        );
        Ok(ResyncOutcome {
            tip: tip.coin,
            hops,
            spend_kind,
            token_wallet,
        })
    }

    /// Keeps the bound token wallet when it tracks `tail_hash`, otherwise
    /// finds or creates a voting wallet for it. The flag is set when the
    /// wallet was created by this call.
    async fn voting_wallet_for_tail(
        &self,
        tail_hash: Bytes32,
    ) -> DaoResult<(TokenWalletRef, bool)> {
        let tokens = &self.ctx.tokens;
        if let Some(bound_id) = self.state.token_wallet_id {
            match tokens.wallet(bound_id).await? {
                Some(bound) if bound.tail_hash == tail_hash => return Ok((bound, false)),
                Some(bound) => warn!(
                    "Token wallet {} tracks tail {}, treasury uses {}",
                    bound_id, bound.tail_hash, tail_hash
                ),
                None => warn!("Bound token wallet {} no longer exists", bound_id),
            }
        }
        if let Some(existing) = tokens.find_by_tail(&tail_hash, TokenWalletKind::Voting).await? {
            return Ok((existing, false));
        }
        info!("Creating voting token wallet for tail {}", tail_hash);
        Ok((tokens.create_voting_wallet(&tail_hash).await?, true))
    }

    /// Whether `coin_id` has been spent, judged by it having children
    pub async fn is_spend_retrievable(&self, coin_id: &Bytes32) -> DaoResult<bool> {
        let peer = self.ctx.peers.full_node_peer().ok_or_else(|| {
            DaoError::TransientNetwork("no full node peer available".into())
        })?;
        Ok(!peer.fetch_children(coin_id).await?.is_empty())
    }
}

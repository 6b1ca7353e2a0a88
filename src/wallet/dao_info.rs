use serde::{Deserialize, Serialize};

use super::lineage::{LineageProof, LineageTracker};
use crate::blockchain::{Bytes32, Coin, Program};
use crate::errors::{DaoError, DaoResult};

/// Percentages are integer basis points in `0..=MAX_BASIS_POINTS`
pub const MAX_BASIS_POINTS: u64 = 10_000;

/// Parameters a treasury puzzle is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryRules {
    pub supply: u64,
    pub attendance_required: u64,
    pub pass_percentage: u64,
    pub proposal_timelock: u64,
}

impl TreasuryRules {
    pub fn validate(&self) -> DaoResult<()> {
        if self.attendance_required > MAX_BASIS_POINTS {
            return Err(DaoError::Validation(format!(
                "attendance required percentage must be between 0 and {}, got {}",
                MAX_BASIS_POINTS, self.attendance_required
            )));
        }
        if self.pass_percentage > MAX_BASIS_POINTS {
            return Err(DaoError::Validation(format!(
                "proposal pass percentage must be between 0 and {}, got {}",
                MAX_BASIS_POINTS, self.pass_percentage
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Eve spend confirmed, no votes yet
    Created,
    Voting,
    Passed,
    Failed,
    /// Oracle spend released the locked tokens
    Closed,
}

impl ProposalState {
    pub fn can_transition_to(self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Created, Created)
                | (Created, Voting)
                | (Voting, Voting)
                | (Voting, Passed)
                | (Voting, Failed)
                | (Passed, Passed)
                | (Failed, Failed)
                | (Passed, Closed)
                | (Failed, Closed)
                | (Closed, Closed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInfo {
    pub proposal_id: Bytes32,
    pub current_inner_puzzle: Program,
    pub yes_votes: u64,
    pub total_votes: u64,
    pub timelock: u64,
    pub state: ProposalState,
}

impl ProposalInfo {
    pub fn created(proposal_id: Bytes32, inner_puzzle: Program, timelock: u64) -> Self {
        Self {
            proposal_id,
            current_inner_puzzle: inner_puzzle,
            yes_votes: 0,
            total_votes: 0,
            timelock,
            state: ProposalState::Created,
        }
    }
}

/// Tallies and state a confirmed proposal spend reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalUpdate {
    pub proposal_id: Bytes32,
    pub current_inner_puzzle: Option<Program>,
    pub yes_votes: u64,
    pub total_votes: u64,
    pub state: ProposalState,
}

/// Everything the wallet knows about one DAO; persisted as the wallet
/// record's JSON after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoState {
    /// Launcher id of the treasury singleton
    pub treasury_id: Bytes32,
    pub token_wallet_id: Option<u32>,
    pub proposals: Vec<ProposalInfo>,
    #[serde(rename = "lineage_table")]
    pub lineage: LineageTracker,
    /// Most recently observed unspent treasury coin
    pub current_coin: Option<Coin>,
    pub current_inner_puzzle: Option<Program>,
    #[serde(default)]
    pub treasury_rules: Option<TreasuryRules>,
}

impl DaoState {
    pub fn new(treasury_id: Bytes32) -> Self {
        Self {
            treasury_id,
            token_wallet_id: None,
            proposals: Vec::new(),
            lineage: LineageTracker::new(),
            current_coin: None,
            current_inner_puzzle: None,
            treasury_rules: None,
        }
    }

    pub fn has_treasury(&self) -> bool {
        !self.treasury_id.is_zero()
    }

    pub fn to_json(&self) -> DaoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> DaoResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Lineage proof for spending the current treasury coin
    pub fn current_lineage_proof(&self) -> Option<&LineageProof> {
        self.current_coin
            .as_ref()
            .and_then(|coin| self.lineage.lookup_parent(coin))
    }

    pub fn proposal(&self, proposal_id: &Bytes32) -> Option<&ProposalInfo> {
        self.proposals.iter().find(|p| &p.proposal_id == proposal_id)
    }

    pub fn add_proposal(&mut self, info: ProposalInfo) -> DaoResult<()> {
        if self.proposal(&info.proposal_id).is_some() {
            return Err(DaoError::Validation(format!(
                "proposal {} is already tracked",
                info.proposal_id
            )));
        }
        self.proposals.push(info);
        Ok(())
    }

    /// Applies tallies reported for a confirmed proposal spend. Votes only
    /// accumulate and the state only moves forward.
    pub fn apply_proposal_update(&mut self, update: ProposalUpdate) -> DaoResult<()> {
        let proposal = self
            .proposals
            .iter_mut()
            .find(|p| p.proposal_id == update.proposal_id)
            .ok_or_else(|| {
                DaoError::ProtocolViolation(format!(
                    "update for unknown proposal {}",
                    update.proposal_id
                ))
            })?;

        if update.yes_votes > update.total_votes {
            return Err(DaoError::ProtocolViolation(format!(
                "proposal {} reports {} yes votes out of {}",
                update.proposal_id, update.yes_votes, update.total_votes
            )));
        }
        if update.yes_votes < proposal.yes_votes || update.total_votes < proposal.total_votes {
            return Err(DaoError::ProtocolViolation(format!(
                "proposal {} tallies went backwards: {}/{} -> {}/{}",
                update.proposal_id,
                proposal.yes_votes,
                proposal.total_votes,
                update.yes_votes,
                update.total_votes
            )));
        }
        if !proposal.state.can_transition_to(update.state) {
            return Err(DaoError::ProtocolViolation(format!(
                "proposal {} cannot move from {:?} to {:?}",
                update.proposal_id, proposal.state, update.state
            )));
        }

        proposal.yes_votes = update.yes_votes;
        proposal.total_votes = update.total_votes;
        proposal.state = update.state;
        if let Some(inner) = update.current_inner_puzzle {
            proposal.current_inner_puzzle = inner;
        }
        Ok(())
    }
}

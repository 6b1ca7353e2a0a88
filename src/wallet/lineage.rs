use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Bytes32, Coin, Program};
use crate::errors::{DaoError, DaoResult};

/// Ancestry evidence for a singleton coin: enough to validate a spend of
/// its child without replaying the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageProof {
    pub parent_coin_info: Bytes32,
    pub inner_puzzle_hash: Bytes32,
    pub amount: u64,
}

impl LineageProof {
    pub fn new(parent_coin_info: Bytes32, inner_puzzle_hash: Bytes32, amount: u64) -> Self {
        Self {
            parent_coin_info,
            inner_puzzle_hash,
            amount,
        }
    }

    /// Proof describing `coin` itself, given the inner puzzle it was locked with
    pub fn for_coin(coin: &Coin, inner_puzzle_hash: Bytes32) -> Self {
        Self::new(coin.parent_coin_info, inner_puzzle_hash, coin.amount)
    }

    /// `(parent inner_puzzle_hash amount)` as a singleton solution expects it
    pub fn to_program(&self) -> Program {
        Program::list(vec![
            Program::from(self.parent_coin_info),
            Program::from(self.inner_puzzle_hash),
            Program::from(self.amount),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub coin_id: Bytes32,
    pub proof: LineageProof,
}

/// Whether an append grew the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Recorded,
    AlreadyKnown,
}

/// Append-only map from coin identity to lineage proof for the coins of
/// one DAO. Never holds two different proofs for one coin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LineageEntry>", into = "Vec<LineageEntry>")]
pub struct LineageTracker {
    entries: Vec<LineageEntry>,
    index: HashMap<Bytes32, usize>,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, coin_id: Bytes32, proof: LineageProof) -> DaoResult<AppendOutcome> {
        if let Some(existing) = self.lookup(&coin_id) {
            if *existing == proof {
                return Ok(AppendOutcome::AlreadyKnown);
            }
            return Err(DaoError::ProtocolViolation(format!(
                "lineage for coin {} already recorded as {:?}, refusing {:?}",
                coin_id, existing, proof
            )));
        }

        info!("Adding parent {}: {:?}", coin_id, proof);
        self.index.insert(coin_id, self.entries.len());
        self.entries.push(LineageEntry { coin_id, proof });
        Ok(AppendOutcome::Recorded)
    }

    pub fn lookup(&self, coin_id: &Bytes32) -> Option<&LineageProof> {
        self.index.get(coin_id).map(|&i| &self.entries[i].proof)
    }

    /// The proof needed to spend `coin`: the one recorded for its parent
    pub fn lookup_parent(&self, coin: &Coin) -> Option<&LineageProof> {
        self.lookup(&coin.parent_coin_info)
    }

    pub fn contains(&self, coin_id: &Bytes32) -> bool {
        self.index.contains_key(coin_id)
    }

    pub fn entries(&self) -> &[LineageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<LineageEntry>> for LineageTracker {
    fn from(entries: Vec<LineageEntry>) -> Self {
        let mut tracker = LineageTracker::new();
        for entry in entries {
            // a persisted log may predate duplicate filtering
            if let Err(e) = tracker.append(entry.coin_id, entry.proof) {
                warn!("Dropping persisted lineage entry: {}", e);
            }
        }
        tracker
    }
}

impl From<LineageTracker> for Vec<LineageEntry> {
    fn from(tracker: LineageTracker) -> Self {
        tracker.entries
    }
}

use std::collections::HashSet;

use log::debug;

use super::{sha256, Bytes32, Coin, Program};
use crate::crypto::Signature;
use crate::errors::{DaoError, DaoResult};

pub const AGG_SIG_ME: u64 = 50;
pub const CREATE_COIN: u64 = 51;
pub const RESERVE_FEE: u64 = 52;
pub const CREATE_COIN_ANNOUNCEMENT: u64 = 60;
pub const ASSERT_COIN_ANNOUNCEMENT: u64 = 61;

/// A message created by one coin's spend and asserted by another
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Announcement {
    pub origin_id: Bytes32,
    pub message: Vec<u8>,
}

impl Announcement {
    pub fn new(origin_id: Bytes32, message: impl Into<Vec<u8>>) -> Self {
        Announcement {
            origin_id,
            message: message.into(),
        }
    }

    /// The identifier an asserting spend commits to
    pub fn name(&self) -> Bytes32 {
        sha256(&[self.origin_id.as_ref(), &self.message])
    }
}

/// Output of running a spend's puzzle with its solution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    AggSigMe { public_key: Vec<u8>, message: Vec<u8> },
    CreateCoin { puzzle_hash: Bytes32, amount: u64 },
    ReserveFee { amount: u64 },
    CreateCoinAnnouncement { message: Vec<u8> },
    AssertCoinAnnouncement { announcement_id: Bytes32 },
    Other(Program),
}

impl Condition {
    pub fn to_program(&self) -> Program {
        match self {
            Condition::AggSigMe {
                public_key,
                message,
            } => Program::list(vec![
                Program::from(AGG_SIG_ME),
                Program::atom(public_key.clone()),
                Program::atom(message.clone()),
            ]),
            Condition::CreateCoin {
                puzzle_hash,
                amount,
            } => Program::list(vec![
                Program::from(CREATE_COIN),
                Program::from(*puzzle_hash),
                Program::from(*amount),
            ]),
            Condition::ReserveFee { amount } => {
                Program::list(vec![Program::from(RESERVE_FEE), Program::from(*amount)])
            }
            Condition::CreateCoinAnnouncement { message } => Program::list(vec![
                Program::from(CREATE_COIN_ANNOUNCEMENT),
                Program::atom(message.clone()),
            ]),
            Condition::AssertCoinAnnouncement { announcement_id } => Program::list(vec![
                Program::from(ASSERT_COIN_ANNOUNCEMENT),
                Program::from(*announcement_id),
            ]),
            Condition::Other(program) => program.clone(),
        }
    }

    /// Unknown opcodes are kept as `Other`; known opcodes with bad
    /// arguments are rejected.
    pub fn from_program(program: &Program) -> Option<Self> {
        let args = program.to_list()?;
        let opcode = args.first()?.as_u64();
        let condition = match (opcode, args.len()) {
            (Some(AGG_SIG_ME), 3) => Condition::AggSigMe {
                public_key: args[1].as_atom()?.to_vec(),
                message: args[2].as_atom()?.to_vec(),
            },
            (Some(CREATE_COIN), n) if n >= 3 => Condition::CreateCoin {
                puzzle_hash: args[1].as_bytes32()?,
                amount: args[2].as_u64()?,
            },
            (Some(RESERVE_FEE), 2) => Condition::ReserveFee {
                amount: args[1].as_u64()?,
            },
            (Some(CREATE_COIN_ANNOUNCEMENT), 2) => Condition::CreateCoinAnnouncement {
                message: args[1].as_atom()?.to_vec(),
            },
            (Some(ASSERT_COIN_ANNOUNCEMENT), 2) => Condition::AssertCoinAnnouncement {
                announcement_id: args[1].as_bytes32()?,
            },
            (Some(AGG_SIG_ME), _)
            | (Some(CREATE_COIN), _)
            | (Some(RESERVE_FEE), _)
            | (Some(CREATE_COIN_ANNOUNCEMENT), _)
            | (Some(ASSERT_COIN_ANNOUNCEMENT), _) => return None,
            _ => Condition::Other(program.clone()),
        };
        Some(condition)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinSpend {
    pub coin: Coin,
    pub puzzle_reveal: Program,
    pub solution: Program,
}

impl CoinSpend {
    pub fn new(coin: Coin, puzzle_reveal: Program, solution: Program) -> Self {
        CoinSpend {
            coin,
            puzzle_reveal,
            solution,
        }
    }
}

/// Coins a bundle creates and the fee it leaves to the farmer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleSummary {
    pub additions: Vec<Coin>,
    pub fee: u64,
}

/// An atomically applied set of coin spends
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendBundle {
    pub coin_spends: Vec<CoinSpend>,
    pub aggregated_signature: Signature,
}

impl SpendBundle {
    pub fn new(coin_spends: Vec<CoinSpend>, aggregated_signature: Signature) -> Self {
        SpendBundle {
            coin_spends,
            aggregated_signature,
        }
    }

    /// A bundle whose puzzles require no signature
    pub fn unsigned(coin_spends: Vec<CoinSpend>) -> Self {
        SpendBundle::new(coin_spends, Signature::identity())
    }

    pub fn aggregate(bundles: Vec<SpendBundle>) -> Self {
        let signature = Signature::aggregate(bundles.iter().map(|b| &b.aggregated_signature));
        let coin_spends = bundles.into_iter().flat_map(|b| b.coin_spends).collect();
        SpendBundle::new(coin_spends, signature)
    }

    pub fn removals(&self) -> Vec<Coin> {
        self.coin_spends.iter().map(|cs| cs.coin).collect()
    }

    pub fn name(&self) -> Bytes32 {
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(self.coin_spends.len() * 3 + 1);
        for spend in &self.coin_spends {
            parts.push(spend.coin.coin_id().as_ref().to_vec());
            parts.push(spend.puzzle_reveal.tree_hash().as_ref().to_vec());
            parts.push(spend.solution.tree_hash().as_ref().to_vec());
        }
        parts.push(self.aggregated_signature.to_bytes().to_vec());
        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        sha256(&refs)
    }

    /// Runs every spend through `execute` and checks that the bundle holds
    /// together on its own: no coin spent twice, every asserted announcement
    /// created inside the bundle, and outputs covered by inputs plus any
    /// reserved fee.
    pub fn check_consistency<F>(&self, mut execute: F) -> DaoResult<BundleSummary>
    where
        F: FnMut(&CoinSpend) -> DaoResult<Vec<Condition>>,
    {
        let mut removed = HashSet::new();
        let mut created_announcements = HashSet::new();
        let mut asserted = Vec::new();
        let mut additions = Vec::new();
        let mut total_in: u64 = 0;
        let mut total_out: u64 = 0;
        let mut reserved: u64 = 0;

        for spend in &self.coin_spends {
            let coin_id = spend.coin.coin_id();
            if !removed.insert(coin_id) {
                return Err(DaoError::ProtocolViolation(format!(
                    "coin {} is spent twice in one bundle",
                    coin_id
                )));
            }
            total_in = total_in
                .checked_add(spend.coin.amount)
                .ok_or_else(|| DaoError::ProtocolViolation("bundle input overflow".into()))?;

            for condition in execute(spend)? {
                match condition {
                    Condition::CreateCoin {
                        puzzle_hash,
                        amount,
                    } => {
                        total_out = total_out.checked_add(amount).ok_or_else(|| {
                            DaoError::ProtocolViolation("bundle output overflow".into())
                        })?;
                        additions.push(Coin::new(coin_id, puzzle_hash, amount));
                    }
                    Condition::CreateCoinAnnouncement { message } => {
                        created_announcements.insert(Announcement::new(coin_id, message).name());
                    }
                    Condition::AssertCoinAnnouncement { announcement_id } => {
                        asserted.push((coin_id, announcement_id));
                    }
                    Condition::ReserveFee { amount } => {
                        reserved = reserved.saturating_add(amount);
                    }
                    Condition::AggSigMe { .. } | Condition::Other(_) => {}
                }
            }
        }

        for (asserting_coin, announcement_id) in &asserted {
            if !created_announcements.contains(announcement_id) {
                return Err(DaoError::ProtocolViolation(format!(
                    "coin {} asserts announcement {} which no spend in the bundle creates",
                    asserting_coin, announcement_id
                )));
            }
        }

        let fee = total_in.checked_sub(total_out).ok_or_else(|| {
            DaoError::ProtocolViolation(format!(
                "bundle creates {} but only spends {}",
                total_out, total_in
            ))
        })?;
        if fee < reserved {
            return Err(DaoError::ProtocolViolation(format!(
                "bundle reserves a fee of {} but leaves only {}",
                reserved, fee
            )));
        }

        debug!(
            "Bundle {} checked: {} spends, {} additions, fee {}",
            self.name(),
            self.coin_spends.len(),
            additions.len(),
            fee
        );
        Ok(BundleSummary { additions, fee })
    }
}

/// What the host records and broadcasts for a constructed bundle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub name: Bytes32,
    pub created_at_time: u64,
    pub to_puzzle_hash: Bytes32,
    pub amount: u64,
    pub fee_amount: u64,
    pub spend_bundle: SpendBundle,
    pub additions: Vec<Coin>,
    pub removals: Vec<Coin>,
    pub wallet_id: u32,
}

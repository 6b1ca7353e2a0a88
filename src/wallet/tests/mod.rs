use super::*;
use crate::blockchain::{CoinSpend, Program};
use crate::storage::WalletStore;
use crate::wallet::interfaces::PuzzleLibrary;
use crate::wallet::test_helpers::{FakeHost, FakePuzzleLibrary};

mod spend_builder_tests;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn example_rules() -> TreasuryRules {
    TreasuryRules {
        supply: 1000,
        attendance_required: 10,
        pass_percentage: 10,
        proposal_timelock: 10,
    }
}

/// A freshly recorded wallet that tracks no treasury yet
pub async fn empty_wallet(ctx: DaoContext) -> DaoWallet {
    DaoWallet::create_record(ctx, DaoState::new(Bytes32::default()), None)
        .await
        .unwrap()
}

/// A wallet whose treasury creation bundle is confirmed on the fake chain
pub async fn launched_wallet(host: &FakeHost) -> (DaoWallet, DaoSpend) {
    let mut wallet = empty_wallet(host.context()).await;
    let spend = wallet.generate_new_dao(example_rules(), 0).await.unwrap();
    host.confirm(&spend.spend_bundle).unwrap();
    (wallet, spend)
}

/// Spends the wallet's current treasury coin with `inner_solution`
pub fn treasury_spend(wallet: &DaoWallet, inner_solution: Program) -> CoinSpend {
    let state = wallet.state();
    let coin = state.current_coin.unwrap();
    let inner = state.current_inner_puzzle.clone().unwrap();
    let full = FakePuzzleLibrary.curry_singleton(&state.treasury_id, &inner);
    let solution = Program::list(vec![
        state.current_lineage_proof().unwrap().to_program(),
        Program::from(coin.amount),
        inner_solution,
    ]);
    CoinSpend::new(coin, full, solution)
}

/// Inner solution moving the treasury to `next_inner`
pub fn state_change_solution(next_inner: &Program) -> Program {
    Program::list(vec![
        Program::from(1u64),
        Program::from(0u64),
        Program::from(next_inner.tree_hash()),
        Program::nil(),
        next_inner.clone(),
    ])
}

pub async fn persisted_state(host: &FakeHost, wallet_id: u32) -> DaoState {
    let info = host.store.get_wallet(wallet_id).await.unwrap().unwrap();
    DaoState::from_json(&info.data).unwrap()
}

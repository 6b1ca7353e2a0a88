use std::collections::HashSet;
use std::sync::Arc;

use super::*;
use crate::blockchain::{Announcement, Condition};
use crate::errors::DaoError;
use crate::wallet::interfaces::{MockLedgerWallet, TokenWalletKind};

fn context_with_ledger(host: &FakeHost, ledger: MockLedgerWallet) -> DaoContext {
    let mut ctx = host.context();
    ctx.ledger = Arc::new(ledger);
    ctx
}

#[tokio::test]
async fn test_example_treasury_bundle() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let funding_coin = host.ledger.coins()[0];
    let minting_coin = host.ledger.coins()[1];
    let mut wallet = empty_wallet(host.context()).await;

    let spend = wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let bundle = &spend.spend_bundle;
    assert_eq!(bundle.coin_spends.len(), 3);
    assert_eq!(bundle.coin_spends[0].coin, funding_coin);
    assert_eq!(bundle.coin_spends[1].coin, spend.eve_coin);
    assert_eq!(bundle.coin_spends[2].coin.coin_id(), spend.launcher_id);
    assert_eq!(spend.eve_coin.parent_coin_info, spend.launcher_id);

    assert_eq!(spend.singleton_coin.amount, 1);
    assert_eq!(spend.singleton_coin.parent_coin_info, spend.eve_coin.coin_id());
    assert!(spend.record.additions.contains(&spend.singleton_coin));
    assert_eq!(spend.record.fee_amount, 0);
    assert_eq!(spend.record.name, bundle.name());
    assert_eq!(spend.record.removals, bundle.removals());
    assert_eq!(spend.record.wallet_id, wallet.id());

    let summary = bundle
        .check_consistency(|cs| host.puzzles.conditions_for_spend(cs))
        .unwrap();
    assert_eq!(summary.fee, 0);

    let issuances = host.tokens.issuances();
    assert_eq!(issuances.len(), 1);
    assert_eq!(issuances[0].1, 1000);
    assert_eq!(issuances[0].0.minting_coins, vec![minting_coin]);
    assert_eq!(issuances[0].0.treasury_id, spend.launcher_id);
}

#[tokio::test]
async fn test_treasury_state_after_creation() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut wallet = empty_wallet(host.context()).await;
    let spend = wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let state = wallet.state();
    assert_eq!(state.treasury_id, spend.launcher_id);
    assert_eq!(state.current_coin, Some(spend.singleton_coin));
    assert_eq!(state.treasury_rules, Some(example_rules()));

    let token_wallet = host.tokens.wallets()[0].clone();
    assert_eq!(state.token_wallet_id, Some(token_wallet.wallet_id));
    assert_eq!(token_wallet.kind, TokenWalletKind::Standard);

    let inner = state.current_inner_puzzle.clone().unwrap();
    assert_eq!(
        host.puzzles.tail_from_treasury_puzzle(&inner),
        Some(token_wallet.tail_hash)
    );
    let launcher_proof = state.lineage.lookup(&spend.launcher_id).unwrap();
    assert_eq!(launcher_proof.amount, 1);
    let eve_proof = state.lineage.lookup(&spend.eve_coin.coin_id()).unwrap();
    assert_eq!(eve_proof.parent_coin_info, spend.launcher_id);
    assert_eq!(eve_proof.inner_puzzle_hash, inner.tree_hash());
    assert_eq!(state.current_lineage_proof(), Some(eve_proof));

    assert_eq!(&persisted_state(&host, wallet.id()).await, state);
}

#[tokio::test]
async fn test_fee_is_reserved_and_change_returned() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut wallet = empty_wallet(host.context()).await;
    let spend = wallet.generate_new_dao(example_rules(), 50).await.unwrap();

    let summary = spend
        .spend_bundle
        .check_consistency(|cs| host.puzzles.conditions_for_spend(cs))
        .unwrap();
    assert_eq!(summary.fee, 50);
    assert_eq!(spend.record.fee_amount, 50);
    let change: Vec<_> = summary
        .additions
        .iter()
        .filter(|coin| coin.puzzle_hash == host.ledger.puzzle_hash())
        .collect();
    assert_eq!(change.len(), 1);
    assert_eq!(change[0].amount, 5000 - 50 - 1);

    let request = &host.ledger.requests()[0];
    assert_eq!(request.amount, 1);
    assert_eq!(request.fee, 50);
    assert_eq!(request.announcements_to_assert.len(), 1);
    assert_eq!(request.announcements_to_assert[0].origin_id, spend.launcher_id);
}

#[tokio::test]
async fn test_every_assertion_is_satisfied_in_bundle() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut wallet = empty_wallet(host.context()).await;
    let spend = wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let mut created = HashSet::new();
    let mut asserted = Vec::new();
    for cs in &spend.spend_bundle.coin_spends {
        for condition in host.puzzles.conditions_for_spend(cs).unwrap() {
            match condition {
                Condition::CreateCoinAnnouncement { message } => {
                    created.insert(Announcement::new(cs.coin.coin_id(), message).name());
                }
                Condition::AssertCoinAnnouncement { announcement_id } => {
                    asserted.push(announcement_id)
                }
                _ => {}
            }
        }
    }
    assert!(!asserted.is_empty());
    assert!(asserted.iter().all(|id| created.contains(id)));

    // a launcher solving for another puzzle hash breaks the funding assertion
    let mut tampered = spend.spend_bundle.clone();
    tampered.coin_spends[2].solution = Program::list(vec![
        Program::from(Bytes32::new([9; 32])),
        Program::from(1u64),
        Program::nil(),
    ]);
    let result = tampered.check_consistency(|cs| host.puzzles.conditions_for_spend(cs));
    assert!(matches!(result, Err(DaoError::ProtocolViolation(_))));
}

#[tokio::test]
async fn test_out_of_range_pass_percentage_selects_no_coins() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut ledger = MockLedgerWallet::new();
    ledger.expect_select_coins().times(0);
    ledger.expect_signed_transaction().times(0);
    let mut wallet = empty_wallet(context_with_ledger(&host, ledger)).await;

    let mut rules = example_rules();
    rules.pass_percentage = 10_001;
    let result = wallet.generate_new_dao(rules, 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));

    let mut rules = example_rules();
    rules.attendance_required = 20_000;
    let result = wallet.generate_new_dao(rules, 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));
    assert!(host.tokens.wallets().is_empty());
}

#[tokio::test]
async fn test_boundary_percentages_are_accepted() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut wallet = empty_wallet(host.context()).await;
    let mut rules = example_rules();
    rules.pass_percentage = 10_000;
    rules.attendance_required = 0;
    assert!(wallet.generate_new_dao(rules, 0).await.is_ok());
}

#[tokio::test]
async fn test_no_coins_is_insufficient_funds() {
    init_logging();
    let host = FakeHost::new(&[]);
    let mut wallet = empty_wallet(host.context()).await;
    let before = wallet.state().clone();

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    assert!(matches!(result, Err(DaoError::InsufficientFunds(_))));
    assert_eq!(wallet.state(), &before);
    assert!(host.tokens.wallets().is_empty());
}

#[tokio::test]
async fn test_minting_needs_a_coin_besides_the_origin() {
    init_logging();
    let host = FakeHost::new(&[5000]);
    let mut wallet = empty_wallet(host.context()).await;

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    assert!(matches!(result, Err(DaoError::InsufficientFunds(_))));
    assert!(!wallet.state().has_treasury());
    assert!(host.ledger.requests().is_empty());
}

#[tokio::test]
async fn test_origin_and_minting_coin_collision_rejected() {
    init_logging();
    let host = FakeHost::new(&[]);
    let coin = Coin::new(Bytes32::new([1; 32]), Bytes32::new([2; 32]), 5000);
    let mut ledger = MockLedgerWallet::new();
    ledger
        .expect_select_coins()
        .times(2)
        .returning(move |_, _| Ok(Some(vec![coin])));
    ledger.expect_signed_transaction().times(0);
    let mut wallet = empty_wallet(context_with_ledger(&host, ledger)).await;

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));
    assert!(host.tokens.issuances().is_empty());
}

#[tokio::test]
async fn test_failure_after_mint_removes_token_wallet() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    host.ledger.set_fail_signing(true);
    let mut wallet = empty_wallet(host.context()).await;
    let before = wallet.state().clone();

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    match result {
        Err(DaoError::PartialConstruction { wallet_id, source }) => {
            assert_eq!(host.tokens.issuances().len(), 1);
            assert!(host.tokens.wallets().iter().all(|w| w.wallet_id != wallet_id));
            assert!(matches!(*source, DaoError::Collaborator(_)));
        }
        other => panic!("expected partial construction, got {:?}", other.map(|s| s.launcher_id)),
    }
    assert!(host.tokens.wallets().is_empty());
    assert_eq!(wallet.state(), &before);
    assert_eq!(persisted_state(&host, wallet.id()).await, before);
}

#[tokio::test]
async fn test_token_creation_failure_restores_state() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    host.tokens.set_fail_create(true);
    let mut wallet = empty_wallet(host.context()).await;

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    assert!(matches!(result, Err(DaoError::Collaborator(_))));
    assert!(!wallet.state().has_treasury());
    assert!(!persisted_state(&host, wallet.id()).await.has_treasury());
    assert!(host.ledger.requests().is_empty());
}

fn bound_tail() -> Program {
    Program::list(vec![Program::from(7u64), Program::from(Bytes32::new([7; 32]))])
}

/// An empty wallet already bound to a token wallet issued under `tail`
async fn wallet_bound_to(host: &FakeHost, tail: Program) -> (DaoWallet, u32) {
    let bound = host.tokens.insert_with_tail(tail, TokenWalletKind::Standard);
    let mut wallet = empty_wallet(host.context()).await;
    let mut state = wallet.state().clone();
    state.token_wallet_id = Some(bound.wallet_id);
    wallet.save_state(state).await.unwrap();
    (wallet, bound.wallet_id)
}

#[tokio::test]
async fn test_bound_tail_is_reused_for_minting() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let (mut wallet, bound_id) = wallet_bound_to(&host, bound_tail()).await;

    let spend = wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let issuances = host.tokens.issuances();
    assert_eq!(issuances.len(), 1);
    let (issuance, supply) = &issuances[0];
    assert_eq!(issuance.tail, bound_tail());
    assert_eq!(issuance.treasury_id, spend.launcher_id);
    assert_eq!(*supply, 1000);

    let minted = wallet.token_wallet_id().unwrap();
    assert_ne!(minted, bound_id);
    let inner = wallet.state().current_inner_puzzle.clone().unwrap();
    assert_eq!(
        host.puzzles.tail_from_treasury_puzzle(&inner),
        Some(bound_tail().tree_hash())
    );
}

#[tokio::test]
async fn test_failed_launch_under_bound_tail_keeps_bound_wallet() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    host.ledger.set_fail_signing(true);
    let (mut wallet, bound_id) = wallet_bound_to(&host, bound_tail()).await;
    let before = wallet.state().clone();

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    match result {
        Err(DaoError::PartialConstruction { wallet_id, .. }) => assert_ne!(wallet_id, bound_id),
        other => panic!("expected partial construction, got {:?}", other.map(|s| s.launcher_id)),
    }
    let remaining: Vec<u32> = host.tokens.wallets().iter().map(|w| w.wallet_id).collect();
    assert_eq!(remaining, vec![bound_id]);
    assert_eq!(wallet.state(), &before);
    assert_eq!(persisted_state(&host, wallet.id()).await, before);
}

#[tokio::test]
async fn test_bound_wallet_without_issuance_program_gets_fresh_tail() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let bound = host.tokens.insert(Bytes32::new([7; 32]), TokenWalletKind::Standard);
    let mut wallet = empty_wallet(host.context()).await;
    let mut state = wallet.state().clone();
    state.token_wallet_id = Some(bound.wallet_id);
    wallet.save_state(state).await.unwrap();

    wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let issuances = host.tokens.issuances();
    assert_eq!(issuances.len(), 1);
    assert_ne!(issuances[0].0.tail_hash(), bound.tail_hash);
}

#[tokio::test]
async fn test_second_treasury_in_same_wallet_rejected() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000, 3000]);
    let mut wallet = empty_wallet(host.context()).await;
    wallet.generate_new_dao(example_rules(), 0).await.unwrap();

    let result = wallet.generate_new_dao(example_rules(), 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));
}

#[tokio::test]
async fn test_proposal_embeds_treasury_tail() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let (mut wallet, dao) = launched_wallet(&host).await;
    let tail_hash = host.tokens.wallets()[0].tail_hash;
    let proposed = Bytes32::new([0x42; 32]);

    let spend = wallet.generate_new_proposal(proposed, 0).await.unwrap();

    assert_eq!(spend.spend_bundle.coin_spends.len(), 3);
    spend
        .spend_bundle
        .check_consistency(|cs| host.puzzles.conditions_for_spend(cs))
        .unwrap();

    let proposal = wallet.state().proposal(&spend.launcher_id).unwrap();
    assert_eq!(proposal.state, ProposalState::Created);
    assert_eq!((proposal.yes_votes, proposal.total_votes), (0, 0));
    assert_eq!(proposal.timelock, example_rules().proposal_timelock);

    let inner = &proposal.current_inner_puzzle;
    assert_eq!(inner.nth(1).and_then(Program::as_bytes32), Some(spend.launcher_id));
    assert_eq!(inner.nth(2).and_then(Program::as_bytes32), Some(tail_hash));
    assert_eq!(inner.nth(3).and_then(Program::as_bytes32), Some(dao.launcher_id));
    assert_eq!(inner.nth(4).and_then(Program::as_bytes32), Some(proposed));

    let eve = &spend.spend_bundle.coin_spends[1];
    assert_eq!(eve.solution.nth(2), Some(&Program::nil()));
    assert!(wallet.state().lineage.contains(&spend.eve_coin.coin_id()));
    assert_eq!(wallet.state().current_coin, Some(dao.singleton_coin));
}

#[tokio::test]
async fn test_proposal_needs_treasury_and_token_wallet() {
    init_logging();
    let host = FakeHost::new(&[5000, 2000]);
    let mut wallet = empty_wallet(host.context()).await;
    let result = wallet.generate_new_proposal(Bytes32::new([1; 32]), 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));

    let mut state = DaoState::new(Bytes32::new([3; 32]));
    wallet.save_state(state.clone()).await.unwrap();
    let result = wallet.generate_new_proposal(Bytes32::new([1; 32]), 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));

    state.token_wallet_id = Some(999);
    wallet.save_state(state).await.unwrap();
    let result = wallet.generate_new_proposal(Bytes32::new([1; 32]), 0).await;
    assert!(matches!(result, Err(DaoError::Validation(_))));
    assert!(host.ledger.requests().is_empty());
}

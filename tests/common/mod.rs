use std::sync::Arc;

use dao_wallet::storage::SledWalletStore;
use dao_wallet::wallet::test_helpers::FakeHost;
use dao_wallet::DaoContext;
use tempfile::TempDir;

pub fn init_test_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// A fake host funded with two coins: one pays for launches, one mints
pub fn funded_host() -> FakeHost {
    FakeHost::new(&[10_000, 4_000])
}

/// The host's collaborators with wallet records kept in a sled store
pub fn sled_context(host: &FakeHost, dir: &TempDir) -> DaoContext {
    let store = SledWalletStore::open(&dir.path().join("wallets")).unwrap();
    let mut ctx = host.context();
    ctx.store = Arc::new(store);
    ctx
}

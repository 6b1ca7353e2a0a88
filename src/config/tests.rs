use std::fs;

use super::*;

#[test]
fn test_defaults_match_new_treasury_rules() {
    let config = DaoConfig::default();
    assert!(config.validate().is_ok());
    let rules = config.default_rules(1000);
    assert_eq!(rules.supply, 1000);
    assert_eq!(rules.attendance_required, 10);
    assert_eq!(rules.pass_percentage, 10);
    assert_eq!(rules.proposal_timelock, 10);
}

#[test]
fn test_toml_overrides_only_given_fields() {
    let config = DaoConfig::from_toml_str("pass_percentage = 5100\nproposal_timelock = 250\n").unwrap();
    assert_eq!(config.pass_percentage, 5100);
    assert_eq!(config.proposal_timelock, 250);
    assert_eq!(config.attendance_required, 10);
    assert_eq!(config.wallet_name_prefix, "Profile");
}

#[test]
fn test_out_of_range_basis_points_rejected() {
    let err = DaoConfig::from_toml_str("attendance_required = 10001").unwrap_err();
    assert!(matches!(err, DaoError::Config(ref msg) if msg.contains("attendance_required")));

    let err = DaoConfig::from_toml_str("pass_percentage = 20000").unwrap_err();
    assert!(matches!(err, DaoError::Config(_)));

    let edge = DaoConfig::from_toml_str("pass_percentage = 10000").unwrap();
    assert_eq!(edge.pass_percentage, MAX_BASIS_POINTS);
}

#[test]
fn test_blank_prefix_rejected() {
    let err = DaoConfig::from_toml_str("wallet_name_prefix = \"  \"").unwrap_err();
    assert!(matches!(err, DaoError::Config(_)));
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dao_wallet.toml");
    fs::write(&path, "wallet_name_prefix = \"Treasury\"\nattendance_required = 2000\n").unwrap();

    let config = DaoConfig::load(Some(&path)).unwrap();
    assert_eq!(config.wallet_name_prefix, "Treasury");
    assert_eq!(config.attendance_required, 2000);
}

#[test]
fn test_load_tolerates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = DaoConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.wallet_name_prefix, DaoConfig::default().wallet_name_prefix);
}

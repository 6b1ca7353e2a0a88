use super::*;
use crate::errors::{DaoError, DaoResult};


pub fn test_hash(seed: u8) -> Bytes32 {
    Bytes32::new([seed; 32])
}

/// Treats a spend's solution as the literal list of conditions it produces
pub fn conditions_from_solution(spend: &CoinSpend) -> DaoResult<Vec<Condition>> {
    let items = spend
        .solution
        .to_list()
        .ok_or_else(|| DaoError::ProtocolViolation("solution is not a list".into()))?;
    items
        .into_iter()
        .map(|item| {
            Condition::from_program(item)
                .ok_or_else(|| DaoError::ProtocolViolation("malformed condition".into()))
        })
        .collect()
}

pub fn spend_with_conditions(coin: Coin, conditions: &[Condition]) -> CoinSpend {
    let solution = Program::list(conditions.iter().map(Condition::to_program).collect());
    CoinSpend::new(coin, Program::atom(b"p2_conditions".to_vec()), solution)
}

#[test]
fn test_amount_encoding() {
    assert_eq!(encode_int(0), Vec::<u8>::new());
    assert_eq!(encode_int(1), vec![1]);
    assert_eq!(encode_int(0x7f), vec![0x7f]);
    assert_eq!(encode_int(0x80), vec![0x00, 0x80]);
    assert_eq!(encode_int(1000), vec![0x03, 0xe8]);
    assert_eq!(encode_int(u64::MAX).len(), 9);
    assert_eq!(decode_int(&[0x00, 0x80]), Some(0x80));
    assert_eq!(decode_int(&[0xff]), None);
}

#[test]
fn test_coin_id_commits_to_all_fields() {
    let coin = Coin::new(test_hash(1), test_hash(2), 1000);
    let expected = sha256(&[test_hash(1).as_ref(), test_hash(2).as_ref(), &[0x03u8, 0xe8][..]]);
    assert_eq!(coin.coin_id(), expected);

    let other_amount = Coin::new(test_hash(1), test_hash(2), 1001);
    let other_parent = Coin::new(test_hash(3), test_hash(2), 1000);
    assert_ne!(coin.coin_id(), other_amount.coin_id());
    assert_ne!(coin.coin_id(), other_parent.coin_id());
}

#[test]
fn test_singleton_output_parity() {
    assert!(Coin::new(test_hash(1), test_hash(2), 1).is_singleton_output());
    assert!(!Coin::new(test_hash(1), test_hash(2), 1000).is_singleton_output());
}

#[test]
fn test_bytes32_hex_and_serde() {
    let value = test_hash(0xab);
    let parsed: Bytes32 = value.to_hex().parse().unwrap();
    assert_eq!(parsed, value);
    let with_prefix: Bytes32 = format!("0x{}", value).parse().unwrap();
    assert_eq!(with_prefix, value);

    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, format!("\"{}\"", value.to_hex()));
    assert_eq!(serde_json::from_str::<Bytes32>(&json).unwrap(), value);
    assert!(serde_json::from_str::<Bytes32>("\"abcd\"").is_err());
}

proptest::proptest! {
    #[test]
    fn prop_amount_encoding_reverses(value in proptest::prelude::any::<u64>()) {
        proptest::prop_assert_eq!(decode_int(&encode_int(value)), Some(value));
    }
}

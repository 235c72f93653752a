use deltachain::{validate, ContainerError};
use deltachain_test_utils::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

/// The CRC32 itself may spell out the signature, which no validator can tell
/// apart from a misplaced container.
fn ambiguous_prefix(raw: &[u8]) -> bool {
    raw.windows(2).position(|w| w == b"PA") != Some(4)
}

#[quickcheck]
fn bare_containers_pass_through(payload: Vec<u8>) -> bool {
    let mut raw = b"PA".to_vec();
    raw.extend_from_slice(&payload[..]);
    validate(&raw[..]) == Ok(&raw[..])
}

#[quickcheck]
fn prefixed_containers_are_stripped(payload: Vec<u8>) -> TestResult {
    let mut rest = b"PA".to_vec();
    rest.extend_from_slice(&payload[..]);
    let raw = with_crc(&rest[..]);
    if ambiguous_prefix(&raw[..]) {
        return TestResult::discard();
    }
    TestResult::from_bool(validate(&raw[..]) == Ok(&rest[..]))
}

#[quickcheck]
fn mutated_crc_is_rejected(payload: Vec<u8>, mask: u32) -> TestResult {
    if mask == 0 {
        return TestResult::discard();
    }
    let mut rest = b"PA".to_vec();
    rest.extend_from_slice(&payload[..]);
    let mut raw = with_crc(&rest[..]);
    let computed = crc32fast::hash(&rest[..]);
    let stored = computed ^ mask;
    raw[..4].copy_from_slice(&stored.to_le_bytes());
    if ambiguous_prefix(&raw[..]) {
        return TestResult::discard();
    }
    TestResult::from_bool(
        validate(&raw[..]) == Err(ContainerError::Integrity { stored, computed }),
    )
}

#[quickcheck]
fn no_signature_is_malformed(raw: Vec<u8>) -> TestResult {
    if raw.windows(2).any(|w| w == b"PA") {
        return TestResult::discard();
    }
    TestResult::from_bool(validate(&raw[..]) == Err(ContainerError::Malformed { offset: None }))
}

#[test]
fn flipped_payload_bit() {
    let rest = b"PA\x01\x02\x03\x04payload".to_vec();
    let mut raw = with_crc(&rest[..]);
    raw[8] ^= 0x10;
    match validate(&raw[..]) {
        Err(ContainerError::Integrity { stored, computed }) => {
            assert_eq!(stored, crc32fast::hash(&rest[..]));
            assert_ne!(stored, computed);
        }
        r => panic!("unexpected result: {:?}", r),
    }
}

#[test]
fn prefix_of_wrong_length() {
    for prefix_len in [1, 2, 3, 5, 8].iter() {
        let mut raw = vec![0xee; *prefix_len];
        raw.extend_from_slice(b"PAxyz");
        assert_eq!(
            validate(&raw[..]),
            Err(ContainerError::Malformed {
                offset: Some(*prefix_len)
            })
        );
    }
}

#[test]
fn error_messages() {
    let malformed = ContainerError::Malformed { offset: Some(2) };
    assert_eq!(
        malformed.to_string(),
        "signature found at offset 2, expected 0 or 4"
    );
    let missing = ContainerError::Malformed { offset: None };
    assert_eq!(missing.to_string(), "signature not found");
    let integrity = ContainerError::Integrity {
        stored: 0xdeadbeef,
        computed: 0x1,
    };
    assert!(integrity.to_string().contains("0xdeadbeef"));
    assert!(integrity.to_string().contains("0x00000001"));
}

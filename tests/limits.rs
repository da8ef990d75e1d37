//! Session size-limit enforcement, mirrored on both sides of the wire.

use std::collections::HashMap;

use anypack::{from_slice, to_vec, Options, PackError, Packer};

fn limited() -> Options {
    Options::new().with_size_limit(100)
}

fn expect_too_large(err: PackError, expect_max: u64, expect_size: u64) {
    match err {
        PackError::DataTooLarge { max, size, .. } => {
            assert_eq!(expect_max, max);
            assert_eq!(expect_size, size);
        }
        other => panic!("expected DataTooLarge, got: {other}"),
    }
}

#[test]
fn encoder_rejects_oversized_bytes() {
    let err = to_vec(&vec![0u8; 100], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn encoder_rejects_oversized_strings() {
    let err = to_vec(&"\0".repeat(100), limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn encoder_rejects_oversized_slices() {
    let err = to_vec(&vec![0i64; 100], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn encoder_rejects_oversized_arrays() {
    let err = to_vec(&[0i64; 101], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn encoder_rejects_oversized_maps() {
    let mut map = HashMap::new();
    for i in 0..100i64 {
        map.insert(i, true);
    }
    let err = to_vec(&map, limited()).unwrap_err();
    match err {
        // Keys are one or two varint bytes, so the write that crosses the
        // budget carries one or two bytes depending on iteration order.
        PackError::DataTooLarge { max: 100, size, .. } => {
            assert!((101..=102).contains(&size), "size: {size}")
        }
        other => panic!("expected DataTooLarge, got: {other}"),
    }
}

#[test]
fn values_within_the_limit_still_encode() {
    let bytes = to_vec(&vec![0u8; 90], limited()).unwrap();
    assert_eq!(91, bytes.len());
}

#[test]
fn budget_renews_per_top_level_operation() {
    let mut packer = Packer::new(limited());
    let mut buf = Vec::new();
    packer.encode(&mut buf, &vec![0u8; 90]).unwrap();
    packer.encode(&mut buf, &vec![0u8; 90]).unwrap();
    assert_eq!(182, buf.len());
    assert_eq!(182, packer.bytes_written());
}

#[test]
fn decoder_rejects_oversized_byte_prefix() {
    // VarUint(100) with nothing behind it.
    let err = from_slice::<Vec<u8>>(&[100], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn decoder_rejects_oversized_string_prefix() {
    let err = from_slice::<String>(&[100], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn decoder_rejects_oversized_slice_prefix() {
    let err = from_slice::<Vec<i64>>(&[100], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn decoder_rejects_oversized_arrays_before_reading() {
    let err = from_slice::<[i64; 101]>(&[], limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

#[test]
fn decoder_rejects_oversized_map_prefix() {
    // VarInt(100) costs two bytes, so the reported size is read + count.
    let err = from_slice::<HashMap<i64, bool>>(&[0xA4, 0x01], limited()).unwrap_err();
    expect_too_large(err, 100, 102);
}

#[test]
fn exhausted_read_budget_fails_instead_of_blocking() {
    // A string body that claims to run right up to the limit, but the
    // session has already consumed part of the budget on the prefix.
    let mut bytes = vec![100];
    bytes.extend_from_slice(&[b'a'; 100]);
    let err = from_slice::<String>(&bytes, limited()).unwrap_err();
    expect_too_large(err, 100, 101);
}

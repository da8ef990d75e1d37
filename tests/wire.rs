//! Exact wire bytes for the documented encodings.

use std::collections::HashMap;

use anypack::{from_slice, to_vec, AnyRecord, Options, Registry, TypeDesc, Value};

#[test]
fn string_body_is_length_then_bytes() {
    let bytes = to_vec(&"string".to_owned(), Options::default()).unwrap();
    assert_eq!(vec![0x06, 0x73, 0x74, 0x72, 0x69, 0x6e, 0x67], bytes);

    let back: String = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!("string", back);
}

#[test]
fn negative_int_uses_the_sign_bit_layout() {
    let bytes = to_vec(&-1337i64, Options::default()).unwrap();
    assert_eq!(vec![0xF9, 0x14], bytes);

    let back: i64 = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!(-1337, back);
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct A {
        pub v: String,
    }
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct B {
        pub n: i64,
    }
}

#[test]
fn object_stream_prefixes_each_value_with_its_id() {
    let options = || Options::new().with_registry(Registry::new().with::<A>().with::<B>());

    let mut buf = Vec::new();
    let mut packer = anypack::Packer::new(options());
    packer
        .encode(
            &mut buf,
            &A {
                v: "hi".to_owned(),
            },
        )
        .unwrap();
    packer.encode(&mut buf, &B { n: 7 }).unwrap();

    assert_eq!(vec![0x01, 0x02, 0x68, 0x69, 0x02, 0x07], buf);

    let mut unpacker = anypack::Unpacker::new(options());
    let mut r: &[u8] = &buf;
    let first: AnyRecord = unpacker.decode(&mut r).unwrap();
    let second: AnyRecord = unpacker.decode(&mut r).unwrap();
    assert_eq!("hi", first.downcast_ref::<A>().unwrap().v);
    assert_eq!(7, second.downcast_ref::<B>().unwrap().n);
}

#[test]
fn erased_map_writes_tag_then_body() {
    let value = Value::Map {
        key: TypeDesc::Str,
        val: TypeDesc::Interface,
        entries: Some(vec![(Value::Str("k".to_owned()), Value::Float64(3.0))]),
    };
    let bytes = to_vec(&value, Options::default()).unwrap();

    assert_eq!(
        vec![
            0x15, // map kind
            0x18, // string key kind
            0x14, // interface value kind
            0x01, // one entry
            0x01, 0x6B, // key "k"
            0x0E, // the value's own tag: float64
            0x40, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // 3.0, big-endian
        ],
        bytes
    );

    let back: Value = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!(value, back);
}

#[test]
fn length_encoding_laws() {
    // A nil pointer is exactly one zero byte.
    assert_eq!(
        vec![0x00],
        to_vec(&None::<String>, Options::default()).unwrap()
    );

    // An absent map is a single signed varint -1.
    let nil_map = Value::Map {
        key: TypeDesc::Int,
        val: TypeDesc::Bool,
        entries: None,
    };
    let bytes = to_vec(&nil_map, Options::default()).unwrap();
    assert_eq!(0x41, *bytes.last().unwrap());
    // ...and after the tag, nothing else.
    assert_eq!(vec![0x15, 0x02, 0x01, 0x41], bytes);

    // Decoding leaves the container absent, not empty.
    let back: Value = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!(nil_map, back);

    // A present, empty typed map is a single signed varint 0.
    assert_eq!(
        vec![0x00],
        to_vec(&HashMap::<i64, bool>::new(), Options::default()).unwrap()
    );

    // An empty string is a single varuint 0.
    assert_eq!(
        vec![0x00],
        to_vec(&String::new(), Options::default()).unwrap()
    );
}

#[test]
fn absent_map_decodes_into_a_zero_state_typed_map() {
    // VarInt(-1) into a typed map: zero state, no allocation of entries.
    let back: HashMap<i64, bool> = from_slice(&[0x41], Options::default()).unwrap();
    assert!(back.is_empty());
}

#[test]
fn packed_bool_values() {
    let bytes = to_vec(
        &Value::Bools(vec![true, false, true]),
        Options::default(),
    )
    .unwrap();
    // slice-of-bool tag, count 3, bits 0b0000_0101 lsb-first.
    assert_eq!(vec![0x17, 0x01, 0x03, 0x05], bytes);

    let back: Value = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!(Value::Bools(vec![true, false, true]), back);

    // Nine booleans spill into a second byte.
    let nine = Value::Bools(vec![true; 9]);
    let bytes = to_vec(&nine, Options::default()).unwrap();
    assert_eq!(vec![0x17, 0x01, 0x09, 0xFF, 0x01], bytes);
    assert_eq!(nine, from_slice::<Value>(&bytes, Options::default()).unwrap());
}

#[test]
fn nil_value_is_the_sentinel_byte() {
    let bytes = to_vec(&Value::Nil, Options::default()).unwrap();
    assert_eq!(vec![0xff], bytes);
    assert_eq!(
        Value::Nil,
        from_slice::<Value>(&bytes, Options::default()).unwrap()
    );
}

#[test]
fn counters_match_the_produced_bytes() {
    let mut packer = anypack::Packer::new(Options::default());
    let mut buf = Vec::new();
    packer.encode(&mut buf, &"abc".to_owned()).unwrap();
    packer.encode(&mut buf, &-1i64).unwrap();
    assert_eq!(buf.len() as u64, packer.bytes_written());

    packer.reset_counter();
    assert_eq!(0, packer.bytes_written());
}

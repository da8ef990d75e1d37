use std::fmt::Debug;

use anypack::{Options, Pack, Packer, Unpack, Unpacker};

/// Encodes `input`, decodes it back, and checks structural equality plus
/// counter symmetry: bytes written == bytes read == buffer length, with no
/// bytes left over.
pub fn roundtrip<T>(input: &T)
where
    T: Pack + Unpack + PartialEq + Debug,
{
    roundtrip_with(input, Options::default);
}

pub fn roundtrip_with<T>(input: &T, options: impl Fn() -> Options)
where
    T: Pack + Unpack + PartialEq + Debug,
{
    let mut packer = Packer::new(options());
    let mut buf = Vec::new();
    packer
        .encode(&mut buf, input)
        .unwrap_or_else(|e| panic!("encode of {input:?} failed: {e}"));
    assert_eq!(
        buf.len() as u64,
        packer.bytes_written(),
        "written counter disagrees with the buffer for {input:?}"
    );

    let mut unpacker = Unpacker::new(options());
    let mut r: &[u8] = &buf;
    let output: T = unpacker
        .decode(&mut r)
        .unwrap_or_else(|e| panic!("decode of {input:?} failed: {e}; bytes: {buf:02x?}"));

    assert!(
        r.is_empty(),
        "decode of {input:?} left {} bytes over: {r:02x?}",
        r.len()
    );
    assert_eq!(
        packer.bytes_written(),
        unpacker.bytes_read(),
        "counter asymmetry for {input:?}"
    );
    assert_eq!(input, &output, "value did not survive the wire");
}

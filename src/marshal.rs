//! One-shot buffer conveniences over the session types.

use crate::error::Result;
use crate::options::Options;
use crate::packer::{Pack, Packer};
use crate::unpacker::{Unpack, Unpacker};

/// Encodes `data` into a fresh byte buffer.
pub fn to_vec<T: Pack>(data: &T, options: Options) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    Packer::new(options).encode(&mut buf, data)?;
    Ok(buf)
}

/// Decodes one value from the front of `bytes`.
pub fn from_slice<T: Unpack>(bytes: &[u8], options: Options) -> Result<T> {
    let mut r = bytes;
    Unpacker::new(options).decode(&mut r)
}

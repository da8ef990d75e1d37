//! Recursive type descriptors and their wire representation.
//!
//! Whenever a value's static type is erased, the encoder first writes a tag
//! that fully describes the concrete type tree; the decoder rebuilds the
//! descriptor by recursive descent before it touches the body. The grammar:
//!
//! ```text
//! Tag := KindByte                      // primitives, String, Interface
//!      | KindByte Tag                  // Pointer, Slice
//!      | KindByte VarUint Tag          // Array(length, inner)
//!      | KindByte Tag Tag              // Map(key, value)
//!      | 0xff                          // nil marker, no body follows
//! ```

use std::io::{Read, Write};

use crate::error::{PackError, Result};
use crate::kind::Kind;
use crate::varint;

/// Hard ceiling on tag and erased-value nesting. Legitimate data stays far
/// below this; adversarial input hits [`PackError::DepthLimit`] instead of
/// exhausting the stack.
pub(crate) const MAX_NESTING_DEPTH: usize = 512;

/// A fully concrete type tree, the codec's unit of reflection.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Str,
    Array(u64, Box<TypeDesc>),
    Slice(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Pointer(Box<TypeDesc>),
    /// An erased hole: the value at this position carries its own tag.
    Interface,
    /// Record types never appear inside tags; they exist so record fields
    /// can be described and rejected if they reach the tag path.
    Struct,
    Nil,
}

impl TypeDesc {
    pub fn kind(&self) -> Kind {
        match self {
            TypeDesc::Bool => Kind::Bool,
            TypeDesc::Int => Kind::Int,
            TypeDesc::Int8 => Kind::Int8,
            TypeDesc::Int16 => Kind::Int16,
            TypeDesc::Int32 => Kind::Int32,
            TypeDesc::Int64 => Kind::Int64,
            TypeDesc::Uint => Kind::Uint,
            TypeDesc::Uint8 => Kind::Uint8,
            TypeDesc::Uint16 => Kind::Uint16,
            TypeDesc::Uint32 => Kind::Uint32,
            TypeDesc::Uint64 => Kind::Uint64,
            TypeDesc::Uintptr => Kind::Uintptr,
            TypeDesc::Float32 => Kind::Float32,
            TypeDesc::Float64 => Kind::Float64,
            TypeDesc::Complex64 => Kind::Complex64,
            TypeDesc::Complex128 => Kind::Complex128,
            TypeDesc::Str => Kind::String,
            TypeDesc::Array(_, _) => Kind::Array,
            TypeDesc::Slice(_) => Kind::Slice,
            TypeDesc::Map(_, _) => Kind::Map,
            TypeDesc::Pointer(_) => Kind::Pointer,
            TypeDesc::Interface => Kind::Interface,
            TypeDesc::Struct => Kind::Struct,
            TypeDesc::Nil => Kind::Nil,
        }
    }

    /// Writes the tag for this descriptor, returning how many bytes went
    /// out. Inner positions require concrete types, so a nested `Nil` is an
    /// error, and `Struct` cannot be described at all.
    pub fn write(&self, w: &mut impl Write) -> Result<usize> {
        let kind = self.kind();
        if !kind.interface_encodable() {
            return Err(PackError::CantUseInInterfaceMode {
                kind,
                context: kind.name(),
            });
        }

        w.write_all(&[kind.to_byte()])?;
        let mut n = 1;

        match self {
            TypeDesc::Pointer(inner) | TypeDesc::Slice(inner) => {
                check_concrete(inner)?;
                n += inner.write(w)?;
            }
            TypeDesc::Array(len, inner) => {
                n += varint::write_var_uint(w, *len)?;
                check_concrete(inner)?;
                n += inner.write(w)?;
            }
            TypeDesc::Map(key, val) => {
                check_concrete(key)?;
                check_map_key(key)?;
                n += key.write(w)?;
                check_concrete(val)?;
                n += val.write(w)?;
            }
            _ => {}
        }

        Ok(n)
    }

    /// Reads a tag, returning `(bytes_read, descriptor)`. The caller decides
    /// what a top-level `Nil` means; nested `Nil` is rejected here.
    pub fn read(r: &mut impl Read, depth: usize) -> Result<(usize, TypeDesc)> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PackError::DepthLimit);
        }

        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let mut n = 1;

        let Some(kind) = Kind::from_byte(byte[0]) else {
            return Err(PackError::InvalidReceiver);
        };

        let desc = match kind {
            Kind::Bool => TypeDesc::Bool,
            Kind::Int => TypeDesc::Int,
            Kind::Int8 => TypeDesc::Int8,
            Kind::Int16 => TypeDesc::Int16,
            Kind::Int32 => TypeDesc::Int32,
            Kind::Int64 => TypeDesc::Int64,
            Kind::Uint => TypeDesc::Uint,
            Kind::Uint8 => TypeDesc::Uint8,
            Kind::Uint16 => TypeDesc::Uint16,
            Kind::Uint32 => TypeDesc::Uint32,
            Kind::Uint64 => TypeDesc::Uint64,
            Kind::Uintptr => TypeDesc::Uintptr,
            Kind::Float32 => TypeDesc::Float32,
            Kind::Float64 => TypeDesc::Float64,
            Kind::Complex64 => TypeDesc::Complex64,
            Kind::Complex128 => TypeDesc::Complex128,
            Kind::String => TypeDesc::Str,
            Kind::Interface => TypeDesc::Interface,
            Kind::Nil => TypeDesc::Nil,
            Kind::Struct => return Err(PackError::InvalidReceiver),
            Kind::Array => {
                let (len_n, len) = varint::read_var_uint(r)?;
                n += len_n;
                let (inner_n, inner) = TypeDesc::read(r, depth + 1)?;
                n += inner_n;
                read_concrete(&inner)?;
                TypeDesc::Array(len, Box::new(inner))
            }
            Kind::Map => {
                let (key_n, key) = TypeDesc::read(r, depth + 1)?;
                n += key_n;
                read_concrete(&key)?;
                check_map_key(&key)?;
                let (val_n, val) = TypeDesc::read(r, depth + 1)?;
                n += val_n;
                read_concrete(&val)?;
                TypeDesc::Map(Box::new(key), Box::new(val))
            }
            Kind::Slice => {
                let (inner_n, inner) = TypeDesc::read(r, depth + 1)?;
                n += inner_n;
                read_concrete(&inner)?;
                TypeDesc::Slice(Box::new(inner))
            }
            Kind::Pointer => {
                let (inner_n, inner) = TypeDesc::read(r, depth + 1)?;
                n += inner_n;
                read_concrete(&inner)?;
                TypeDesc::Pointer(Box::new(inner))
            }
        };

        Ok((n, desc))
    }
}

/// Encode side: a nil inner type means the value itself was nil somewhere
/// no pointer or interface could absorb it.
fn check_concrete(inner: &TypeDesc) -> Result<()> {
    if matches!(inner, TypeDesc::Nil) {
        return Err(PackError::Nil);
    }
    Ok(())
}

/// Decode side: a tag tree terminating in the nil sentinel where a
/// concrete kind was required cannot describe a receiver.
fn read_concrete(inner: &TypeDesc) -> Result<()> {
    if matches!(inner, TypeDesc::Nil) {
        return Err(PackError::InvalidReceiver);
    }
    Ok(())
}

/// Map keys must be comparable; container-kinded keys are not.
pub(crate) fn check_map_key(key: &TypeDesc) -> Result<()> {
    match key.kind() {
        Kind::Slice | Kind::Map => Err(PackError::InvalidTypeKey(key.kind())),
        _ => Ok(()),
    }
}
